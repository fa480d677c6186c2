//! Fixtures for ledger tests

use crate::core::{Block, BlockBuilder, Blockchain, ProofOfWork, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::UTXOSet;
use crate::wallet::{Wallet, Wallets};
use std::sync::Arc;
use tempfile::TempDir;

/// Valid Base58Check address nobody in the tests holds a key for
pub const TEST_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

// Low enough that sealing a block takes a handful of hashes
const TEST_TARGET_BITS: u32 = 4;

pub fn test_builder() -> Arc<dyn BlockBuilder> {
    Arc::new(ProofOfWork::new(TEST_TARGET_BITS))
}

pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| LedgerError::Io(e.to_string()))
}

/// A fresh ledger whose genesis pays `TEST_ADDRESS`
pub fn create_test_blockchain() -> Result<(Blockchain, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let db_path = temp_dir.path().join("test_blockchain");
    let blockchain =
        Blockchain::create_blockchain_with_builder(TEST_ADDRESS, db_path, test_builder())?;
    Ok((blockchain, temp_dir))
}

/// A fresh ledger whose genesis reward belongs to the returned wallet
pub fn create_funded_blockchain() -> Result<(Blockchain, Wallet, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let owner = Wallet::new()?;
    let db_path = temp_dir.path().join("funded_blockchain");
    let blockchain =
        Blockchain::create_blockchain_with_builder(&owner.get_address(), db_path, test_builder())?;
    Ok((blockchain, owner, temp_dir))
}

/// `count` wallets stored in a temporary wallet file
pub fn create_test_wallets(count: usize) -> Result<(Wallets, Vec<String>, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let mut wallets = Wallets::load_from(temp_dir.path().join("wallet.dat"))?;
    let mut addresses = Vec::new();
    for _ in 0..count {
        addresses.push(wallets.create_wallet()?);
    }
    Ok((wallets, addresses, temp_dir))
}

/// Append a block holding only a reward to `TEST_ADDRESS`
pub fn mine_empty_block(blockchain: &Blockchain) -> Result<Block> {
    let coinbase = Transaction::new_coinbase_tx(TEST_ADDRESS, "")?;
    blockchain.mine_block(&[coinbase])
}

/// Build, sign and append a transfer, with a reward to the sender in the
/// same block
pub fn send(blockchain: &Blockchain, from: &Wallet, to: &str, amount: u64) -> Result<Block> {
    let utxo_set = UTXOSet::new(blockchain.clone());
    let mut tx = Transaction::new_utxo_transaction(&from.get_address(), to, amount, &utxo_set)?;
    blockchain.sign_transaction(&mut tx, from.get_pkcs8())?;
    let coinbase = Transaction::new_coinbase_tx(&from.get_address(), "")?;
    blockchain.mine_block(&[tx, coinbase])
}

/// `length` reward-only blocks chained on top of `parent`, not imported
pub fn create_fork_blocks(parent: &Block, length: usize) -> Result<Vec<Block>> {
    let builder = test_builder();
    let mut fork_blocks: Vec<Block> = Vec::with_capacity(length);
    let mut prev_hash = parent.get_hash().to_vec();
    for i in 0..length {
        let coinbase = Transaction::new_coinbase_tx(TEST_ADDRESS, "")?;
        let block = builder.create_block(&[coinbase], &prev_hash, parent.get_height() + i + 1)?;
        prev_hash = block.get_hash().to_vec();
        fork_blocks.push(block);
    }
    Ok(fork_blocks)
}

/// Walk tip to genesis checking hash links, heights and proof of work
pub fn validate_blockchain_integrity(blockchain: &Blockchain) -> Result<bool> {
    let mut expected_hash = blockchain.get_tip_hash();
    let mut expected_height = blockchain.get_best_height()?;

    for block in blockchain.iterator() {
        let block = block?;
        if block.get_hash() != expected_hash.as_slice()
            || block.get_height() != expected_height
            || !ProofOfWork::validate(&block)
        {
            return Ok(false);
        }
        if block.is_genesis() {
            return Ok(block.get_height() == 0);
        }
        expected_hash = block.get_pre_block_hash().to_vec();
        expected_height = match expected_height.checked_sub(1) {
            Some(height) => height,
            None => return Ok(false),
        };
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_blockchain() {
        let (blockchain, _temp_dir) = create_test_blockchain().unwrap();
        assert_eq!(blockchain.get_best_height().unwrap(), 0);
    }

    #[test]
    fn test_create_test_wallets() {
        let (wallets, addresses, _temp_dir) = create_test_wallets(5).unwrap();
        assert_eq!(addresses.len(), 5);

        let mut unique = addresses.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5);
        assert!(addresses.iter().all(|a| wallets.get_wallet(a).is_some()));
    }

    #[test]
    fn test_validate_blockchain_integrity() {
        let (blockchain, _temp_dir) = create_test_blockchain().unwrap();
        mine_empty_block(&blockchain).unwrap();
        mine_empty_block(&blockchain).unwrap();
        assert!(validate_blockchain_integrity(&blockchain).unwrap());
    }

    #[test]
    fn test_fork_blocks_overtake_tip() {
        let (blockchain, _temp_dir) = create_test_blockchain().unwrap();
        let genesis = blockchain.get_block(&blockchain.get_tip_hash()).unwrap();
        mine_empty_block(&blockchain).unwrap();

        for block in create_fork_blocks(&genesis, 2).unwrap() {
            blockchain.add_block(&block).unwrap();
        }
        assert_eq!(blockchain.get_best_height().unwrap(), 2);
        assert!(validate_blockchain_integrity(&blockchain).unwrap());
    }
}
