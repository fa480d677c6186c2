// The ledger: a hash-linked chain of blocks persisted in the store, with a
// single tip pointer under the "lh" key. Append and import are the only
// operations that move the tip and they are serialized by `write_lock`.

use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, BlockBuilder, ProofOfWork, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::{Store, UTXOSet};
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

const TIP_BLOCK_HASH_KEY: &[u8] = b"lh";
pub const GENESIS_COINBASE_DATA: &str = "First Transaction from Genesis";

#[derive(Clone)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<Vec<u8>>>,
    write_lock: Arc<Mutex<()>>,
    store: Store,
    builder: Arc<dyn BlockBuilder>,
}

impl Blockchain {
    /// Create a ledger at the configured location
    pub fn create_blockchain(genesis_address: &str) -> Result<Blockchain> {
        Self::create_blockchain_with_path(genesis_address, GLOBAL_CONFIG.get_db_path())
    }

    /// Open the ledger at the configured location
    pub fn new_blockchain() -> Result<Blockchain> {
        Self::new_blockchain_with_path(GLOBAL_CONFIG.get_db_path())
    }

    pub fn create_blockchain_with_path(
        genesis_address: &str,
        db_path: impl AsRef<Path>,
    ) -> Result<Blockchain> {
        let builder = Arc::new(ProofOfWork::from_config());
        Self::create_blockchain_with_builder(genesis_address, db_path, builder)
    }

    pub fn new_blockchain_with_path(db_path: impl AsRef<Path>) -> Result<Blockchain> {
        let builder = Arc::new(ProofOfWork::from_config());
        Self::new_blockchain_with_builder(db_path, builder)
    }

    /// InitGenesis: fails with `AlreadyExists` if a ledger is already stored
    /// at `db_path`, otherwise persists a genesis block paying `genesis_address`.
    pub fn create_blockchain_with_builder(
        genesis_address: &str,
        db_path: impl AsRef<Path>,
        builder: Arc<dyn BlockBuilder>,
    ) -> Result<Blockchain> {
        let db_path = db_path.as_ref();
        let store = Store::open(db_path)?;
        if store.contains(TIP_BLOCK_HASH_KEY)? {
            return Err(LedgerError::AlreadyExists(format!(
                "ledger at {}",
                db_path.display()
            )));
        }

        info!("Creating genesis block for address: {genesis_address}");
        let coinbase_tx = Transaction::new_coinbase_tx(genesis_address, GENESIS_COINBASE_DATA)?;
        let genesis = builder.genesis(&coinbase_tx)?;
        let block_data = genesis.serialize()?;
        store.put_all(&[
            (genesis.get_hash(), block_data.as_slice()),
            (TIP_BLOCK_HASH_KEY, genesis.get_hash()),
        ])?;
        store.flush()?;
        info!("Genesis created: {}", HEXLOWER.encode(genesis.get_hash()));

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(genesis.get_hash().to_vec())),
            write_lock: Arc::new(Mutex::new(())),
            store,
            builder,
        })
    }

    /// Open: fails with `NotFound` if no ledger exists at `db_path`
    pub fn new_blockchain_with_builder(
        db_path: impl AsRef<Path>,
        builder: Arc<dyn BlockBuilder>,
    ) -> Result<Blockchain> {
        let db_path = db_path.as_ref();
        if !Store::exists(db_path) {
            return Err(LedgerError::NotFound(format!(
                "no existing ledger at {}, create one first",
                db_path.display()
            )));
        }
        let store = Store::open(db_path)?;
        let tip_hash = store.get(TIP_BLOCK_HASH_KEY).map_err(|e| match e {
            LedgerError::NotFound(_) => LedgerError::NotFound(format!(
                "no existing ledger at {}, create one first",
                db_path.display()
            )),
            other => other,
        })?;

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            write_lock: Arc::new(Mutex::new(())),
            store,
            builder,
        })
    }

    pub fn get_store(&self) -> &Store {
        &self.store
    }

    pub fn get_tip_hash(&self) -> Vec<u8> {
        self.tip_hash
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_tip_hash(&self, new_tip_hash: &[u8]) {
        let mut tip_hash = self.tip_hash.write().unwrap_or_else(PoisonError::into_inner);
        *tip_hash = new_tip_hash.to_vec();
    }

    /// Append: verify every transaction, then seal them into a new block on
    /// top of the tip and advance the tip to it. Nothing is persisted if any
    /// transaction is rejected.
    pub fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.check_transactions(transactions)?;

        let tip_hash = self.store.get(TIP_BLOCK_HASH_KEY)?;
        let tip_block = self.get_block(&tip_hash)?;
        let next_height = tip_block.get_height() + 1;

        let block = self
            .builder
            .create_block(transactions, &tip_hash, next_height)?;
        let block_data = block.serialize()?;
        self.store.put_all(&[
            (block.get_hash(), block_data.as_slice()),
            (TIP_BLOCK_HASH_KEY, block.get_hash()),
        ])?;
        self.set_tip_hash(block.get_hash());

        info!(
            "Appended block {} at height {next_height} with {} transactions",
            HEXLOWER.encode(block.get_hash()),
            transactions.len()
        );
        Ok(block)
    }

    // Every ID must match the content and be new to the chain and the batch.
    // Then signature checks for each transaction, and every input must claim
    // an output that is unspent on chain and not claimed earlier in the batch.
    fn check_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        let mut known_ids = self.get_transaction_ids()?;
        for transaction in transactions {
            if transaction.get_id() != transaction.compute_id()?.as_slice() {
                return Err(LedgerError::InvalidTransaction(format!(
                    "transaction {} does not hash to its ID",
                    transaction.get_id_hex()
                )));
            }
            if !known_ids.insert(transaction.get_id().to_vec()) {
                return Err(LedgerError::InvalidTransaction(format!(
                    "transaction {} is already on chain or repeated in this batch",
                    transaction.get_id_hex()
                )));
            }
        }

        for (i, transaction) in transactions.iter().enumerate() {
            if !self.verify_transaction(transaction)? {
                return Err(LedgerError::InvalidTransaction(format!(
                    "transaction {} at index {i} failed verification",
                    transaction.get_id_hex()
                )));
            }
        }

        let utxo = UTXOSet::new(self.clone()).build_utxo_set()?;
        let mut claimed: HashSet<(String, usize)> = HashSet::new();
        for transaction in transactions.iter().filter(|tx| !tx.is_coinbase()) {
            for input in transaction.get_vin() {
                let txid_hex = HEXLOWER.encode(input.get_txid());
                let index = input.output_index().ok_or_else(|| {
                    LedgerError::InvalidTransaction(format!(
                        "negative output index in {}",
                        transaction.get_id_hex()
                    ))
                })?;
                let unspent = utxo
                    .get(&txid_hex)
                    .is_some_and(|outs| outs.contains(index));
                if !unspent {
                    return Err(LedgerError::InvalidTransaction(format!(
                        "output {txid_hex}:{index} is already spent"
                    )));
                }
                if !claimed.insert((txid_hex.clone(), index)) {
                    return Err(LedgerError::InvalidTransaction(format!(
                        "output {txid_hex}:{index} is spent twice in this batch"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Import a block received from elsewhere. Known blocks are ignored; the
    /// tip moves only if the new block is higher than the current tip.
    pub fn add_block(&self, block: &Block) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self.store.contains(block.get_hash())? {
            debug!("Block {} already known", HEXLOWER.encode(block.get_hash()));
            return Ok(());
        }

        if !block.is_genesis() {
            let parent = match self.get_block(block.get_pre_block_hash()) {
                Ok(parent) => parent,
                Err(LedgerError::NotFound(_)) => {
                    return Err(LedgerError::InvalidBlock(format!(
                        "parent {} of block {} is unknown",
                        HEXLOWER.encode(block.get_pre_block_hash()),
                        HEXLOWER.encode(block.get_hash())
                    )))
                }
                Err(e) => return Err(e),
            };
            if block.get_height() != parent.get_height() + 1 {
                return Err(LedgerError::InvalidBlock(format!(
                    "block {} claims height {} on a parent at height {}",
                    HEXLOWER.encode(block.get_hash()),
                    block.get_height(),
                    parent.get_height()
                )));
            }
        } else if block.get_height() != 0 {
            return Err(LedgerError::InvalidBlock(
                "genesis block must have height 0".to_string(),
            ));
        }

        let best_height = self.get_best_height()?;
        let block_data = block.serialize()?;
        if block.get_height() > best_height {
            self.store.put_all(&[
                (block.get_hash(), block_data.as_slice()),
                (TIP_BLOCK_HASH_KEY, block.get_hash()),
            ])?;
            self.set_tip_hash(block.get_hash());
            info!(
                "Imported block {} as new tip at height {}",
                HEXLOWER.encode(block.get_hash()),
                block.get_height()
            );
        } else {
            self.store.put(block.get_hash(), block_data.as_slice())?;
            warn!(
                "Imported block {} at height {} does not exceed tip height {best_height}",
                HEXLOWER.encode(block.get_hash()),
                block.get_height()
            );
        }
        Ok(())
    }

    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.get_tip_hash(), self.store.clone())
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Block> {
        let block_bytes = self.store.get(block_hash).map_err(|e| match e {
            LedgerError::NotFound(_) => {
                LedgerError::NotFound(format!("block {}", HEXLOWER.encode(block_hash)))
            }
            other => other,
        })?;
        Block::deserialize(&block_bytes)
    }

    pub fn block_exists(&self, block_hash: &[u8]) -> Result<bool> {
        self.store.contains(block_hash)
    }

    /// Every hash from the tip back to genesis, inclusive
    pub fn get_block_hashes(&self) -> Result<Vec<Vec<u8>>> {
        self.iterator()
            .map(|block| block.map(|b| b.get_hash().to_vec()))
            .collect()
    }

    pub fn get_best_height(&self) -> Result<usize> {
        Ok(self.get_block(&self.get_tip_hash())?.get_height())
    }

    fn get_transaction_ids(&self) -> Result<HashSet<Vec<u8>>> {
        let mut ids = HashSet::new();
        for block in self.iterator() {
            ids.extend(block?.get_transactions().iter().map(|tx| tx.get_id().to_vec()));
        }
        Ok(ids)
    }

    pub fn find_transaction(&self, txid: &[u8]) -> Result<Transaction> {
        for block in self.iterator() {
            let block = block?;
            if let Some(tx) = block.get_transactions().iter().find(|tx| tx.get_id() == txid) {
                return Ok(tx.clone());
            }
        }
        Err(LedgerError::NotFound(format!(
            "transaction {}",
            HEXLOWER.encode(txid)
        )))
    }

    /// Collect, in one scan, the transactions referenced by `tx`'s inputs.
    /// Missing ones are simply absent from the map.
    pub fn find_referenced_transactions(
        &self,
        tx: &Transaction,
    ) -> Result<HashMap<String, Transaction>> {
        let mut wanted: HashSet<&[u8]> = tx.get_vin().iter().map(|vin| vin.get_txid()).collect();
        let mut found = HashMap::new();
        if tx.is_coinbase() {
            return Ok(found);
        }

        for block in self.iterator() {
            if wanted.is_empty() {
                break;
            }
            for candidate in block?.get_transactions() {
                if wanted.remove(candidate.get_id()) {
                    found.insert(candidate.get_id_hex(), candidate.clone());
                }
            }
        }
        Ok(found)
    }

    pub fn sign_transaction(&self, tx: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        let prev_txs = self.find_referenced_transactions(tx)?;
        tx.sign(pkcs8, &prev_txs)
    }

    /// `Ok(false)` covers bad signatures and references to unknown transactions
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = self.find_referenced_transactions(tx)?;
        Ok(tx.verify(&prev_txs))
    }
}

/// Backward cursor from the tip it was created at down to genesis. Yields
/// `None` once genesis has been returned, or after the first error.
pub struct BlockchainIterator {
    store: Store,
    current_hash: Option<Vec<u8>>,
}

impl BlockchainIterator {
    fn new(tip_hash: Vec<u8>, store: Store) -> BlockchainIterator {
        BlockchainIterator {
            current_hash: Some(tip_hash),
            store,
        }
    }
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current_hash.take()?;
        let block = self
            .store
            .get(&hash)
            .and_then(|data| Block::deserialize(&data));
        if let Ok(block) = &block {
            if !block.is_genesis() {
                self.current_hash = Some(block.get_pre_block_hash().to_vec());
            }
        }
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TxOutputs, SUBSIDY};
    use crate::testnet::{
        create_funded_blockchain, create_test_blockchain, mine_empty_block, test_builder,
        TEST_ADDRESS,
    };
    use crate::wallet::Wallet;
    use tempfile::tempdir;

    #[test]
    fn test_init_refuses_existing_ledger() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger");
        {
            let chain =
                Blockchain::create_blockchain_with_builder(TEST_ADDRESS, &path, test_builder())
                    .unwrap();
            assert_eq!(chain.get_best_height().unwrap(), 0);
        }
        let again = Blockchain::create_blockchain_with_builder(TEST_ADDRESS, &path, test_builder());
        assert!(matches!(again, Err(LedgerError::AlreadyExists(_))));
    }

    #[test]
    fn test_open_missing_ledger() {
        let dir = tempdir().unwrap();
        let result = Blockchain::new_blockchain_with_builder(dir.path().join("none"), test_builder());
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_iterator_stops_after_genesis() {
        let (chain, _dir) = create_test_blockchain().unwrap();
        mine_empty_block(&chain).unwrap();
        mine_empty_block(&chain).unwrap();

        let mut iter = chain.iterator();
        let heights: Vec<usize> = iter
            .by_ref()
            .map(|b| b.unwrap().get_height())
            .collect();
        assert_eq!(heights, vec![2, 1, 0]);
        assert!(iter.next().is_none());

        // a cursor is pinned to the tip it started from
        let pinned = chain.iterator();
        mine_empty_block(&chain).unwrap();
        assert_eq!(pinned.count(), 3);
        assert_eq!(chain.iterator().count(), 4);
    }

    #[test]
    fn test_block_hashes_and_lookup() {
        let (chain, _dir) = create_test_blockchain().unwrap();
        let block = mine_empty_block(&chain).unwrap();

        let hashes = chain.get_block_hashes().unwrap();
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes[0], block.get_hash());
        assert_eq!(chain.get_block(&hashes[1]).unwrap().get_height(), 0);
        assert!(chain.get_block(&hashes[1]).unwrap().is_genesis());

        assert!(matches!(
            chain.get_block(&[0xFF; 32]),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_append_increments_height() {
        let (chain, _dir) = create_test_blockchain().unwrap();
        for expected in 1..=3 {
            let before = chain.get_best_height().unwrap();
            let block = mine_empty_block(&chain).unwrap();
            assert_eq!(block.get_height(), expected);
            assert_eq!(chain.get_best_height().unwrap(), before + 1);
            assert_eq!(chain.get_tip_hash(), block.get_hash());
        }
    }

    #[test]
    fn test_empty_batch_rejected() {
        let (chain, _dir) = create_test_blockchain().unwrap();
        assert!(matches!(
            chain.mine_block(&[]),
            Err(LedgerError::InvalidBlock(_))
        ));
        assert_eq!(chain.get_best_height().unwrap(), 0);
    }

    #[test]
    fn test_import_is_idempotent() {
        let (chain, _dir) = create_test_blockchain().unwrap();
        let coinbase = Transaction::new_coinbase_tx(TEST_ADDRESS, "").unwrap();
        let block = test_builder()
            .create_block(&[coinbase], &chain.get_tip_hash(), 1)
            .unwrap();

        chain.add_block(&block).unwrap();
        let tip_once = chain.get_tip_hash();
        let hashes_once = chain.get_block_hashes().unwrap();

        chain.add_block(&block).unwrap();
        assert_eq!(chain.get_tip_hash(), tip_once);
        assert_eq!(chain.get_block_hashes().unwrap(), hashes_once);
        assert_eq!(tip_once, block.get_hash());
    }

    #[test]
    fn test_import_keeps_tip_for_equal_height() {
        let (chain, _dir) = create_test_blockchain().unwrap();
        let genesis_hash = chain.get_tip_hash();
        let ours = mine_empty_block(&chain).unwrap();

        let coinbase = Transaction::new_coinbase_tx(TEST_ADDRESS, "").unwrap();
        let competitor = test_builder()
            .create_block(&[coinbase], &genesis_hash, 1)
            .unwrap();
        chain.add_block(&competitor).unwrap();

        assert_eq!(chain.get_tip_hash(), ours.get_hash());
        assert!(chain.block_exists(competitor.get_hash()).unwrap());

        // extending the competitor past our tip switches the tip over
        let coinbase = Transaction::new_coinbase_tx(TEST_ADDRESS, "").unwrap();
        let longer = test_builder()
            .create_block(&[coinbase], competitor.get_hash(), 2)
            .unwrap();
        chain.add_block(&longer).unwrap();
        assert_eq!(chain.get_tip_hash(), longer.get_hash());
        assert_eq!(chain.get_best_height().unwrap(), 2);
        assert_eq!(
            chain.get_block_hashes().unwrap(),
            vec![
                longer.get_hash().to_vec(),
                competitor.get_hash().to_vec(),
                genesis_hash
            ]
        );
    }

    #[test]
    fn test_import_rejects_orphans_and_bad_heights() {
        let (chain, _dir) = create_test_blockchain().unwrap();
        let coinbase = Transaction::new_coinbase_tx(TEST_ADDRESS, "").unwrap();

        let orphan = test_builder()
            .create_block(&[coinbase.clone()], &[0xEE; 32], 5)
            .unwrap();
        assert!(matches!(
            chain.add_block(&orphan),
            Err(LedgerError::InvalidBlock(_))
        ));

        let skipping = test_builder()
            .create_block(&[coinbase], &chain.get_tip_hash(), 3)
            .unwrap();
        assert!(matches!(
            chain.add_block(&skipping),
            Err(LedgerError::InvalidBlock(_))
        ));
        assert!(!chain.block_exists(skipping.get_hash()).unwrap());
        assert_eq!(chain.get_best_height().unwrap(), 0);
    }

    #[test]
    fn test_find_transaction() {
        let (chain, _dir) = create_test_blockchain().unwrap();
        let block = mine_empty_block(&chain).unwrap();
        let coinbase = &block.get_transactions()[0];

        assert_eq!(&chain.find_transaction(coinbase.get_id()).unwrap(), coinbase);
        assert!(matches!(
            chain.find_transaction(&[0; 32]),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_append_rejects_id_not_matching_content() {
        let (chain, alice, _dir) = create_funded_blockchain().unwrap();
        let bob = Wallet::new().unwrap();
        let genesis = chain.get_block(&chain.get_tip_hash()).unwrap();
        let genesis_coinbase_id = genesis.get_transactions()[0].get_id().to_vec();

        let utxo_set = UTXOSet::new(chain.clone());
        let mut tx = Transaction::new_utxo_transaction(
            &alice.get_address(),
            &bob.get_address(),
            SUBSIDY,
            &utxo_set,
        )
        .unwrap();
        chain.sign_transaction(&mut tx, alice.get_pkcs8()).unwrap();

        // the ID is encoded first: one length byte, then 32 bytes
        let mut bytes = tx.serialize().unwrap();
        bytes[1..33].copy_from_slice(&genesis_coinbase_id);
        let relabelled = Transaction::deserialize(&bytes).unwrap();
        assert_eq!(relabelled.get_id(), genesis_coinbase_id.as_slice());
        assert!(chain.verify_transaction(&relabelled).unwrap());

        let tip = chain.get_tip_hash();
        assert!(matches!(
            chain.mine_block(&[relabelled]),
            Err(LedgerError::InvalidTransaction(_))
        ));
        assert_eq!(chain.get_tip_hash(), tip);

        // the honest transaction still goes through
        chain.mine_block(&[tx]).unwrap();
        let utxo = utxo_set.build_utxo_set().unwrap();
        let total: u64 = utxo.values().map(TxOutputs::total_value).sum();
        assert_eq!(total, SUBSIDY);
    }

    #[test]
    fn test_append_rejects_repeated_ids() {
        let (chain, _dir) = create_test_blockchain().unwrap();
        let reward = Transaction::new_coinbase_tx(TEST_ADDRESS, "miner").unwrap();
        chain.mine_block(&[reward.clone()]).unwrap();

        // same payload, same address, same ID as the block already on chain
        let again = Transaction::new_coinbase_tx(TEST_ADDRESS, "miner").unwrap();
        assert_eq!(again.get_id(), reward.get_id());
        assert!(matches!(
            chain.mine_block(&[again]),
            Err(LedgerError::InvalidTransaction(_))
        ));

        let fresh = Transaction::new_coinbase_tx(TEST_ADDRESS, "other").unwrap();
        assert!(matches!(
            chain.mine_block(&[fresh.clone(), fresh]),
            Err(LedgerError::InvalidTransaction(_))
        ));
        assert_eq!(chain.get_best_height().unwrap(), 1);

        let utxo = UTXOSet::new(chain.clone()).build_utxo_set().unwrap();
        let total: u64 = utxo.values().map(TxOutputs::total_value).sum();
        let blocks = chain.get_block_hashes().unwrap().len() as u64;
        assert_eq!(total, SUBSIDY * blocks);
    }
}
