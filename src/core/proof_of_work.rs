//! Block construction
//!
//! The ledger never builds blocks itself; it hands the transaction set, the
//! previous hash and the height to a [`BlockBuilder`]. [`ProofOfWork`] is the
//! builder used by default: it searches for a nonce whose SHA-256 header hash
//! falls below `2^(256 - target_bits)`.

use crate::core::{Block, Transaction};
use crate::error::{LedgerError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::{debug, info};
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;

const MAX_NONCE: i64 = i64::MAX;
const MAX_TARGET_BITS: u32 = 255;

pub trait BlockBuilder: Send + Sync {
    /// Seal `transactions` into a block at `height` on top of `pre_block_hash`.
    /// The returned hash must be a deterministic function of the contents.
    fn create_block(
        &self,
        transactions: &[Transaction],
        pre_block_hash: &[u8],
        height: usize,
    ) -> Result<Block>;

    /// The first block of a chain: height 0, empty previous hash
    fn genesis(&self, coinbase: &Transaction) -> Result<Block> {
        self.create_block(std::slice::from_ref(coinbase), &[], 0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProofOfWork {
    target_bits: u32,
}

impl ProofOfWork {
    pub fn new(target_bits: u32) -> ProofOfWork {
        ProofOfWork {
            target_bits: target_bits.min(MAX_TARGET_BITS),
        }
    }

    /// Builder using the configured difficulty
    pub fn from_config() -> ProofOfWork {
        Self::new(crate::config::GLOBAL_CONFIG.get_target_bits())
    }

    pub fn get_target_bits(&self) -> u32 {
        self.target_bits
    }

    fn target(difficulty: u32) -> BigInt {
        let mut target = BigInt::from(1);
        target.shl_assign(256 - difficulty.min(MAX_TARGET_BITS));
        target
    }

    fn prepare_data(block: &Block, nonce: i64) -> Vec<u8> {
        let mut data_bytes = vec![];
        data_bytes.extend(block.get_pre_block_hash());
        data_bytes.extend(block.hash_transactions());
        data_bytes.extend(block.get_timestamp().to_be_bytes());
        data_bytes.extend((block.get_height() as u64).to_be_bytes());
        data_bytes.extend(block.get_difficulty().to_be_bytes());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes
    }

    /// Check that a block's hash matches its contents and meets its difficulty
    pub fn validate(block: &Block) -> bool {
        let data = Self::prepare_data(block, block.get_nonce());
        let hash = sha256_digest(data.as_slice());
        let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
        hash == block.get_hash() && hash_int < Self::target(block.get_difficulty())
    }

    fn run(&self, block: &Block) -> Result<(i64, Vec<u8>)> {
        let target = Self::target(self.target_bits);
        let mut nonce = 0;
        while nonce < MAX_NONCE {
            let data = Self::prepare_data(block, nonce);
            let hash = sha256_digest(data.as_slice());
            let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
            if hash_int < target {
                return Ok((nonce, hash));
            }
            nonce += 1;
        }
        Err(LedgerError::InvalidBlock(format!(
            "Nonce space exhausted at height {}",
            block.get_height()
        )))
    }
}

impl BlockBuilder for ProofOfWork {
    fn create_block(
        &self,
        transactions: &[Transaction],
        pre_block_hash: &[u8],
        height: usize,
    ) -> Result<Block> {
        let mut block = Block::new_unsealed(pre_block_hash, transactions, height, self.target_bits)?;
        debug!(
            "Starting proof-of-work for block at height {height} with difficulty {}",
            self.target_bits
        );
        let (nonce, hash) = self.run(&block)?;
        block.seal(nonce, hash);
        info!(
            "Sealed block {} at height {height} (nonce {nonce})",
            HEXLOWER.encode(block.get_hash())
        );
        Ok(block)
    }
}
