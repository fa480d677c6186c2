//! Ledger core
//!
//! Blocks, transactions, the block builder seam and the chain itself.

pub mod block;
pub mod blockchain;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{Blockchain, BlockchainIterator, GENESIS_COINBASE_DATA};
pub use proof_of_work::{BlockBuilder, ProofOfWork};
pub use transaction::{TXInput, TXOutput, Transaction, TxOutputs, SUBSIDY};
