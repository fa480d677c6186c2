//! # utxo-ledger
//!
//! A persistent, hash-linked ledger of UTXO transactions.
//!
//! ## Layout
//! - `core/`: blocks, transactions, the chain and its iterator, the block
//!   builder seam with a proof-of-work implementation
//! - `storage/`: the sled store adapter and the UTXO engine
//! - `wallet/`: key pairs, addresses and the local wallet file
//! - `config/`: settings from defaults, an optional TOML file and environment
//! - `utils/`: hashing, signatures, Base58, bincode helpers
//! - `cli/`: command-line definitions used by the binary
//!
//! ## Where to start
//! `core/blockchain.rs` holds the ledger operations (init, open, append,
//! import, traversal). `core/transaction.rs` covers signing and verification,
//! and `storage/utxo_set.rs` answers "what can this key spend".

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

pub use cli::{Command, Opt};
pub use config::{Config, Settings, GLOBAL_CONFIG};
pub use core::{
    Block, BlockBuilder, Blockchain, BlockchainIterator, ProofOfWork, TXInput, TXOutput,
    Transaction, TxOutputs, GENESIS_COINBASE_DATA, SUBSIDY,
};
pub use error::{LedgerError, Result};
pub use storage::{Store, UTXOSet};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet, Wallets,
    ADDRESS_CHECK_SUM_LEN,
};
