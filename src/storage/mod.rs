//! Persistence
//!
//! The sled-backed key-value store and the UTXO views built on top of it.

pub mod store;
pub mod utxo_set;

pub use store::Store;
pub use utxo_set::UTXOSet;
