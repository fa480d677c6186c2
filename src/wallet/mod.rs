//! Key management and Base58Check addresses
//!
//! The ledger itself only needs `hash_pub_key` and address decoding; wallets
//! supply the private keys used to sign transactions.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN, PUB_KEY_HASH_LEN,
};
pub use wallets::Wallets;
