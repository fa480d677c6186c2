//! Error handling for the ledger
//!
//! Every fallible operation in the crate returns [`LedgerError`]. The first six
//! variants are the taxonomy callers are expected to match on; the rest carry
//! context from the supporting layers (crypto, encoding, wallets, config).

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Missing block, missing tip key or missing referenced transaction
    NotFound(String),
    /// Ledger initialisation on a location that already holds one
    AlreadyExists(String),
    /// Signature/verification failure or a spend of an already consumed output
    InvalidTransaction(String),
    /// Spendable total below the requested amount
    InsufficientFunds { required: u64, available: u64 },
    /// Exclusive lock on the store could not be acquired
    StoreLocked(String),
    /// Unrecoverable persistence fault
    StoreIo(String),
    /// Block rejected by the builder or on import
    InvalidBlock(String),
    /// Address failed Base58Check decoding or validation
    InvalidAddress(String),
    /// Key handling, signing or hashing failure
    Crypto(String),
    /// Encoding/decoding failure
    Serialization(String),
    /// Wallet lookup or wallet file failure
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors outside the store
    Io(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::NotFound(what) => write!(f, "Not found: {what}"),
            LedgerError::AlreadyExists(what) => write!(f, "Already exists: {what}"),
            LedgerError::InvalidTransaction(msg) => write!(f, "Invalid transaction: {msg}"),
            LedgerError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            LedgerError::StoreLocked(msg) => write!(f, "Store locked: {msg}"),
            LedgerError::StoreIo(msg) => write!(f, "Store I/O error: {msg}"),
            LedgerError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            LedgerError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            LedgerError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            LedgerError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            LedgerError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            LedgerError::Config(msg) => write!(f, "Configuration error: {msg}"),
            LedgerError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        match &err {
            sled::Error::Io(io) if is_lock_conflict(io) => {
                LedgerError::StoreLocked(err.to_string())
            }
            _ => LedgerError::StoreIo(err.to_string()),
        }
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

// sled reports a held file lock as a plain io::Error
fn is_lock_conflict(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.to_string().to_lowercase().contains("lock")
}
