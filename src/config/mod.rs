//! Configuration management
//!
//! Node settings (data directory, node id, proof-of-work difficulty, wallet
//! file, log level) come from built-in defaults, an optional TOML file named by
//! `LEDGER_CONFIG`, and environment overrides, in that order.

pub mod settings;

pub use settings::{Config, Settings, GLOBAL_CONFIG};
