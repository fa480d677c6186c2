use crate::error::Result;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

// Environment variables I read on startup; later sources override earlier ones
const CONFIG_FILE_KEY: &str = "LEDGER_CONFIG";
const DATA_DIR_KEY: &str = "DATA_DIR";
const NODE_ID_KEY: &str = "NODE_ID";
const TARGET_BITS_KEY: &str = "TARGET_BITS";

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_NODE_ID: &str = "main";
const DEFAULT_TARGET_BITS: u32 = 12;
const DEFAULT_WALLET_FILE: &str = "wallet.dat";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Plain settings values, as read from the optional TOML file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub node_id: String,
    pub target_bits: u32,
    pub wallet_file: String,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            node_id: String::from(DEFAULT_NODE_ID),
            target_bits: DEFAULT_TARGET_BITS,
            wallet_file: String::from(DEFAULT_WALLET_FILE),
            log_level: String::from(DEFAULT_LOG_LEVEL),
        }
    }
}

impl Settings {
    pub fn from_toml_str(contents: &str) -> Result<Settings> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: &Path) -> Result<Settings> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(node_id) = env::var(NODE_ID_KEY) {
            self.node_id = node_id;
        }
        if let Ok(bits) = env::var(TARGET_BITS_KEY) {
            match bits.parse::<u32>() {
                Ok(bits) => self.target_bits = bits,
                Err(e) => log::warn!("Ignoring {TARGET_BITS_KEY}={bits}: {e}"),
            }
        }
    }
}

pub struct Config {
    inner: RwLock<Settings>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut settings = match env::var(CONFIG_FILE_KEY) {
            Ok(path) => Settings::from_file(Path::new(&path)).unwrap_or_else(|e| {
                log::warn!("Could not load config file {path}: {e}");
                Settings::default()
            }),
            Err(_) => Settings::default(),
        };
        settings.apply_env_overrides();
        Config::with_settings(settings)
    }

    pub fn with_settings(settings: Settings) -> Config {
        Config {
            inner: RwLock::new(settings),
        }
    }

    pub fn settings(&self) -> Settings {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_data_dir(&self) -> PathBuf {
        self.settings().data_dir
    }

    pub fn set_data_dir(&self, dir: PathBuf) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.data_dir = dir;
    }

    pub fn get_node_id(&self) -> String {
        self.settings().node_id
    }

    pub fn set_node_id(&self, node_id: String) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.node_id = node_id;
    }

    pub fn get_target_bits(&self) -> u32 {
        self.settings().target_bits
    }

    pub fn get_log_level(&self) -> String {
        self.settings().log_level
    }

    /// Store location for this node, e.g. `data/blocks_main`
    pub fn get_db_path(&self) -> PathBuf {
        let settings = self.settings();
        settings
            .data_dir
            .join(format!("blocks_{}", settings.node_id))
    }

    pub fn get_wallet_path(&self) -> PathBuf {
        let settings = self.settings();
        settings.data_dir.join(settings.wallet_file)
    }
}
