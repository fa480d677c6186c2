//! Persistent key-value store backing the ledger
//!
//! A thin adapter over a sled database. Blocks and the tip pointer live in the
//! `blocks` tree; other namespaces (the UTXO index) are opened on demand with
//! [`Store::open_tree`].
//!
//! While a store is open the adapter keeps a `LOCK` marker file holding the
//! owner's pid. sled's own file lock decides who may open the database: a
//! second opener gets [`LedgerError::StoreLocked`] and the owner's marker is
//! untouched. A marker found once sled has granted the lock was left by a
//! crashed process; [`Store::open`] replaces it, and sled's log recovery
//! discards any torn tail write.

use crate::error::{LedgerError, Result};
use log::{info, warn};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Tree};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const BLOCKS_TREE: &str = "blocks";
const LOCK_FILE: &str = "LOCK";
// sled writes this file when a database is first created
const DB_FILE: &str = "db";

struct LockMarker {
    path: PathBuf,
}

impl LockMarker {
    fn acquire(dir: &Path) -> Result<LockMarker> {
        let path = dir.join(LOCK_FILE);
        fs::write(&path, std::process::id().to_string())
            .map_err(|e| LedgerError::StoreIo(format!("Failed to write lock marker: {e}")))?;
        Ok(LockMarker { path })
    }
}

impl Drop for LockMarker {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Could not remove lock marker {}: {e}", self.path.display());
        }
    }
}

#[derive(Clone)]
pub struct Store {
    db: Db,
    blocks: Tree,
    path: PathBuf,
    _marker: Arc<LockMarker>,
}

impl Store {
    /// Existence check: has a store ever been created at `path`?
    pub fn exists(path: impl AsRef<Path>) -> bool {
        path.as_ref().join(DB_FILE).is_file()
    }

    /// Open or create the store at `path`. Fails with `StoreLocked` while
    /// another handle holds the database; the holder's marker is left alone.
    pub fn open(path: impl AsRef<Path>) -> Result<Store> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| match LedgerError::from(e) {
            LedgerError::StoreLocked(reason) => {
                warn!("Store at {} is held by another process: {reason}", path.display());
                LedgerError::StoreLocked(reason)
            }
            other => other,
        })?;

        // sled holds the exclusive lock now, so any marker left is stale
        let lock_path = path.join(LOCK_FILE);
        if lock_path.exists() {
            let owner = fs::read_to_string(&lock_path).unwrap_or_default();
            warn!(
                "Removing stale lock marker of pid {} at {}",
                owner.trim(),
                path.display()
            );
            fs::remove_file(&lock_path).map_err(|e| {
                LedgerError::StoreLocked(format!("removing {}: {e}", lock_path.display()))
            })?;
            info!("Store {} recovered", path.display());
        }

        let blocks = db.open_tree(BLOCKS_TREE)?;
        let marker = LockMarker::acquire(path)?;
        Ok(Store {
            db,
            blocks,
            path: path.to_path_buf(),
            _marker: Arc::new(marker),
        })
    }

    pub fn get_path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.blocks
            .get(key)?
            .map(|value| value.to_vec())
            .ok_or_else(|| LedgerError::NotFound(format!("key {}", display_key(key))))
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.blocks.contains_key(key)?)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.blocks.insert(key, value)?;
        Ok(())
    }

    /// Write every entry or none of them
    pub fn put_all(&self, entries: &[(&[u8], &[u8])]) -> Result<()> {
        self.blocks
            .transaction(|tx_db| {
                for (key, value) in entries {
                    tx_db.insert(*key, *value)?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e: TransactionError<()>| match e {
                TransactionError::Storage(err) => LedgerError::from(err),
                TransactionError::Abort(()) => {
                    LedgerError::StoreIo("Atomic write aborted".to_string())
                }
            })?;
        Ok(())
    }

    pub fn open_tree(&self, name: &str) -> Result<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn display_key(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(text) if text.chars().all(|c| c.is_ascii_graphic()) => text.to_string(),
        _ => data_encoding::HEXLOWER.encode(key),
    }
}
