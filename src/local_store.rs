//! Synchronous key/value persistence standing in for browser localStorage.
//!
//! Values are JSON strings. `FileLocalStore` keeps the whole map in memory
//! and rewrites its file on every mutation, so a crash loses at most the
//! write in progress.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PortalError, Result};

pub const COMMENTS_KEY: &str = "prompt_comments";
pub const RECENT_HASHES_KEY: &str = "recent_comment_hashes";
pub const LIKED_PROMPTS_KEY: &str = "liked_prompts";
pub const LIKED_COMMENTS_KEY: &str = "liked_comments";
pub const BACKUP_KEY_PREFIX: &str = "comments_backup_";
pub const EMERGENCY_BACKUP_KEY: &str = "comments_emergency_backup";
pub const SYNCED_IDS_KEY: &str = "synced_comment_ids";
/// Login timestamp left by older deployments. Session lifetime is decided by
/// the session policy now, so the key is cleared on startup.
pub const AUTH_TIMESTAMP_KEY: &str = "auth_timestamp";

pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// Reads and decodes a JSON value; a missing key yields `None`.
pub fn read_json<T: DeserializeOwned>(store: &dyn LocalStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn write_json<T: Serialize>(store: &dyn LocalStore, key: &str, value: &T) -> Result<()> {
    store.set(key, &serde_json::to_string(value)?)
}

/// Drops the legacy login timestamp. Returns whether one was present.
pub fn clear_stale_session(store: &dyn LocalStore) -> Result<bool> {
    if store.get(AUTH_TIMESTAMP_KEY)?.is_none() {
        return Ok(false);
    }
    store.remove(AUTH_TIMESTAMP_KEY)?;
    Ok(true)
}

#[derive(Default)]
pub struct MemoryLocalStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> PortalError {
    PortalError::Storage("local store lock poisoned".to_string())
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().map_err(|_| poisoned())?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().map_err(|_| poisoned())?.keys().cloned().collect())
    }
}

/// A single JSON file holding every key.
pub struct FileLocalStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileLocalStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            BTreeMap::new()
        };
        log::info!("local store opened at {} ({} keys)", path.display(), entries.len());
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LocalStore for FileLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().map_err(|_| poisoned())?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().map_err(|_| poisoned())?.keys().cloned().collect())
    }
}
