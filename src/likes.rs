use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::error::{PortalError, Result};
use crate::local_store::{read_json, write_json, LocalStore};

/// Remembers which session already liked which target, so repeated clicks
/// count once. Persisted as a JSON array under `key`.
pub struct LikeLedger {
    store: Arc<dyn LocalStore>,
    key: &'static str,
    lock: Mutex<()>,
}

impl LikeLedger {
    pub fn new(store: Arc<dyn LocalStore>, key: &'static str) -> Self {
        Self { store, key, lock: Mutex::new(()) }
    }

    fn entry(session_id: &str, target_id: &str) -> String {
        format!("{}:{}", session_id, target_id)
    }

    /// Records the like. Returns `false` if this session had already liked it.
    pub fn record(&self, session_id: &str, target_id: &str) -> Result<bool> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| PortalError::Storage("like ledger lock poisoned".to_string()))?;
        let mut liked: BTreeSet<String> = read_json(self.store.as_ref(), self.key)?.unwrap_or_default();
        if !liked.insert(Self::entry(session_id, target_id)) {
            return Ok(false);
        }
        write_json(self.store.as_ref(), self.key, &liked)?;
        Ok(true)
    }

    pub fn has_liked(&self, session_id: &str, target_id: &str) -> Result<bool> {
        let liked: BTreeSet<String> = read_json(self.store.as_ref(), self.key)?.unwrap_or_default();
        Ok(liked.contains(&Self::entry(session_id, target_id)))
    }

    /// Drops a failed like so the user can try again.
    pub fn forget(&self, session_id: &str, target_id: &str) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| PortalError::Storage("like ledger lock poisoned".to_string()))?;
        let mut liked: BTreeSet<String> = read_json(self.store.as_ref(), self.key)?.unwrap_or_default();
        if liked.remove(&Self::entry(session_id, target_id)) {
            write_json(self.store.as_ref(), self.key, &liked)?;
        }
        Ok(())
    }

    /// Moves every session's like from `old_target` to `new_target`.
    /// Used when a queued comment receives its database id.
    pub fn retarget(&self, old_target: &str, new_target: &str) -> Result<usize> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| PortalError::Storage("like ledger lock poisoned".to_string()))?;
        let liked: BTreeSet<String> = read_json(self.store.as_ref(), self.key)?.unwrap_or_default();
        let suffix = format!(":{}", old_target);
        let mut moved = 0;
        let updated: BTreeSet<String> = liked
            .into_iter()
            .map(|entry| match entry.strip_suffix(&suffix) {
                Some(session) => {
                    moved += 1;
                    Self::entry(session, new_target)
                }
                None => entry,
            })
            .collect();
        if moved > 0 {
            write_json(self.store.as_ref(), self.key, &updated)?;
        }
        Ok(moved)
    }
}
