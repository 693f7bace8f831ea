//! Per-suggestion comment cache kept consistent with the document database.
//!
//! Every comment lands in the local store first. Remote writes happen after,
//! and a failed one leaves the comment queued under its `local_` id until a
//! later `sync`. A comment being written is tracked in `in_flight`, so `save`
//! and `sync` never send the same comment twice. Every synthetic id that
//! reached the database is remembered in `synced_ids`, so entries coming
//! back from a backup or import are rewritten instead of being sent again.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{PortalError, Result};
use crate::export::{comments_csv, CommentExport};
use crate::likes::LikeLedger;
use crate::local_store::{
    read_json, write_json, LocalStore, BACKUP_KEY_PREFIX, COMMENTS_KEY, EMERGENCY_BACKUP_KEY,
    LIKED_COMMENTS_KEY, RECENT_HASHES_KEY, SYNCED_IDS_KEY,
};
use crate::models::comment::is_synthetic_id;
use crate::models::{Comment, CommentAuthor};
use crate::remote::CommentRemote;
use crate::validation::validate_comment;

/// Dated snapshots kept by `backup`; older ones are pruned.
pub const MAX_BACKUPS: usize = 7;

type CommentMap = BTreeMap<String, Vec<Comment>>;

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Stored remotely; the cache entry already carries the database id.
    Synced(Comment),
    /// Remote write failed; the comment waits locally for `sync`.
    Queued(Comment),
    /// Same text, suggestion and session seen within the duplicate window.
    Duplicate,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub prompts: usize,
    pub total: usize,
    pub pending_sync: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LikeOutcome {
    pub liked: bool,
    pub likes: i64,
}

#[derive(Default)]
struct CacheState {
    comments: CommentMap,
    /// Duplicate-suppression hash -> submission time in millis.
    recent_hashes: HashMap<String, i64>,
    /// Synthetic ids with a remote insert underway.
    in_flight: HashSet<String>,
    /// Synthetic id -> database id for every insert that succeeded.
    synced_ids: HashMap<String, String>,
}

/// Local changes made to a comment while its insert was underway.
#[derive(Debug, Default)]
struct Drift {
    likes: i64,
    flagged: Option<bool>,
}

impl CacheState {
    fn find_mut(&mut self, prompt_id: &str, comment_id: &str) -> Option<&mut Comment> {
        self.comments
            .get_mut(prompt_id)
            .and_then(|list| list.iter_mut().find(|c| c.id == comment_id))
    }

    /// Swaps the synthetic entry for its database-backed form. Likes and
    /// flags set on the cached entry since `inserted` was sent are kept.
    fn settle(&mut self, inserted: &Comment, remote_id: String) -> (Comment, Drift) {
        self.synced_ids.insert(inserted.id.clone(), remote_id.clone());
        match self.find_mut(&inserted.prompt_id, &inserted.id) {
            Some(slot) => {
                let synced = slot.with_remote_id(remote_id);
                *slot = synced.clone();
                let drift = Drift {
                    likes: synced.likes - inserted.likes,
                    flagged: (synced.flagged != inserted.flagged).then_some(synced.flagged),
                };
                (synced, drift)
            }
            None => (inserted.with_remote_id(remote_id), Drift::default()),
        }
    }

    fn purge_expired_hashes(&mut self, now: DateTime<Utc>, window: Duration) {
        let cutoff = now.timestamp_millis() - window.num_milliseconds();
        self.recent_hashes.retain(|_, at| *at > cutoff);
    }
}

/// Rewrites entries whose insert already landed to their database-backed
/// form and drops the repeats this creates. Returns how many were rewritten.
fn reconcile(comments: &mut CommentMap, synced_ids: &HashMap<String, String>) -> usize {
    let mut rewritten = 0;
    for list in comments.values_mut() {
        for c in list.iter_mut() {
            if let Some(remote_id) = synced_ids.get(&c.id) {
                *c = c.with_remote_id(remote_id.clone());
                rewritten += 1;
            }
        }
        let mut seen = HashSet::new();
        list.retain(|c| seen.insert(c.id.clone()));
    }
    rewritten
}

fn newest_first(list: &mut [Comment]) {
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Hash of suggestion id, trimmed text and session used to spot re-submissions.
pub fn comment_hash(prompt_id: &str, text: &str, session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt_id.as_bytes());
    hasher.update(b"|");
    hasher.update(text.trim().as_bytes());
    hasher.update(b"|");
    hasher.update(session_id.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct CommentCache {
    remote: Arc<dyn CommentRemote>,
    store: Arc<dyn LocalStore>,
    likes: LikeLedger,
    duplicate_window: Duration,
    state: Mutex<CacheState>,
}

impl CommentCache {
    /// Restores the cached mapping and recent hashes from the local store.
    pub fn new(
        remote: Arc<dyn CommentRemote>,
        store: Arc<dyn LocalStore>,
        duplicate_window: Duration,
    ) -> Result<Self> {
        let comments: CommentMap = read_json(store.as_ref(), COMMENTS_KEY)?.unwrap_or_default();
        let recent_hashes = read_json(store.as_ref(), RECENT_HASHES_KEY)?.unwrap_or_default();
        let synced_ids = read_json(store.as_ref(), SYNCED_IDS_KEY)?.unwrap_or_default();
        info!(
            "comment cache restored: {} suggestions, {} comments",
            comments.len(),
            comments.values().map(Vec::len).sum::<usize>()
        );
        Ok(Self {
            likes: LikeLedger::new(store.clone(), LIKED_COMMENTS_KEY),
            remote,
            store,
            duplicate_window,
            state: Mutex::new(CacheState {
                comments,
                recent_hashes,
                in_flight: HashSet::new(),
                synced_ids,
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|_| PortalError::Storage("comment cache lock poisoned".to_string()))
    }

    /// Local persistence failures are logged; the in-memory state stays authoritative.
    fn persist(&self, state: &CacheState) {
        if let Err(e) = write_json(self.store.as_ref(), COMMENTS_KEY, &state.comments) {
            error!("failed to persist comment cache: {}", e);
        }
    }

    fn persist_synced_ids(&self, state: &CacheState) {
        if let Err(e) = write_json(self.store.as_ref(), SYNCED_IDS_KEY, &state.synced_ids) {
            error!("failed to persist synced comment ids: {}", e);
        }
    }

    /// Follow-up once a queued comment has its database id: moves the
    /// session likes over and replays changes made during the insert.
    async fn after_settle(&self, local_id: &str, synced: &Comment, drift: Drift) {
        if let Err(e) = self.likes.retarget(local_id, &synced.id) {
            error!("likes for {} not moved to {}: {}", local_id, synced.id, e);
        }
        for _ in 0..drift.likes.max(0) {
            if let Err(e) = self.remote.increment_likes(&synced.id).await {
                warn!("like on {} only counted locally: {}", synced.id, e);
                break;
            }
        }
        if let Some(flagged) = drift.flagged {
            if let Err(e) = self.remote.set_flagged(&synced.id, flagged).await {
                warn!("flag on {} only set locally: {}", synced.id, e);
            }
        }
    }

    fn persist_hashes(&self, state: &CacheState) {
        if let Err(e) = write_json(self.store.as_ref(), RECENT_HASHES_KEY, &state.recent_hashes) {
            error!("failed to persist recent comment hashes: {}", e);
        }
    }

    /// Comments for a suggestion, newest first.
    ///
    /// A successful fetch replaces the cached entry; comments still waiting for
    /// sync stay in it. On any remote failure the cached entry is returned.
    pub async fn load(&self, prompt_id: &str) -> Result<Vec<Comment>> {
        match self.remote.list(prompt_id).await {
            Ok(fetched) => {
                let mut state = self.lock()?;
                let pending: Vec<Comment> = state
                    .comments
                    .get(prompt_id)
                    .map(|list| {
                        list.iter()
                            .filter(|c| c.is_synthetic())
                            // an in-flight insert may already be visible remotely
                            .filter(|c| {
                                !fetched.iter().any(|r| {
                                    r.session_id == c.session_id
                                        && r.text == c.text
                                        && r.created_at == c.created_at
                                })
                            })
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();

                let mut merged = pending;
                merged.extend(fetched);
                newest_first(&mut merged);
                state.comments.insert(prompt_id.to_string(), merged.clone());
                self.persist(&state);
                debug!("loaded {} comments for {}", merged.len(), prompt_id);
                Ok(merged)
            }
            Err(e) => {
                warn!("remote comment load failed for {}, using local cache: {}", prompt_id, e);
                Ok(self.cached(prompt_id)?)
            }
        }
    }

    /// The cached entry for a suggestion, without touching the remote store.
    pub fn cached(&self, prompt_id: &str) -> Result<Vec<Comment>> {
        Ok(self.lock()?.comments.get(prompt_id).cloned().unwrap_or_default())
    }

    pub async fn save(&self, prompt_id: &str, text: &str, author: &CommentAuthor) -> Result<SaveOutcome> {
        let text = validate_comment(text)?;
        let now = Utc::now();
        let hash = comment_hash(prompt_id, &text, &author.session_id);

        let comment = {
            let mut state = self.lock()?;
            state.purge_expired_hashes(now, self.duplicate_window);
            if state.recent_hashes.contains_key(&hash) {
                info!("duplicate comment suppressed for {}", prompt_id);
                return Ok(SaveOutcome::Duplicate);
            }
            state.recent_hashes.insert(hash, now.timestamp_millis());

            let comment = Comment::local(prompt_id, &text, author, now);
            state.in_flight.insert(comment.id.clone());
            state
                .comments
                .entry(prompt_id.to_string())
                .or_default()
                .insert(0, comment.clone());
            self.persist(&state);
            self.persist_hashes(&state);
            comment
        };

        let result = self.remote.insert(&comment).await;

        let settled = {
            let mut state = self.lock()?;
            state.in_flight.remove(&comment.id);
            match result {
                Ok(remote_id) => {
                    let settled = state.settle(&comment, remote_id);
                    self.persist(&state);
                    self.persist_synced_ids(&state);
                    Some(settled)
                }
                Err(e) => {
                    warn!("comment for {} kept locally until next sync: {}", prompt_id, e);
                    None
                }
            }
        };

        match settled {
            Some((synced, drift)) => {
                self.after_settle(&comment.id, &synced, drift).await;
                info!("comment {} stored for {}", synced.id, prompt_id);
                Ok(SaveOutcome::Synced(synced))
            }
            None => Ok(SaveOutcome::Queued(comment)),
        }
    }

    /// Pushes every queued local comment to the remote store.
    ///
    /// Failures are left queued for the next call; nothing is retried here.
    pub async fn sync(&self) -> Result<SyncReport> {
        let pending: Vec<Comment> = {
            let mut state = self.lock()?;
            let state = &mut *state;
            if reconcile(&mut state.comments, &state.synced_ids) > 0 {
                self.persist(state);
            }
            let pending: Vec<Comment> = state
                .comments
                .values()
                .flatten()
                .filter(|c| c.is_synthetic())
                .filter(|c| !state.in_flight.contains(&c.id))
                .cloned()
                .collect();
            for c in &pending {
                state.in_flight.insert(c.id.clone());
            }
            pending
        };

        let mut report = SyncReport { attempted: pending.len(), ..Default::default() };
        if pending.is_empty() {
            return Ok(report);
        }

        for comment in pending {
            let result = self.remote.insert(&comment).await;
            let settled = {
                let mut state = self.lock()?;
                state.in_flight.remove(&comment.id);
                match result {
                    Ok(remote_id) => Some(state.settle(&comment, remote_id)),
                    Err(e) => {
                        debug!("sync of {} failed: {}", comment.id, e);
                        None
                    }
                }
            };
            match settled {
                Some((synced, drift)) => {
                    self.after_settle(&comment.id, &synced, drift).await;
                    report.synced += 1;
                }
                None => report.failed += 1,
            }
        }

        let state = self.lock()?;
        self.persist(&state);
        self.persist_synced_ids(&state);
        info!(
            "comment sync: {} attempted, {} synced, {} still local",
            report.attempted, report.synced, report.failed
        );
        Ok(report)
    }

    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.lock()?.comments.values().flatten().filter(|c| c.is_synthetic()).count())
    }

    /// Removes a comment. Database-backed comments are deleted remotely first.
    pub async fn delete(&self, prompt_id: &str, comment_id: &str) -> Result<()> {
        {
            let state = self.lock()?;
            if state.in_flight.contains(comment_id) {
                return Err(PortalError::Conflict(format!(
                    "comment {} is being written, try again shortly",
                    comment_id
                )));
            }
        }
        if !is_synthetic_id(comment_id) {
            self.remote.delete(comment_id).await?;
        }

        let mut state = self.lock()?;
        let removed = match state.comments.get_mut(prompt_id) {
            Some(list) => {
                let before = list.len();
                list.retain(|c| c.id != comment_id);
                before != list.len()
            }
            None => false,
        };
        if !removed && is_synthetic_id(comment_id) {
            return Err(PortalError::not_found("Comment", comment_id));
        }
        self.persist(&state);
        info!("comment {} deleted from {}", comment_id, prompt_id);
        Ok(())
    }

    /// Likes a comment at most once per session.
    pub async fn like(&self, prompt_id: &str, comment_id: &str, session_id: &str) -> Result<LikeOutcome> {
        let current = {
            let state = self.lock()?;
            state
                .comments
                .get(prompt_id)
                .and_then(|list| list.iter().find(|c| c.id == comment_id))
                .map(|c| c.likes)
        };
        let current = current.ok_or_else(|| PortalError::not_found("Comment", comment_id))?;

        if !self.likes.record(session_id, comment_id)? {
            return Ok(LikeOutcome { liked: false, likes: current });
        }

        if !is_synthetic_id(comment_id) {
            if let Err(e) = self.remote.increment_likes(comment_id).await {
                warn!("like for comment {} only counted locally: {}", comment_id, e);
            }
        }

        let mut state = self.lock()?;
        let likes = match state.find_mut(prompt_id, comment_id) {
            Some(c) => {
                c.likes += 1;
                c.likes
            }
            None => current + 1,
        };
        self.persist(&state);
        Ok(LikeOutcome { liked: true, likes })
    }

    /// Sets or clears the moderation flag.
    pub async fn flag(&self, prompt_id: &str, comment_id: &str, flagged: bool) -> Result<Comment> {
        if !is_synthetic_id(comment_id) {
            self.remote.set_flagged(comment_id, flagged).await?;
        }
        let mut state = self.lock()?;
        let updated = match state.find_mut(prompt_id, comment_id) {
            Some(c) => {
                c.flagged = flagged;
                c.clone()
            }
            None => return Err(PortalError::not_found("Comment", comment_id)),
        };
        self.persist(&state);
        Ok(updated)
    }

    /// Drops every comment of a deleted suggestion, remotely and locally.
    pub async fn purge_prompt(&self, prompt_id: &str) -> Result<u64> {
        let removed = self.remote.delete_for_prompt(prompt_id).await?;
        let mut state = self.lock()?;
        if state.comments.remove(prompt_id).is_some() {
            self.persist(&state);
        }
        Ok(removed)
    }

    /// Collapses repeated ids and identical submissions within each suggestion.
    pub fn remove_duplicates(&self) -> Result<usize> {
        let mut state = self.lock()?;
        let mut removed = 0;
        for list in state.comments.values_mut() {
            let mut seen_ids = HashSet::new();
            let mut seen_content = HashSet::new();
            let before = list.len();
            list.retain(|c| {
                let content = (c.session_id.clone(), c.text.clone(), c.created_at.timestamp_millis());
                seen_ids.insert(c.id.clone()) && seen_content.insert(content)
            });
            removed += before - list.len();
        }
        if removed > 0 {
            self.persist(&state);
            info!("removed {} duplicate comments", removed);
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let state = self.lock()?;
        Ok(CacheStats {
            prompts: state.comments.len(),
            total: state.comments.values().map(Vec::len).sum(),
            pending_sync: state.comments.values().flatten().filter(|c| c.is_synthetic()).count(),
        })
    }

    pub fn snapshot(&self) -> Result<CommentMap> {
        Ok(self.lock()?.comments.clone())
    }

    /// Writes a dated snapshot and prunes all but the newest `MAX_BACKUPS`.
    pub fn backup(&self, date: NaiveDate) -> Result<String> {
        let key = format!("{}{}", BACKUP_KEY_PREFIX, date.format("%Y-%m-%d"));
        write_json(self.store.as_ref(), &key, &self.snapshot()?)?;

        let mut dated = self.dated_backups()?;
        if dated.len() > MAX_BACKUPS {
            let excess = dated.len() - MAX_BACKUPS;
            for old in dated.drain(..excess) {
                self.store.remove(&old)?;
                debug!("pruned backup {}", old);
            }
        }
        info!("comment backup written to {}", key);
        Ok(key)
    }

    /// Last-chance snapshot taken on shutdown.
    pub fn emergency_backup(&self) -> Result<()> {
        write_json(self.store.as_ref(), EMERGENCY_BACKUP_KEY, &self.snapshot()?)
    }

    fn dated_backups(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .store
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(BACKUP_KEY_PREFIX))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Dated backups oldest first, followed by the emergency snapshot if present.
    pub fn list_backups(&self) -> Result<Vec<String>> {
        let mut keys = self.dated_backups()?;
        if self.store.get(EMERGENCY_BACKUP_KEY)?.is_some() {
            keys.push(EMERGENCY_BACKUP_KEY.to_string());
        }
        Ok(keys)
    }

    /// Replaces the cached mapping with a backup; returns the comment count.
    pub fn restore(&self, key: &str) -> Result<usize> {
        if !(key.starts_with(BACKUP_KEY_PREFIX) || key == EMERGENCY_BACKUP_KEY) {
            return Err(PortalError::validation("not a comment backup key"));
        }
        let mut restored: CommentMap = read_json(self.store.as_ref(), key)?
            .ok_or_else(|| PortalError::not_found("Backup", key))?;
        let mut state = self.lock()?;
        let rewritten = reconcile(&mut restored, &state.synced_ids);
        if rewritten > 0 {
            debug!("{} restored comments were already stored remotely", rewritten);
        }
        let total = restored.values().map(Vec::len).sum();
        state.comments = restored;
        self.persist(&state);
        info!("restored {} comments from {}", total, key);
        Ok(total)
    }

    pub fn export_json(&self) -> Result<String> {
        let export = CommentExport::new(self.snapshot()?, Utc::now());
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Replaces the cached mapping with the one in an exported payload.
    pub fn import_json(&self, raw: &str) -> Result<usize> {
        let mut comments = CommentExport::parse(raw)?.comments;
        let mut state = self.lock()?;
        reconcile(&mut comments, &state.synced_ids);
        let total = comments.values().map(Vec::len).sum();
        state.comments = comments;
        self.persist(&state);
        info!("imported {} comments", total);
        Ok(total)
    }

    pub fn export_csv(&self) -> Result<String> {
        Ok(comments_csv(&self.snapshot()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::local_store::MemoryLocalStore;
    use crate::remote::testing::FakeRemote;

    fn setup() -> (Arc<FakeRemote>, Arc<MemoryLocalStore>, CommentCache) {
        let remote = Arc::new(FakeRemote::default());
        let store = Arc::new(MemoryLocalStore::new());
        let cache = CommentCache::new(remote.clone(), store.clone(), Duration::seconds(60)).unwrap();
        (remote, store, cache)
    }

    fn author(session: &str) -> CommentAuthor {
        CommentAuthor {
            name: "Ana Souza".into(),
            email: Some("ana@pge.sc.gov.br".into()),
            photo_url: None,
            session_id: session.into(),
            uid: None,
            is_institutional: true,
        }
    }

    #[tokio::test]
    async fn offline_save_queues_then_sync_replaces_synthetic_entry() {
        let (remote, _store, cache) = setup();
        remote.set_offline(true);

        let outcome = cache.save("abc123", "Muito útil, obrigado!", &author("s1")).await.unwrap();
        let queued = match outcome {
            SaveOutcome::Queued(c) => c,
            other => panic!("expected queued, got {:?}", other),
        };
        assert!(queued.id.starts_with("local_"));

        let cached = cache.cached("abc123").unwrap();
        assert_eq!(cached.len(), 1);
        assert!(cached[0].is_local);
        assert_eq!(cache.pending_count().unwrap(), 1);

        remote.set_offline(false);
        let report = cache.sync().await.unwrap();
        assert_eq!(report, SyncReport { attempted: 1, synced: 1, failed: 0 });

        let cached = cache.cached("abc123").unwrap();
        assert_eq!(cached.len(), 1);
        assert!(!cached[0].is_local);
        assert!(!cached[0].id.starts_with("local_"));
        assert_eq!(cached[0].text, "Muito útil, obrigado!");
        assert_eq!(remote.row_count(), 1);
    }

    #[tokio::test]
    async fn online_save_backfills_the_database_id() {
        let (remote, _store, cache) = setup();
        let outcome = cache.save("p1", "Ótima sugestão", &author("s1")).await.unwrap();
        let synced = match outcome {
            SaveOutcome::Synced(c) => c,
            other => panic!("expected synced, got {:?}", other),
        };
        let cached = cache.cached("p1").unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, synced.id);
        assert!(!cached[0].is_local);
        assert_eq!(remote.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn every_valid_submission_adds_one_entry_regardless_of_remote() {
        let (remote, _store, cache) = setup();
        cache.save("p1", "primeiro", &author("s1")).await.unwrap();
        remote.set_offline(true);
        cache.save("p1", "segundo", &author("s1")).await.unwrap();
        assert_eq!(cache.cached("p1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_text_never_reaches_cache_or_remote() {
        let (remote, _store, cache) = setup();
        assert!(matches!(
            cache.save("p1", "   ", &author("s1")).await,
            Err(PortalError::Validation(_))
        ));
        assert!(cache.cached("p1").unwrap().is_empty());
        assert_eq!(remote.inserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_within_window_is_written_once() {
        let (remote, _store, cache) = setup();
        let first = cache.save("p1", "Muito bom", &author("s1")).await.unwrap();
        assert!(matches!(first, SaveOutcome::Synced(_)));
        let second = cache.save("p1", "  Muito bom ", &author("s1")).await.unwrap();
        assert_eq!(second, SaveOutcome::Duplicate);
        assert_eq!(remote.inserts.load(Ordering::SeqCst), 1);
        assert_eq!(cache.cached("p1").unwrap().len(), 1);

        // different session is a different submission
        let other = cache.save("p1", "Muito bom", &author("s2")).await.unwrap();
        assert!(matches!(other, SaveOutcome::Synced(_)));
    }

    #[tokio::test]
    async fn duplicate_window_expires() {
        let remote = Arc::new(FakeRemote::default());
        let cache = CommentCache::new(remote.clone(), Arc::new(MemoryLocalStore::new()), Duration::zero())
            .unwrap();
        cache.save("p1", "de novo", &author("s1")).await.unwrap();
        let again = cache.save("p1", "de novo", &author("s1")).await.unwrap();
        assert!(matches!(again, SaveOutcome::Synced(_)));
        assert_eq!(remote.inserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn sync_without_pending_makes_no_remote_calls() {
        let (remote, _store, cache) = setup();
        cache.save("p1", "já sincronizado", &author("s1")).await.unwrap();
        let before = remote.inserts.load(Ordering::SeqCst);

        let report = cache.sync().await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(remote.inserts.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn sync_writes_each_pending_entry_once() {
        let (remote, _store, cache) = setup();
        remote.set_offline(true);
        for (i, prompt) in ["p1", "p1", "p2"].iter().enumerate() {
            cache.save(prompt, &format!("comentário {}", i), &author("s1")).await.unwrap();
        }
        assert_eq!(cache.pending_count().unwrap(), 3);

        // still offline: everything stays queued
        let failed = cache.sync().await.unwrap();
        assert_eq!(failed, SyncReport { attempted: 3, synced: 0, failed: 3 });

        remote.set_offline(false);
        let report = cache.sync().await.unwrap();
        assert_eq!(report.synced, 3);
        assert_eq!(cache.pending_count().unwrap(), 0);
        assert_eq!(remote.inserts.load(Ordering::SeqCst), 3);
        assert_eq!(remote.row_count(), 3);
    }

    #[tokio::test]
    async fn load_falls_back_to_cache_and_keeps_queued_entries() {
        let (remote, _store, cache) = setup();
        cache.save("p1", "online", &author("s1")).await.unwrap();
        remote.set_offline(true);
        cache.save("p1", "offline", &author("s1")).await.unwrap();

        let fallback = cache.load("p1").await.unwrap();
        assert_eq!(fallback.len(), 2);

        remote.set_offline(false);
        let loaded = cache.load("p1").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.iter().filter(|c| c.is_local).count(), 1);
        assert!(loaded[0].created_at >= loaded[1].created_at);

        assert!(cache.load("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn like_counts_once_per_session() {
        let (remote, _store, cache) = setup();
        let c = match cache.save("p1", "curti", &author("s1")).await.unwrap() {
            SaveOutcome::Synced(c) => c,
            other => panic!("unexpected {:?}", other),
        };
        let first = cache.like("p1", &c.id, "s9").await.unwrap();
        assert_eq!(first, LikeOutcome { liked: true, likes: 1 });
        let second = cache.like("p1", &c.id, "s9").await.unwrap();
        assert_eq!(second, LikeOutcome { liked: false, likes: 1 });
        assert_eq!(remote.list("p1").await.unwrap()[0].likes, 1);

        assert!(matches!(
            cache.like("p1", "missing", "s9").await,
            Err(PortalError::NotFound(..))
        ));
    }

    #[tokio::test]
    async fn delete_and_flag_touch_remote_and_cache() {
        let (remote, _store, cache) = setup();
        let c = match cache.save("p1", "moderar", &author("s1")).await.unwrap() {
            SaveOutcome::Synced(c) => c,
            other => panic!("unexpected {:?}", other),
        };
        let flagged = cache.flag("p1", &c.id, true).await.unwrap();
        assert!(flagged.flagged);

        cache.delete("p1", &c.id).await.unwrap();
        assert!(cache.cached("p1").unwrap().is_empty());
        assert_eq!(remote.row_count(), 0);

        remote.set_offline(true);
        let queued = match cache.save("p1", "local só", &author("s1")).await.unwrap() {
            SaveOutcome::Queued(c) => c,
            other => panic!("unexpected {:?}", other),
        };
        cache.delete("p1", &queued.id).await.unwrap();
        assert_eq!(cache.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn export_then_import_reproduces_mapping() {
        let (remote, _store, cache) = setup();
        cache.save("p1", "um", &author("s1")).await.unwrap();
        remote.set_offline(true);
        cache.save("p2", "dois", &author("s2")).await.unwrap();

        let before = cache.snapshot().unwrap();
        let exported = cache.export_json().unwrap();
        assert!(exported.contains("\"version\": \"1.0\""));

        let (_r, _s, fresh) = setup();
        assert_eq!(fresh.import_json(&exported).unwrap(), 2);
        assert_eq!(fresh.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn backups_are_pruned_and_restorable() {
        let (_remote, store, cache) = setup();
        cache.save("p1", "guardar", &author("s1")).await.unwrap();

        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        for offset in 0..(MAX_BACKUPS as i64 + 2) {
            cache.backup(start + Duration::days(offset)).unwrap();
        }
        cache.emergency_backup().unwrap();

        let backups = cache.list_backups().unwrap();
        assert_eq!(backups.len(), MAX_BACKUPS + 1);
        assert_eq!(backups[0], "comments_backup_2026-01-03");
        assert_eq!(backups.last().unwrap(), EMERGENCY_BACKUP_KEY);

        let snapshot = cache.snapshot().unwrap();
        cache.import_json(&serde_json::to_string(&CommentExport::new(BTreeMap::new(), Utc::now())).unwrap())
            .unwrap();
        assert!(cache.snapshot().unwrap().is_empty());

        assert_eq!(cache.restore(EMERGENCY_BACKUP_KEY).unwrap(), 1);
        assert_eq!(cache.snapshot().unwrap(), snapshot);
        assert!(cache.restore("liked_prompts").is_err());
        assert!(store.get("comments_backup_2026-01-01").unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_duplicates_collapses_repeated_ids() {
        let (_remote, store, _cache) = setup();
        let c = Comment::local("p1", "repetido", &author("s1"), Utc::now());
        let mut map = CommentMap::new();
        map.insert("p1".into(), vec![c.clone(), c.clone(), c]);
        write_json(store.as_ref(), COMMENTS_KEY, &map).unwrap();

        let remote = Arc::new(FakeRemote::default());
        let cache = CommentCache::new(remote, store, Duration::seconds(60)).unwrap();
        assert_eq!(cache.remove_duplicates().unwrap(), 2);
        assert_eq!(cache.stats().unwrap(), CacheStats { prompts: 1, total: 1, pending_sync: 1 });
    }

    #[tokio::test]
    async fn cache_survives_restart_through_local_store() {
        let (remote, store, cache) = setup();
        remote.set_offline(true);
        cache.save("abc123", "persistido", &author("s1")).await.unwrap();
        drop(cache);

        let reopened = CommentCache::new(remote.clone(), store, Duration::seconds(60)).unwrap();
        assert_eq!(reopened.pending_count().unwrap(), 1);
        // the duplicate hash survived too
        let again = reopened.save("abc123", "persistido", &author("s1")).await.unwrap();
        assert_eq!(again, SaveOutcome::Duplicate);
    }

    #[tokio::test]
    async fn purge_prompt_clears_both_sides() {
        let (remote, _store, cache) = setup();
        cache.save("p1", "a", &author("s1")).await.unwrap();
        cache.save("p1", "b", &author("s1")).await.unwrap();
        assert_eq!(cache.purge_prompt("p1").await.unwrap(), 2);
        assert!(cache.cached("p1").unwrap().is_empty());
        assert_eq!(remote.row_count(), 0);
    }

    #[tokio::test]
    async fn restoring_an_older_snapshot_does_not_resend_synced_comments() {
        let (remote, store, cache) = setup();
        remote.set_offline(true);
        cache.save("abc123", "Muito útil, obrigado!", &author("s1")).await.unwrap();
        let key = cache.backup(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()).unwrap();
        let exported = cache.export_json().unwrap();

        remote.set_offline(false);
        assert_eq!(cache.sync().await.unwrap().synced, 1);
        let synced_id = cache.cached("abc123").unwrap()[0].id.clone();

        assert_eq!(cache.restore(&key).unwrap(), 1);
        let restored = cache.cached("abc123").unwrap();
        assert_eq!(restored[0].id, synced_id);
        assert!(!restored[0].is_local);
        assert_eq!(cache.sync().await.unwrap(), SyncReport::default());

        assert_eq!(cache.import_json(&exported).unwrap(), 1);
        assert_eq!(cache.pending_count().unwrap(), 0);
        assert_eq!(cache.sync().await.unwrap(), SyncReport::default());

        // the id mapping is persisted with the rest of the cache
        drop(cache);
        let reopened = CommentCache::new(remote.clone(), store, Duration::seconds(60)).unwrap();
        reopened.restore(&key).unwrap();
        assert_eq!(reopened.sync().await.unwrap(), SyncReport::default());
        assert_eq!(remote.row_count(), 1);
        assert_eq!(remote.insert_count(), 1);
    }

    #[tokio::test]
    async fn a_session_likes_a_comment_once_across_sync() {
        let (remote, _store, cache) = setup();
        remote.set_offline(true);
        let queued = match cache.save("p1", "curti offline", &author("s1")).await.unwrap() {
            SaveOutcome::Queued(c) => c,
            other => panic!("unexpected {:?}", other),
        };
        let first = cache.like("p1", &queued.id, "s9").await.unwrap();
        assert_eq!(first, LikeOutcome { liked: true, likes: 1 });

        remote.set_offline(false);
        cache.sync().await.unwrap();
        let synced = cache.cached("p1").unwrap()[0].clone();
        assert!(!synced.is_synthetic());
        assert_eq!(synced.likes, 1);

        let again = cache.like("p1", &synced.id, "s9").await.unwrap();
        assert_eq!(again, LikeOutcome { liked: false, likes: 1 });
        assert_eq!(remote.list("p1").await.unwrap()[0].likes, 1);
    }

    #[tokio::test]
    async fn comment_being_written_is_sent_once_and_keeps_later_changes() {
        let (remote, _store, cache) = setup();
        let cache = Arc::new(cache);
        remote.hold_inserts(true);

        let saver = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.save("p1", "em voo", &author("s1")).await })
        };
        remote.parked.notified().await;

        let pending = cache.cached("p1").unwrap()[0].clone();
        assert!(pending.is_local);
        // save still owns this comment
        assert_eq!(cache.sync().await.unwrap(), SyncReport::default());
        assert!(matches!(cache.delete("p1", &pending.id).await, Err(PortalError::Conflict(_))));
        cache.like("p1", &pending.id, "s9").await.unwrap();
        cache.flag("p1", &pending.id, true).await.unwrap();

        remote.hold_inserts(false);
        remote.release.notify_one();
        let synced = match saver.await.unwrap().unwrap() {
            SaveOutcome::Synced(c) => c,
            other => panic!("unexpected {:?}", other),
        };

        assert_eq!(remote.insert_count(), 1);
        assert_eq!(synced.likes, 1);
        assert!(synced.flagged);
        let cached = cache.cached("p1").unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, synced.id);

        let row = remote.list("p1").await.unwrap()[0].clone();
        assert_eq!(row.likes, 1);
        assert!(row.flagged);
        assert!(!cache.like("p1", &synced.id, "s9").await.unwrap().liked);
    }
}
