//! Port to the document database for comments.
//!
//! `CommentCache` only talks to this trait, so it can run against MongoDB in
//! production and an in-memory fake in tests.

use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};

use crate::error::Result;
use crate::models::Comment;

pub const DEFAULT_CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECTIVITY_POLL: Duration = Duration::from_millis(500);

#[async_trait]
pub trait CommentRemote: Send + Sync {
    /// Comments for one suggestion, newest first.
    async fn list(&self, prompt_id: &str) -> Result<Vec<Comment>>;
    /// Stores the comment and returns the id the database assigned.
    /// `comment.id` and `comment.is_local` are ignored.
    async fn insert(&self, comment: &Comment) -> Result<String>;
    async fn delete(&self, comment_id: &str) -> Result<()>;
    async fn increment_likes(&self, comment_id: &str) -> Result<()>;
    async fn set_flagged(&self, comment_id: &str, flagged: bool) -> Result<()>;
    /// Deletes every comment of a suggestion, returning how many went.
    async fn delete_for_prompt(&self, prompt_id: &str) -> Result<u64>;
    /// Cheap round trip used to detect connectivity.
    async fn ping(&self) -> Result<()>;
}

/// Polls `ping` until it succeeds or `timeout` elapses.
pub async fn wait_for_connectivity(remote: &dyn CommentRemote, timeout: Duration) -> bool {
    let attempt = async {
        loop {
            match remote.ping().await {
                Ok(()) => return,
                Err(e) => {
                    warn!("remote store unreachable, retrying: {}", e);
                    tokio::time::sleep(CONNECTIVITY_POLL).await;
                }
            }
        }
    };
    match tokio::time::timeout(timeout, attempt).await {
        Ok(()) => {
            info!("remote store reachable");
            true
        }
        Err(_) => false,
    }
}
