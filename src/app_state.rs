use crate::auth::SessionPolicy;
use crate::comment_cache::CommentCache;
use crate::config::Config;
use crate::db::MongoDB;
use crate::likes::LikeLedger;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub mongodb: Arc<MongoDB>,
    pub config: Config,
    pub comments: Arc<CommentCache>,
    /// Guards suggestion likes, one per session.
    pub prompt_likes: Arc<LikeLedger>,
    pub policy: SessionPolicy,
}
