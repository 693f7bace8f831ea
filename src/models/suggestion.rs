use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, Status};

/// A prompt suggestion stored in `sugestoes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub title: String,
    /// The prompt body itself.
    pub text: String,
    pub category: Category,
    pub comment: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub views: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSuggestionRequest {
    pub title: String,
    pub text: String,
    pub category: String,
    pub comment: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

impl Suggestion {
    pub fn new(req: &CreateSuggestionRequest, category: Category, now: DateTime<Utc>) -> Self {
        Self {
            title: req.title.trim().to_string(),
            text: req.text.trim().to_string(),
            category,
            comment: req
                .comment
                .as_ref()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            author_name: req.author_name.clone(),
            author_email: req.author_email.clone(),
            status: Status::Pending,
            created_at: now,
            approved_at: None,
            rejected_at: None,
            likes: 0,
            views: 0,
        }
    }
}
