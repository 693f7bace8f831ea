use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Status;

/// Site feedback stored in `feedback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub text: String,
    /// 0 to 10
    pub rating: i32,
    pub status: Status,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeedbackRequest {
    pub text: String,
    pub rating: i32,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFeedbackStatusRequest {
    pub status: String,
}

impl Feedback {
    /// Every submission starts out pending, whichever page sent it.
    pub fn new(req: &CreateFeedbackRequest, now: DateTime<Utc>) -> Self {
        Self {
            text: req.text.trim().to_string(),
            rating: req.rating,
            status: Status::Pending,
            author_name: req.author_name.clone(),
            author_email: req.author_email.clone(),
            created_at: now,
            updated_at: None,
        }
    }
}
