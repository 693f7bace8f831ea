use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Status;

/// Prefix carried by ids of comments that have not reached the database yet.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Who wrote a comment, as known at submission time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAuthor {
    pub name: String,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub session_id: String,
    /// Verified identity-provider uid; `None` for anonymous visitors.
    pub uid: Option<String>,
    pub is_institutional: bool,
}

/// A comment on a suggestion, as cached locally and stored in `prompt_comments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    /// Parent suggestion id.
    pub prompt_id: String,
    pub text: String,
    pub author_name: String,
    pub author_email: Option<String>,
    pub author_photo: Option<String>,
    pub session_id: String,
    /// Uid of a signed-in author. Only that user may delete the comment
    /// without admin rights.
    #[serde(default)]
    pub author_uid: Option<String>,
    #[serde(default)]
    pub is_institutional: bool,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub flagged: bool,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_local: bool,
}

impl Comment {
    /// Builds an optimistic entry with a synthetic, time-based id.
    pub fn local(prompt_id: &str, text: &str, author: &CommentAuthor, now: DateTime<Utc>) -> Self {
        Self {
            id: synthetic_id(now),
            prompt_id: prompt_id.to_string(),
            text: text.trim().to_string(),
            author_name: author.name.clone(),
            author_email: author.email.clone(),
            author_photo: author.photo_url.clone(),
            session_id: author.session_id.clone(),
            author_uid: author.uid.clone(),
            is_institutional: author.is_institutional,
            likes: 0,
            flagged: false,
            status: Status::Approved,
            created_at: now,
            is_local: true,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        is_synthetic_id(&self.id)
    }

    /// True only for a signed-in author; anonymous comments have no owner.
    pub fn is_authored_by(&self, uid: &str) -> bool {
        self.author_uid.as_deref() == Some(uid)
    }

    pub fn view(&self) -> CommentView<'_> {
        CommentView {
            id: &self.id,
            prompt_id: &self.prompt_id,
            text: &self.text,
            author_name: &self.author_name,
            author_photo: self.author_photo.as_deref(),
            is_institutional: self.is_institutional,
            likes: self.likes,
            flagged: self.flagged,
            status: self.status,
            created_at: self.created_at,
            is_local: self.is_local,
        }
    }

    /// The same comment, now backed by a database document.
    pub fn with_remote_id(&self, remote_id: String) -> Self {
        Self {
            id: remote_id,
            is_local: false,
            ..self.clone()
        }
    }
}

/// What non-admin callers see of a comment. Session, uid and email stay
/// server side.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView<'a> {
    pub id: &'a str,
    pub prompt_id: &'a str,
    pub text: &'a str,
    pub author_name: &'a str,
    pub author_photo: Option<&'a str>,
    pub is_institutional: bool,
    pub likes: i64,
    pub flagged: bool,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub is_local: bool,
}

pub fn is_synthetic_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

fn synthetic_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}_{}", LOCAL_ID_PREFIX, now.timestamp_millis(), &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_comments_get_prefixed_ids() {
        let author = CommentAuthor {
            name: "Ana".into(),
            session_id: "s1".into(),
            ..Default::default()
        };
        let c = Comment::local("abc123", "  Muito útil, obrigado!  ", &author, Utc::now());
        assert!(c.is_synthetic());
        assert!(c.is_local);
        assert_eq!(c.text, "Muito útil, obrigado!");

        let synced = c.with_remote_id("65f0c0ffee".into());
        assert!(!synced.is_synthetic());
        assert!(!synced.is_local);
        assert_eq!(synced.text, c.text);
    }

    #[test]
    fn serializes_camel_case_flags() {
        let author = CommentAuthor { name: "Ana".into(), session_id: "s1".into(), ..Default::default() };
        let c = Comment::local("p", "oi", &author, Utc::now());
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["isLocal"], true);
        assert_eq!(json["promptId"], "p");
    }

    #[test]
    fn public_view_hides_session_and_uid() {
        let author = CommentAuthor {
            name: "Ana".into(),
            email: Some("ana@pge.sc.gov.br".into()),
            session_id: "s-secret".into(),
            uid: Some("uid-1".into()),
            ..Default::default()
        };
        let c = Comment::local("p", "oi", &author, Utc::now());
        assert!(c.is_authored_by("uid-1"));
        assert!(!c.is_authored_by("uid-2"));

        let json = serde_json::to_value(c.view()).unwrap();
        assert!(json.get("sessionId").is_none());
        assert!(json.get("authorUid").is_none());
        assert!(json.get("authorEmail").is_none());
        assert_eq!(json["authorName"], "Ana");

        let anonymous = Comment::local("p", "oi", &CommentAuthor::default(), Utc::now());
        assert!(!anonymous.is_authored_by(""));
    }
}
