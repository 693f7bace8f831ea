//! CSV and JSON exports of suggestions and comments.
//!
//! CSV output quotes every field, doubles embedded quotes, ends each line
//! with CRLF and is plain UTF-8. JSON output is pretty printed and carries a
//! `version` field so the comment import can check what it is reading.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PortalError, Result};
use crate::models::{Comment, Record, Suggestion};

pub const EXPORT_VERSION: &str = "1.0";
const CRLF: &str = "\r\n";

/// Spreadsheet apps evaluate cells starting with these characters.
fn neutralize_formula(value: &str) -> String {
    match value.trim_start().chars().next() {
        Some('=') | Some('+') | Some('-') | Some('@') => format!("'{}", value),
        _ => value.to_string(),
    }
}

pub fn csv_field(value: &str) -> String {
    format!("\"{}\"", neutralize_formula(value).replace('"', "\"\""))
}

pub fn to_csv<I, R>(header: &[&str], rows: I) -> String
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let mut out = header.iter().map(|h| csv_field(h)).collect::<Vec<_>>().join(",");
    out.push_str(CRLF);
    for row in rows {
        out.push_str(
            &row.into_iter()
                .map(|cell| csv_field(&cell))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push_str(CRLF);
    }
    out
}

fn opt_time(t: &Option<DateTime<Utc>>) -> String {
    t.map(|t| t.to_rfc3339()).unwrap_or_default()
}

pub fn suggestions_csv(items: &[Record<Suggestion>]) -> String {
    let header = [
        "id", "title", "text", "category", "comment", "authorName", "authorEmail", "status",
        "createdAt", "approvedAt", "rejectedAt", "likes", "views",
    ];
    to_csv(
        &header,
        items.iter().map(|r| {
            let s = &r.data;
            vec![
                r.id.clone(),
                s.title.clone(),
                s.text.clone(),
                s.category.to_string(),
                s.comment.clone().unwrap_or_default(),
                s.author_name.clone().unwrap_or_default(),
                s.author_email.clone().unwrap_or_default(),
                s.status.to_string(),
                s.created_at.to_rfc3339(),
                opt_time(&s.approved_at),
                opt_time(&s.rejected_at),
                s.likes.to_string(),
                s.views.to_string(),
            ]
        }),
    )
}

pub fn comments_csv(comments: &BTreeMap<String, Vec<Comment>>) -> String {
    let header = [
        "id", "promptId", "authorName", "authorEmail", "text", "likes", "flagged", "status",
        "isLocal", "createdAt",
    ];
    to_csv(
        &header,
        comments.values().flatten().map(|c| {
            vec![
                c.id.clone(),
                c.prompt_id.clone(),
                c.author_name.clone(),
                c.author_email.clone().unwrap_or_default(),
                c.text.clone(),
                c.likes.to_string(),
                c.flagged.to_string(),
                c.status.to_string(),
                c.is_local.to_string(),
                c.created_at.to_rfc3339(),
            ]
        }),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionExport<'a> {
    pub version: &'static str,
    pub exported_at: DateTime<Utc>,
    pub total: usize,
    pub suggestions: &'a [Record<Suggestion>],
}

pub fn suggestions_json(items: &[Record<Suggestion>], now: DateTime<Utc>) -> Result<String> {
    let export = SuggestionExport {
        version: EXPORT_VERSION,
        exported_at: now,
        total: items.len(),
        suggestions: items,
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

/// Shape written by the comment export and the only shape the import accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentExport {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub total: usize,
    pub comments: BTreeMap<String, Vec<Comment>>,
}

impl CommentExport {
    pub fn new(comments: BTreeMap<String, Vec<Comment>>, now: DateTime<Utc>) -> Self {
        Self {
            version: EXPORT_VERSION.to_string(),
            exported_at: now,
            total: comments.values().map(Vec::len).sum(),
            comments,
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let export: CommentExport = serde_json::from_str(raw)
            .map_err(|e| PortalError::Validation(format!("not a comment export: {}", e)))?;
        if export.version.split('.').next() != EXPORT_VERSION.split('.').next() {
            return Err(PortalError::Validation(format!(
                "unsupported export version {}",
                export.version
            )));
        }
        Ok(export)
    }
}
