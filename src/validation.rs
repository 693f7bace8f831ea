use std::sync::OnceLock;

use regex::Regex;

use crate::error::{PortalError, Result};
use crate::models::suggestion::CreateSuggestionRequest;
use crate::models::feedback::CreateFeedbackRequest;
use crate::models::Category;

pub const MAX_COMMENT_CHARS: usize = 1000;
pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_SUGGESTION_CHARS: usize = 5000;
pub const MAX_FEEDBACK_CHARS: usize = 2000;
pub const MIN_RATING: i32 = 0;
pub const MAX_RATING: i32 = 10;

const BLOCKED_WORDS: [&str; 8] = [
    "spam", "idiota", "imbecil", "otário", "porra", "caralho", "merda", "viagra",
];

fn blocked_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternation = BLOCKED_WORDS
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join("|");
        // \b is Unicode-aware in the regex crate, so accented words still match whole.
        Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).expect("blocked word pattern")
    })
}

fn check_text(field: &str, text: &str, max_chars: usize) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PortalError::Validation(format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > max_chars {
        return Err(PortalError::Validation(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    if blocked_words().is_match(trimmed) {
        return Err(PortalError::Validation(format!(
            "{} contains words that are not allowed",
            field
        )));
    }
    Ok(trimmed.to_string())
}

/// Returns the trimmed comment text, or why it was rejected.
pub fn validate_comment(text: &str) -> Result<String> {
    check_text("comment", text, MAX_COMMENT_CHARS)
}

pub fn validate_suggestion(req: &CreateSuggestionRequest) -> Result<Category> {
    check_text("title", &req.title, MAX_TITLE_CHARS)?;
    check_text("text", &req.text, MAX_SUGGESTION_CHARS)?;
    if let Some(comment) = req.comment.as_deref().filter(|c| !c.trim().is_empty()) {
        check_text("comment", comment, MAX_COMMENT_CHARS)?;
    }
    req.category.parse()
}

pub fn validate_feedback(req: &CreateFeedbackRequest) -> Result<()> {
    check_text("feedback", &req.text, MAX_FEEDBACK_CHARS)?;
    if !(MIN_RATING..=MAX_RATING).contains(&req.rating) {
        return Err(PortalError::Validation(format!(
            "rating must be between {} and {}",
            MIN_RATING, MAX_RATING
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace_comments() {
        assert!(validate_comment("").is_err());
        assert!(validate_comment("   \n\t").is_err());
        assert_eq!(validate_comment("  Muito útil!  ").unwrap(), "Muito útil!");
    }

    #[test]
    fn counts_characters_not_bytes() {
        let at_limit = "ç".repeat(MAX_COMMENT_CHARS);
        assert!(validate_comment(&at_limit).is_ok());
        let over = "a".repeat(MAX_COMMENT_CHARS + 1);
        assert!(validate_comment(&over).is_err());
    }

    #[test]
    fn blocks_whole_words_only() {
        assert!(validate_comment("isso é SPAM puro").is_err());
        assert!(validate_comment("que otário").is_err());
        // substring of a longer word is fine
        assert!(validate_comment("spammer-free zone").is_ok());
    }

    #[test]
    fn feedback_rating_is_bounded() {
        let mut req = CreateFeedbackRequest {
            text: "Ótimo portal".into(),
            rating: 10,
            author_name: None,
            author_email: None,
        };
        assert!(validate_feedback(&req).is_ok());
        req.rating = 11;
        assert!(validate_feedback(&req).is_err());
        req.rating = -1;
        assert!(validate_feedback(&req).is_err());
    }

    #[test]
    fn suggestion_needs_known_category() {
        let mut req = CreateSuggestionRequest {
            title: "Resumo de parecer".into(),
            text: "Resuma o parecer a seguir em tópicos".into(),
            category: "Pareceres".into(),
            comment: None,
            author_name: None,
            author_email: None,
        };
        assert_eq!(validate_suggestion(&req).unwrap(), Category::Pareceres);
        req.category = "Finanças".into();
        assert!(validate_suggestion(&req).is_err());
    }
}
