pub mod comment;
pub mod feedback;
pub mod profile;
pub mod suggestion;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PortalError, Result};

pub use comment::{Comment, CommentAuthor};
pub use feedback::Feedback;
pub use profile::{Profile, Role};
pub use suggestion::Suggestion;

/// Moderation status shared by suggestions, feedback and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Approved,
    Rejected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Approved => "approved",
            Status::Rejected => "rejected",
        }
    }

    /// Validates an admin moderation step.
    ///
    /// Only `pending -> approved|rejected` and the explicit swap between
    /// `approved` and `rejected` are allowed. Nothing goes back to `pending`.
    pub fn transition(self, to: Status) -> Result<Status> {
        match (self, to) {
            (_, Status::Pending) => Err(PortalError::Conflict(format!(
                "cannot move a {} record back to pending",
                self
            ))),
            (from, to) if from == to => {
                Err(PortalError::Conflict(format!("record is already {}", to)))
            }
            (_, to) => Ok(to),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "approved" => Ok(Status::Approved),
            "rejected" => Ok(Status::Rejected),
            other => Err(PortalError::Validation(format!("unknown status: {}", other))),
        }
    }
}

/// Suggestion categories, stored with their Portuguese labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Jurídico")]
    Juridico,
    #[serde(rename = "Administrativo")]
    Administrativo,
    #[serde(rename = "Pesquisa")]
    Pesquisa,
    #[serde(rename = "Redação")]
    Redacao,
    #[serde(rename = "Análise de Documentos")]
    AnaliseDocumentos,
    #[serde(rename = "Pareceres")]
    Pareceres,
    #[serde(rename = "Petições")]
    Peticoes,
    #[serde(rename = "Outros")]
    Outros,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Juridico,
        Category::Administrativo,
        Category::Pesquisa,
        Category::Redacao,
        Category::AnaliseDocumentos,
        Category::Pareceres,
        Category::Peticoes,
        Category::Outros,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Juridico => "Jurídico",
            Category::Administrativo => "Administrativo",
            Category::Pesquisa => "Pesquisa",
            Category::Redacao => "Redação",
            Category::AnaliseDocumentos => "Análise de Documentos",
            Category::Pareceres => "Pareceres",
            Category::Peticoes => "Petições",
            Category::Outros => "Outros",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.label().eq_ignore_ascii_case(wanted) || c.label() == wanted)
            .ok_or_else(|| PortalError::Validation(format!("unknown category: {}", wanted)))
    }
}

/// A stored record as returned over HTTP: the database id next to its fields.
#[derive(Debug, Clone, Serialize)]
pub struct Record<T> {
    pub id: String,
    #[serde(flatten)]
    pub data: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_moves_to_either_decision() {
        assert_eq!(Status::Pending.transition(Status::Approved).unwrap(), Status::Approved);
        assert_eq!(Status::Pending.transition(Status::Rejected).unwrap(), Status::Rejected);
    }

    #[test]
    fn decided_records_never_return_to_pending() {
        for from in [Status::Approved, Status::Rejected] {
            assert!(matches!(from.transition(Status::Pending), Err(PortalError::Conflict(_))));
        }
        assert!(Status::Pending.transition(Status::Pending).is_err());
    }

    #[test]
    fn admin_can_swap_a_decision() {
        assert_eq!(Status::Approved.transition(Status::Rejected).unwrap(), Status::Rejected);
        assert!(Status::Approved.transition(Status::Approved).is_err());
    }

    #[test]
    fn categories_serialize_with_portuguese_labels() {
        let json = serde_json::to_string(&Category::AnaliseDocumentos).unwrap();
        assert_eq!(json, "\"Análise de Documentos\"");
        let parsed: Category = serde_json::from_str("\"Petições\"").unwrap();
        assert_eq!(parsed, Category::Peticoes);
        assert_eq!("Juridico".parse::<Category>().ok(), None);
        assert_eq!("Redação".parse::<Category>().unwrap(), Category::Redacao);
        assert_eq!("administrativo".parse::<Category>().unwrap(), Category::Administrativo);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Approved".parse::<Status>().unwrap(), Status::Approved);
        assert!("archived".parse::<Status>().is_err());
    }
}
