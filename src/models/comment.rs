use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RowId;

/// A per-row comment, persisted server-side and keyed by
/// `(scorecard_id, row_id)`. Comments live outside the scorecard payload:
/// they require a remote foreign key, which is what forces a local-only
/// scorecard to migrate before its first comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub scorecard_id: String,
    pub row_id: RowId,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn validate_text(text: &str) -> Result<(), CommentValidationError> {
        if text.trim().is_empty() {
            return Err(CommentValidationError::EmptyText);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommentValidationError {
    #[error("Comment text cannot be empty")]
    EmptyText,
}
