use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::Database;
use crate::models::{Comment, RowId, Scorecard, ScorecardPayload, Template};
use crate::utils::AppError;

/// Failures surfaced by a scorecard store.
///
/// `Network` is the transport being unreachable; the auto-save engine maps it
/// to the offline status instead of the error status. `Auth` means the caller
/// must re-authenticate before retrying.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Network unavailable: {0}")]
    Network(String),

    #[error("Authentication required: {0}")]
    Auth(String),

    #[error("Store error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Validation(msg) => AppError::Validation(msg),
            StoreError::Network(msg) => AppError::Network(msg),
            StoreError::Auth(msg) => AppError::Auth(msg),
            StoreError::Database(msg) => AppError::Other(msg),
        }
    }
}

/// Acknowledgement of a successful save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveAck {
    pub id: String,
    pub last_modified: DateTime<Utc>,
}

/// The persistence boundary for scorecards, comments, and templates.
///
/// Everything above this trait works with string identifiers so that
/// local-only scorecards (not yet in any store) and persisted ones flow
/// through the same code paths.
pub trait ScorecardStore {
    fn create_scorecard(
        &self,
        title: &str,
        payload: &ScorecardPayload,
        is_draft: bool,
        now: DateTime<Utc>,
    ) -> Result<Scorecard, StoreError>;

    fn update_scorecard(
        &self,
        id: &str,
        title: &str,
        payload: &ScorecardPayload,
        is_draft: bool,
        now: DateTime<Utc>,
    ) -> Result<SaveAck, StoreError>;

    fn delete_scorecard(&self, id: &str) -> Result<(), StoreError>;

    fn list_scorecards(&self) -> Result<Vec<Scorecard>, StoreError>;

    fn create_comment(
        &self,
        scorecard_id: &str,
        row_id: &RowId,
        author: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment, StoreError>;

    fn list_comments(&self, scorecard_id: &str) -> Result<Vec<Comment>, StoreError>;

    fn update_comment(&self, id: i64, text: &str, now: DateTime<Utc>) -> Result<(), StoreError>;

    fn delete_comment(&self, id: i64) -> Result<(), StoreError>;

    fn save_template(&self, template: &Template, now: DateTime<Utc>) -> Result<Template, StoreError>;

    fn list_templates(&self) -> Result<Vec<Template>, StoreError>;

    fn delete_template(&self, id: i64) -> Result<(), StoreError>;
}

/// Store backed by the embedded SQLite database.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn parse_id(id: &str) -> Result<i64, StoreError> {
        id.parse()
            .map_err(|_| StoreError::NotFound(format!("Unknown scorecard id {:?}", id)))
    }
}

fn db_err(e: anyhow::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl ScorecardStore for SqliteStore {
    fn create_scorecard(
        &self,
        title: &str,
        payload: &ScorecardPayload,
        is_draft: bool,
        now: DateTime<Utc>,
    ) -> Result<Scorecard, StoreError> {
        if title.trim().is_empty() {
            return Err(StoreError::Validation("Title cannot be empty".into()));
        }
        self.db
            .scorecards()
            .create(title, payload, is_draft, now)
            .map_err(db_err)
    }

    fn update_scorecard(
        &self,
        id: &str,
        title: &str,
        payload: &ScorecardPayload,
        is_draft: bool,
        now: DateTime<Utc>,
    ) -> Result<SaveAck, StoreError> {
        let numeric = Self::parse_id(id)?;
        let updated = self
            .db
            .scorecards()
            .update(numeric, title, payload, is_draft, now)
            .map_err(db_err)?;

        if !updated {
            return Err(StoreError::NotFound(format!("Scorecard {} is gone", id)));
        }

        Ok(SaveAck {
            id: id.to_string(),
            last_modified: now,
        })
    }

    fn delete_scorecard(&self, id: &str) -> Result<(), StoreError> {
        let numeric = Self::parse_id(id)?;
        let deleted = self.db.scorecards().delete(numeric).map_err(db_err)?;
        if !deleted {
            return Err(StoreError::NotFound(format!("Scorecard {} is gone", id)));
        }
        Ok(())
    }

    fn list_scorecards(&self) -> Result<Vec<Scorecard>, StoreError> {
        self.db.scorecards().find_all().map_err(db_err)
    }

    fn create_comment(
        &self,
        scorecard_id: &str,
        row_id: &RowId,
        author: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment, StoreError> {
        Comment::validate_text(text)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let numeric = Self::parse_id(scorecard_id)?;
        self.db
            .comments()
            .create(numeric, row_id, author, text, now)
            .map_err(db_err)
    }

    fn list_comments(&self, scorecard_id: &str) -> Result<Vec<Comment>, StoreError> {
        let numeric = Self::parse_id(scorecard_id)?;
        self.db.comments().find_by_scorecard(numeric).map_err(db_err)
    }

    fn update_comment(&self, id: i64, text: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        Comment::validate_text(text)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let updated = self
            .db
            .comments()
            .update_text(id, text, now)
            .map_err(db_err)?;
        if !updated {
            return Err(StoreError::NotFound(format!("Comment {} is gone", id)));
        }
        Ok(())
    }

    fn delete_comment(&self, id: i64) -> Result<(), StoreError> {
        let deleted = self.db.comments().delete(id).map_err(db_err)?;
        if !deleted {
            return Err(StoreError::NotFound(format!("Comment {} is gone", id)));
        }
        Ok(())
    }

    fn save_template(&self, template: &Template, now: DateTime<Utc>) -> Result<Template, StoreError> {
        template
            .validate()
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        self.db.templates().save(template, now).map_err(db_err)
    }

    fn list_templates(&self) -> Result<Vec<Template>, StoreError> {
        self.db.templates().find_all().map_err(db_err)
    }

    fn delete_template(&self, id: i64) -> Result<(), StoreError> {
        let deleted = self.db.templates().delete(id).map_err(db_err)?;
        if !deleted {
            return Err(StoreError::NotFound(format!("Template {} is gone", id)));
        }
        Ok(())
    }
}
