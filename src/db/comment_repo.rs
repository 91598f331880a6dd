use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row as SqlRow};
use std::sync::{Arc, Mutex};

use crate::models::{Comment, RowId};

pub struct CommentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CommentRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Create a comment on a row of a persisted scorecard.
    ///
    /// The foreign key rejects scorecard ids that are not in the store,
    /// which is why callers migrate local-only scorecards first.
    pub fn create(
        &self,
        scorecard_id: i64,
        row_id: &RowId,
        author: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Comment> {
        let conn = self.conn.lock().unwrap();
        let ts = now.to_rfc3339();

        conn.execute(
            "INSERT INTO comments (scorecard_id, row_id, author, text, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![scorecard_id, row_id.to_string(), author, text, ts, ts],
        )?;

        let id = conn.last_insert_rowid();
        tracing::debug!("Created comment {} on scorecard {}", id, scorecard_id);

        Ok(Comment {
            id,
            scorecard_id: scorecard_id.to_string(),
            row_id: row_id.clone(),
            author: author.to_string(),
            text: text.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch all comments for a scorecard, oldest first.
    pub fn find_by_scorecard(&self, scorecard_id: i64) -> Result<Vec<Comment>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, scorecard_id, row_id, author, text, created_at, updated_at
             FROM comments
             WHERE scorecard_id = ?
             ORDER BY created_at ASC, id ASC",
        )?;

        let comments = stmt
            .query_map([scorecard_id], |row| Ok(Self::row_to_comment(row)))?
            .filter_map(|r| r.ok())
            .collect::<Result<Vec<_>>>()?;

        Ok(comments)
    }

    /// Replace a comment's text. Returns false when the id is unknown.
    pub fn update_text(&self, id: i64, text: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "UPDATE comments SET text = ?, updated_at = ? WHERE id = ?",
            params![text, now.to_rfc3339(), id],
        )?;
        Ok(affected > 0)
    }

    /// Delete a comment. Returns false when the id is unknown.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM comments WHERE id = ?", [id])?;
        Ok(affected > 0)
    }

    fn row_to_comment(row: &SqlRow) -> Result<Comment> {
        let id: i64 = row.get(0)?;
        let scorecard_id: i64 = row.get(1)?;
        let row_id: String = row.get(2)?;
        let author: String = row.get(3)?;
        let text: String = row.get(4)?;
        let created_at: String = row.get(5)?;
        let updated_at: String = row.get(6)?;

        Ok(Comment {
            id,
            scorecard_id: scorecard_id.to_string(),
            row_id: parse_row_id(&row_id),
            author,
            text,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

fn parse_row_id(s: &str) -> RowId {
    match s.parse::<i64>() {
        Ok(n) => RowId::Int(n),
        Err(_) => RowId::Text(s.to_string()),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("Invalid timestamp {:?}: {}", s, e))
}
