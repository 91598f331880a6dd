use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row as SqlRow};
use std::sync::{Arc, Mutex};

use crate::models::{Scorecard, ScorecardPayload};

pub struct ScorecardRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScorecardRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Create a scorecard and return it with its store-assigned id.
    pub fn create(
        &self,
        title: &str,
        payload: &ScorecardPayload,
        is_draft: bool,
        now: DateTime<Utc>,
    ) -> Result<Scorecard> {
        let conn = self.conn.lock().unwrap();
        let data = serde_json::to_string(payload)?;
        let ts = now.to_rfc3339();

        conn.execute(
            "INSERT INTO scorecards (title, data, is_draft, created_at, last_modified)
             VALUES (?, ?, ?, ?, ?)",
            params![title, data, is_draft as i64, ts, ts],
        )?;

        let id = conn.last_insert_rowid();
        tracing::info!("Created scorecard {} ({})", id, title);

        Ok(Scorecard {
            id: id.to_string(),
            title: title.to_string(),
            columns: payload.columns.clone(),
            rows: payload.rows.clone(),
            created_at: now,
            last_modified: now,
            is_draft,
        })
    }

    /// Fetch all scorecards, newest first.
    pub fn find_all(&self) -> Result<Vec<Scorecard>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, data, is_draft, created_at, last_modified
             FROM scorecards
             ORDER BY created_at DESC",
        )?;

        let cards = stmt
            .query_map([], |row| Ok(Self::row_to_scorecard(row)))?
            .filter_map(|r| r.ok())
            .collect::<Result<Vec<_>>>()?;

        Ok(cards)
    }

    /// Fetch a scorecard by id.
    pub fn find_by_id(&self, id: i64) -> Result<Option<Scorecard>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, data, is_draft, created_at, last_modified
             FROM scorecards
             WHERE id = ?",
        )?;

        match stmt.query_row([id], |row| Ok(Self::row_to_scorecard(row))) {
            Ok(card) => Ok(Some(card?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Update title and payload. Returns false when the id is unknown.
    pub fn update(
        &self,
        id: i64,
        title: &str,
        payload: &ScorecardPayload,
        is_draft: bool,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let data = serde_json::to_string(payload)?;

        let affected = conn.execute(
            "UPDATE scorecards SET title = ?, data = ?, is_draft = ?, last_modified = ?
             WHERE id = ?",
            params![title, data, is_draft as i64, now.to_rfc3339(), id],
        )?;

        Ok(affected > 0)
    }

    /// Delete a scorecard (comments cascade). Returns false when unknown.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM scorecards WHERE id = ?", [id])?;
        if affected > 0 {
            tracing::info!("Deleted scorecard {}", id);
        }
        Ok(affected > 0)
    }

    fn row_to_scorecard(row: &SqlRow) -> Result<Scorecard> {
        let id: i64 = row.get(0)?;
        let title: String = row.get(1)?;
        let data: String = row.get(2)?;
        let is_draft: i64 = row.get(3)?;
        let created_at: String = row.get(4)?;
        let last_modified: String = row.get(5)?;

        let payload: ScorecardPayload = serde_json::from_str(&data)?;

        Ok(Scorecard {
            id: id.to_string(),
            title,
            columns: payload.columns,
            rows: payload.rows,
            created_at: parse_timestamp(&created_at)?,
            last_modified: parse_timestamp(&last_modified)?,
            is_draft: is_draft != 0,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("Invalid timestamp {:?}: {}", s, e))
}
