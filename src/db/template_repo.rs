use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row as SqlRow};
use std::sync::{Arc, Mutex};

use crate::models::Template;

pub struct TemplateRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TemplateRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Save a template. Names are unique, so saving under an existing name
    /// replaces that template's content.
    pub fn save(&self, template: &Template, now: DateTime<Utc>) -> Result<Template> {
        let conn = self.conn.lock().unwrap();
        let columns = serde_json::to_string(&template.columns)?;
        let rows = template
            .rows
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            "INSERT INTO templates (name, columns, rows, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET columns = excluded.columns, rows = excluded.rows",
            params![template.name, columns, rows, now.to_rfc3339()],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM templates WHERE name = ?",
            [&template.name],
            |row| row.get(0),
        )?;

        tracing::info!("Saved template {} ({})", id, template.name);

        Ok(Template {
            id: Some(id),
            created_at: Some(now),
            ..template.clone()
        })
    }

    /// Fetch all templates, alphabetical by name.
    pub fn find_all(&self) -> Result<Vec<Template>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, columns, rows, created_at
             FROM templates
             ORDER BY name ASC",
        )?;

        let templates = stmt
            .query_map([], |row| Ok(Self::row_to_template(row)))?
            .filter_map(|r| r.ok())
            .collect::<Result<Vec<_>>>()?;

        Ok(templates)
    }

    /// Fetch a template by name.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Template>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, columns, rows, created_at
             FROM templates
             WHERE name = ?",
        )?;

        match stmt.query_row([name], |row| Ok(Self::row_to_template(row))) {
            Ok(t) => Ok(Some(t?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a template. Returns false when the id is unknown.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM templates WHERE id = ?", [id])?;
        Ok(affected > 0)
    }

    fn row_to_template(row: &SqlRow) -> Result<Template> {
        let id: i64 = row.get(0)?;
        let name: String = row.get(1)?;
        let columns: String = row.get(2)?;
        let rows: Option<String> = row.get(3)?;
        let created_at: String = row.get(4)?;

        Ok(Template {
            id: Some(id),
            name,
            columns: serde_json::from_str(&columns)?,
            rows: rows.as_deref().map(serde_json::from_str).transpose()?,
            created_at: Some(parse_timestamp(&created_at)?),
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("Invalid timestamp {:?}: {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::Scorecard;

    fn now() -> DateTime<Utc> {
        "2025-03-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_save_and_find() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.templates();

        let card = Scorecard::new_local("Grocery", now());
        let t = Template::from_scorecard("grocery", &card, false);
        let saved = repo.save(&t, now()).unwrap();
        assert!(saved.id.is_some());

        let found = repo.find_by_name("grocery").unwrap().unwrap();
        assert_eq!(found.columns, card.columns);
        assert!(found.rows.is_none());
        assert!(repo.find_by_name("missing").unwrap().is_none());
    }

    #[test]
    fn test_save_same_name_replaces() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.templates();

        let card = Scorecard::new_local("Grocery", now());
        let first = repo
            .save(&Template::from_scorecard("grocery", &card, false), now())
            .unwrap();
        let second = repo
            .save(&Template::from_scorecard("grocery", &card, true), now())
            .unwrap();

        assert_eq!(first.id, second.id);
        let found = repo.find_by_name("grocery").unwrap().unwrap();
        assert!(found.rows.is_some());
        assert_eq!(repo.find_all().unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.templates();
        let card = Scorecard::new_local("Grocery", now());
        let saved = repo
            .save(&Template::from_scorecard("grocery", &card, false), now())
            .unwrap();

        assert!(repo.delete(saved.id.unwrap()).unwrap());
        assert!(!repo.delete(saved.id.unwrap()).unwrap());
        assert!(repo.find_all().unwrap().is_empty());
    }
}
