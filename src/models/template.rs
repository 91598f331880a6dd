use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Column, Row, Scorecard};

/// A reusable snapshot of a scorecard's column structure (and optionally its
/// rows), used to re-seed scorecards later. Templates have their own
/// lifecycle: created explicitly, deleted explicitly, names unique per owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: Option<i64>,
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Option<Vec<Row>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Template {
    /// Snapshot a scorecard's structure. `include_rows` also captures data.
    pub fn from_scorecard(name: &str, card: &Scorecard, include_rows: bool) -> Self {
        Self {
            id: None,
            name: name.trim().to_string(),
            columns: card.columns.clone(),
            rows: include_rows.then(|| card.rows.clone()),
            created_at: None,
        }
    }

    pub fn validate(&self) -> Result<(), TemplateValidationError> {
        if self.name.is_empty() {
            return Err(TemplateValidationError::EmptyName);
        }
        if self.columns.is_empty() {
            return Err(TemplateValidationError::NoColumns);
        }
        Ok(())
    }

    /// Apply this template to a scorecard: replace its column structure and,
    /// when the template carries rows, its data. Rows that survive are
    /// rewritten so every row covers every template column key.
    pub fn apply_to(&self, card: &mut Scorecard, now: DateTime<Utc>) {
        card.columns = self.columns.clone();
        match &self.rows {
            Some(rows) => card.rows = rows.clone(),
            None => {
                for row in &mut card.rows {
                    row.cells.retain(|key, _| {
                        self.columns.iter().any(|c| &c.key == key)
                    });
                    for col in &self.columns {
                        row.cells
                            .entry(col.key.clone())
                            .or_insert_with(super::CellValue::empty);
                    }
                }
            }
        }
        card.touch(now);
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TemplateValidationError {
    #[error("Template name cannot be empty")]
    EmptyName,
    #[error("Template must have at least one column")]
    NoColumns,
}
