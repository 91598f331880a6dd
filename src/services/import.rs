use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::models::{CellValue, Row, RowId, Scorecard};
use crate::utils::text::normalize_display_name;

/// A parsed spreadsheet: one header row plus data rows of cell text.
#[derive(Debug, Clone)]
pub struct ImportSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ImportError {
    #[error("Duplicate columns in import: {0:?}")]
    DuplicateHeaders(Vec<String>),

    #[error("Import columns do not match (missing: {missing:?}, unexpected: {unexpected:?})")]
    HeaderMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

/// Replace a scorecard's rows with imported data.
///
/// Headers are matched to columns by normalized display name, so
/// "Retail Price", "retail_price" and "retailprice" all hit the same
/// column. The header set must match the scorecard's columns exactly;
/// any mismatch rejects the whole import and the scorecard is untouched.
/// Imported rows are renumbered 1..n.
pub fn apply_import(
    card: &mut Scorecard,
    sheet: &ImportSheet,
    now: DateTime<Utc>,
) -> Result<usize, ImportError> {
    let normalized: Vec<String> = sheet
        .headers
        .iter()
        .map(|h| normalize_display_name(h))
        .collect();

    let mut duplicates = Vec::new();
    for (i, n) in normalized.iter().enumerate() {
        if normalized[..i].contains(n) && !duplicates.contains(&sheet.headers[i]) {
            duplicates.push(sheet.headers[i].clone());
        }
    }
    if !duplicates.is_empty() {
        return Err(ImportError::DuplicateHeaders(duplicates));
    }

    // Position of each scorecard column in the sheet, in column order.
    let mut positions = Vec::with_capacity(card.columns.len());
    let mut missing = Vec::new();
    for col in &card.columns {
        let want = normalize_display_name(&col.name);
        match normalized.iter().position(|n| *n == want) {
            Some(pos) => positions.push((col.key.clone(), pos)),
            None => missing.push(col.name.clone()),
        }
    }

    let matched: Vec<usize> = positions.iter().map(|(_, pos)| *pos).collect();
    let unexpected: Vec<String> = sheet
        .headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !matched.contains(i))
        .map(|(_, h)| h.clone())
        .collect();

    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(ImportError::HeaderMismatch { missing, unexpected });
    }

    let rows: Vec<Row> = sheet
        .rows
        .iter()
        .enumerate()
        .map(|(i, cells)| {
            let mut row = Row::new(RowId::Int(i as i64 + 1));
            for (key, pos) in &positions {
                let text = cells.get(*pos).map(String::as_str).unwrap_or("");
                row.set(key, cell_value(key, text));
            }
            row
        })
        .collect();

    let count = rows.len();
    card.rows = rows;
    card.touch(now);
    info!("Imported {} rows into scorecard {}", count, card.id);
    Ok(count)
}

/// Numeric columns keep numbers as numbers; everything else stays text.
fn cell_value(key: &str, text: &str) -> CellValue {
    let text = text.trim();
    if text.is_empty() {
        return CellValue::empty();
    }
    if matches!(key, "retail_price" | "store_count") {
        if let Ok(n) = text.trim_start_matches('$').replace(',', "").parse::<f64>() {
            return CellValue::Number(n);
        }
    }
    CellValue::Text(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2025-03-01T12:00:00Z".parse().unwrap()
    }

    fn default_headers() -> Vec<String> {
        Scorecard::new_local("x", now())
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    fn blank_row() -> Vec<String> {
        vec![String::new(); default_headers().len()]
    }

    #[test]
    fn test_import_replaces_and_renumbers_rows() {
        let mut card = Scorecard::new_local("Grocery", now());
        let mut row1 = blank_row();
        row1[0] = "Sparkling Water".into();
        row1[2] = "$4.99".into();
        let mut row2 = blank_row();
        row2[0] = "Granola".into();

        let sheet = ImportSheet {
            headers: default_headers(),
            rows: vec![row1, row2],
        };
        let count = apply_import(&mut card, &sheet, now()).unwrap();

        assert_eq!(count, 2);
        assert_eq!(card.rows.len(), 2);
        assert_eq!(card.rows[0].id, RowId::Int(1));
        assert_eq!(card.rows[1].id, RowId::Int(2));
        assert_eq!(
            card.rows[0].get("name"),
            Some(&CellValue::Text("Sparkling Water".into()))
        );
        assert_eq!(
            card.rows[0].get("retail_price"),
            Some(&CellValue::Number(4.99))
        );
        assert!(card.rows_cover_columns());
    }

    #[test]
    fn test_header_matching_ignores_case_and_underscores() {
        let mut card = Scorecard::new_local("Grocery", now());
        let headers: Vec<String> = default_headers()
            .iter()
            .map(|h| h.to_uppercase().replace(' ', "_"))
            .collect();
        let sheet = ImportSheet {
            headers,
            rows: vec![blank_row()],
        };
        assert_eq!(apply_import(&mut card, &sheet, now()), Ok(1));
    }

    #[test]
    fn test_duplicate_headers_rejected_first() {
        let mut card = Scorecard::new_local("Grocery", now());
        let mut headers = default_headers();
        headers.push("NAME".into());
        let sheet = ImportSheet {
            headers,
            rows: vec![],
        };
        assert_eq!(
            apply_import(&mut card, &sheet, now()),
            Err(ImportError::DuplicateHeaders(vec!["NAME".into()]))
        );
    }

    #[test]
    fn test_mismatch_reports_missing_and_unexpected() {
        let mut card = Scorecard::new_local("Grocery", now());
        let before = card.rows.clone();

        let mut headers = default_headers();
        headers.remove(0); // drop Retailer Name
        headers.push("Margin".into());
        let sheet = ImportSheet {
            headers,
            rows: vec![],
        };

        let err = apply_import(&mut card, &sheet, now()).unwrap_err();
        assert_eq!(
            err,
            ImportError::HeaderMismatch {
                missing: vec!["Retailer Name".into()],
                unexpected: vec!["Margin".into()],
            }
        );
        // All-or-nothing: the scorecard is untouched.
        assert_eq!(card.rows, before);
    }

    #[test]
    fn test_short_rows_pad_with_empty_cells() {
        let mut card = Scorecard::new_local("Grocery", now());
        let sheet = ImportSheet {
            headers: default_headers(),
            rows: vec![vec!["Trail Mix".into()]],
        };
        apply_import(&mut card, &sheet, now()).unwrap();
        assert!(card.rows_cover_columns());
        assert_eq!(
            card.rows[0].get("buyer"),
            Some(&CellValue::Text(String::new()))
        );
    }
}
