use chrono::{DateTime, Utc};

use crate::models::{ProductStatus, Scorecard};
use crate::utils::text::normalize_display_name;

/// Authorization penetration for one retailer column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPenetration {
    pub key: String,
    pub name: String,
    pub authorized: usize,
    pub total_rows: usize,
    /// round(100 * authorized / total_rows); 0 for an empty scorecard.
    pub penetration_pct: u32,
}

/// Roll-up for one scorecard.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorecardSummary {
    pub id: String,
    pub title: String,
    pub row_count: usize,
    pub columns: Vec<ColumnPenetration>,
    /// Average of this scorecard's column penetrations.
    pub average_pct: u32,
    pub last_modified: DateTime<Utc>,
}

/// One retailer's average across every scorecard it appears in. Retailer
/// columns are matched across scorecards by normalized display name.
#[derive(Debug, Clone, PartialEq)]
pub struct RetailerAverage {
    pub name: String,
    pub scorecard_count: usize,
    pub average_pct: u32,
}

/// The cross-scorecard view: how deeply the catalog has penetrated each
/// retailer, per scorecard and overall.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MasterScorecard {
    pub summaries: Vec<ScorecardSummary>,
    pub retailers: Vec<RetailerAverage>,
    pub scorecard_count: usize,
    pub row_count: usize,
    /// Average over every retailer column of every scorecard.
    pub overall_average_pct: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Build the master scorecard. Read-only: derived entirely from the given
/// scorecards. Only user-added columns count as retailer columns; the ten
/// built-in columns describe the product, not a retailer.
pub fn build_master_scorecard(cards: &[Scorecard]) -> MasterScorecard {
    let mut summaries = Vec::with_capacity(cards.len());
    let mut row_count = 0;
    let mut pct_sum: u64 = 0;
    let mut pct_count: u64 = 0;

    for card in cards {
        let columns: Vec<ColumnPenetration> = card
            .columns
            .iter()
            .filter(|c| !c.is_default)
            .map(|c| {
                let authorized = card
                    .rows
                    .iter()
                    .filter(|row| {
                        row.get(&c.key)
                            .and_then(|v| v.as_text())
                            .and_then(ProductStatus::parse)
                            == Some(ProductStatus::Authorized)
                    })
                    .count();
                ColumnPenetration {
                    key: c.key.clone(),
                    name: c.name.clone(),
                    authorized,
                    total_rows: card.rows.len(),
                    penetration_pct: pct(authorized, card.rows.len()),
                }
            })
            .collect();

        row_count += card.rows.len();
        pct_sum += columns.iter().map(|c| c.penetration_pct as u64).sum::<u64>();
        pct_count += columns.len() as u64;

        let average_pct = if columns.is_empty() {
            0
        } else {
            let sum: u64 = columns.iter().map(|c| c.penetration_pct as u64).sum();
            (sum as f64 / columns.len() as f64).round() as u32
        };

        summaries.push(ScorecardSummary {
            id: card.id.clone(),
            title: card.title.clone(),
            row_count: card.rows.len(),
            columns,
            average_pct,
            last_modified: card.last_modified,
        });
    }

    MasterScorecard {
        scorecard_count: cards.len(),
        row_count,
        overall_average_pct: if pct_count == 0 {
            0
        } else {
            (pct_sum as f64 / pct_count as f64).round() as u32
        },
        last_updated: cards.iter().map(|c| c.last_modified).max(),
        retailers: retailer_averages(&summaries),
        summaries,
    }
}

fn retailer_averages(summaries: &[ScorecardSummary]) -> Vec<RetailerAverage> {
    // Keyed by normalized name, keeping the first display name seen.
    let mut order: Vec<String> = Vec::new();
    let mut grouped: std::collections::HashMap<String, (String, Vec<u32>)> =
        std::collections::HashMap::new();

    for summary in summaries {
        for col in &summary.columns {
            let norm = normalize_display_name(&col.name);
            let entry = grouped
                .entry(norm.clone())
                .or_insert_with(|| (col.name.clone(), Vec::new()));
            entry.1.push(col.penetration_pct);
            if !order.contains(&norm) {
                order.push(norm);
            }
        }
    }

    order
        .into_iter()
        .map(|norm| {
            let (name, pcts) = &grouped[&norm];
            let sum: u64 = pcts.iter().map(|p| *p as u64).sum();
            RetailerAverage {
                name: name.clone(),
                scorecard_count: pcts.len(),
                average_pct: (sum as f64 / pcts.len() as f64).round() as u32,
            }
        })
        .collect()
}

fn pct(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        0
    } else {
        (part as f64 * 100.0 / whole as f64).round() as u32
    }
}
