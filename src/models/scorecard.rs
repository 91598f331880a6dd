use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::text::derive_column_key;

/// Prefix marking an identifier that only exists client-side. A scorecard
/// keeps this id until its first migration to the remote store.
pub const LOCAL_ID_PREFIX: &str = "scorecard_";

/// Title used whenever the user leaves the name blank.
pub const UNTITLED: &str = "Untitled Scorecard";

/// Generate a fresh local-only identifier (time-based, like row ids).
pub fn new_local_id(now: DateTime<Utc>) -> String {
    format!("{}{}", LOCAL_ID_PREFIX, now.timestamp_millis())
}

/// Check whether an identifier has the local-only shape.
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Priority vocabulary for the built-in `priority` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
    }
}

/// Product status vocabulary for user-added retailer columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductStatus {
    Authorized,
    InProcess,
    InOut,
    BuyerPassed,
    Presented,
    Discontinued,
    MeetingSecured,
    OnHold,
    CategoryReview,
    OpenReview,
}

impl ProductStatus {
    pub const ALL: [ProductStatus; 10] = [
        ProductStatus::Authorized,
        ProductStatus::InProcess,
        ProductStatus::InOut,
        ProductStatus::BuyerPassed,
        ProductStatus::Presented,
        ProductStatus::Discontinued,
        ProductStatus::MeetingSecured,
        ProductStatus::OnHold,
        ProductStatus::CategoryReview,
        ProductStatus::OpenReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorized => "Authorized",
            Self::InProcess => "In Process",
            Self::InOut => "In/Out",
            Self::BuyerPassed => "Buyer Passed",
            Self::Presented => "Presented",
            Self::Discontinued => "Discontinued",
            Self::MeetingSecured => "Meeting Secured",
            Self::OnHold => "On Hold",
            Self::CategoryReview => "Category Review",
            Self::OpenReview => "Open Review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
    }
}

/// Contact reference stored in the two contact columns (`cmg`, `brand_lead`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub telephone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub notes: String,
}

impl Contact {
    /// What the cell displays: the contact's name, or a call-to-action
    /// placeholder when nothing is filled in yet.
    pub fn cell_label(&self, placeholder: &str) -> String {
        if self.name.is_empty() {
            placeholder.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// A single cell value. The untagged representation keeps the stored JSON
/// identical to what the portal backend expects: plain strings, plain
/// numbers, or a contact object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Contact(Contact),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn empty() -> Self {
        Self::Text(String::new())
    }

    /// Empty text is the cleared state for most editors. It is distinct from
    /// a numeric zero.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(s) if s.is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Self::Contact(c) => c.name.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Row identifier. New rows get time-based numeric ids; imported data may
/// carry string ids. Ids are unique within one scorecard and never
/// renumbered by deletions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for RowId {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for RowId {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One grid row: an id plus a cell per column key.
///
/// Invariant: every row holds a value (possibly empty) for every column key
/// in the scorecard. Structural column edits rewrite all rows to keep it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    #[serde(flatten)]
    pub cells: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn new(id: impl Into<RowId>) -> Self {
        Self {
            id: id.into(),
            cells: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: CellValue) {
        self.cells.insert(key.into(), value);
    }
}

/// Column descriptor: a stable machine `key` paired with a mutable display
/// `name`. The two are deliberately kept separate; renaming a column never
/// touches row data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub key: String,
    pub name: String,
    pub editable: bool,
    #[serde(default)]
    pub is_default: bool,
}

impl Column {
    /// A user-added column. The key is derived from the display name.
    pub fn user_added(name: &str, editable: bool) -> Self {
        Self {
            key: derive_column_key(name),
            name: name.trim().to_string(),
            editable,
            is_default: false,
        }
    }
}

/// Which editing affordance a cell gets. Resolved from the column in the
/// precedence order the dashboard uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorKind {
    /// Enumerated picker over High/Medium/Low.
    PriorityPicker,
    /// Enumerated picker over the product status vocabulary.
    StatusPicker,
    /// Non-negative currency with two-decimal display; empty is cleared.
    Currency,
    /// Non-negative integer; any non-digit input is rejected.
    IntegerCount,
    /// Date selection only; displayed MM/DD/YYYY.
    DatePicker,
    /// Side-panel contact card; not inline-editable.
    ContactCard,
    /// Free text.
    Text { editable: bool },
}

impl Column {
    /// Resolve the editor for this column, in precedence order:
    /// priority, user-added status, price, store count, review date,
    /// contact columns, free text.
    pub fn editor(&self, caller_can_edit: bool) -> EditorKind {
        if self.key == "priority" {
            return EditorKind::PriorityPicker;
        }
        if !self.is_default {
            return EditorKind::StatusPicker;
        }
        match self.key.as_str() {
            "retail_price" => EditorKind::Currency,
            "store_count" => EditorKind::IntegerCount,
            "category_review_date" => EditorKind::DatePicker,
            "cmg" | "brand_lead" => EditorKind::ContactCard,
            _ => EditorKind::Text {
                editable: self.editable && caller_can_edit,
            },
        }
    }
}

/// The JSON document the store persists per scorecard: columns plus rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScorecardPayload {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl From<&Scorecard> for ScorecardPayload {
    fn from(card: &Scorecard) -> Self {
        Self {
            columns: card.columns.clone(),
            rows: card.rows.clone(),
        }
    }
}

/// A named tabular document: the unit of persistence and auto-save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scorecard {
    pub id: String,
    pub title: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub is_draft: bool,
}

impl Scorecard {
    /// The fixed starter columns every new scorecard gets.
    pub fn default_columns() -> Vec<Column> {
        let def = |key: &str, name: &str, editable: bool| Column {
            key: key.to_string(),
            name: name.to_string(),
            editable,
            is_default: true,
        };
        vec![
            def("name", "Retailer Name", true),
            def("priority", "Priority", true),
            def("retail_price", "Retail Price", true),
            def("category_review_date", "CategoryReviewDate", false),
            def("buyer", "Buyer", true),
            def("store_count", "Store Count", true),
            def("route_to_market", "Route To Market", true),
            def("hq_location", "HQ Location", true),
            def("cmg", "Category Manager", false),
            def("brand_lead", "Brand Lead", false),
        ]
    }

    /// Create a local-only scorecard with the default columns and two
    /// placeholder rows, as a fresh session does.
    pub fn new_local(title: &str, now: DateTime<Utc>) -> Self {
        let mut card = Self {
            id: new_local_id(now),
            title: effective_title(title),
            columns: Self::default_columns(),
            rows: Vec::new(),
            created_at: now,
            last_modified: now,
            is_draft: true,
        };
        for (i, label) in ["Item 1", "Item 2"].iter().enumerate() {
            let mut row = card.seeded_row(RowId::Int(i as i64 + 1));
            row.set("name", CellValue::from(*label));
            card.rows.push(row);
        }
        card
    }

    pub fn is_local(&self) -> bool {
        is_local_id(&self.id)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modified = now;
    }

    pub fn column(&self, key: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.key == key)
    }

    pub fn row(&self, id: &RowId) -> Option<&Row> {
        self.rows.iter().find(|r| &r.id == id)
    }

    pub fn row_mut(&mut self, id: &RowId) -> Option<&mut Row> {
        self.rows.iter_mut().find(|r| &r.id == id)
    }

    /// Build a row with a value for every current column: seeded defaults
    /// for the known built-ins, empty otherwise.
    pub fn seeded_row(&self, id: RowId) -> Row {
        let mut row = Row::new(id);
        for col in &self.columns {
            let value = match col.key.as_str() {
                "priority" => CellValue::from(Priority::Medium.as_str()),
                "retail_price" | "store_count" => CellValue::Number(0.0),
                _ => CellValue::empty(),
            };
            row.set(col.key.clone(), value);
        }
        row
    }

    /// Check the structural invariant: every row covers every column key.
    pub fn rows_cover_columns(&self) -> bool {
        self.rows.iter().all(|row| {
            self.columns
                .iter()
                .all(|col| row.cells.contains_key(&col.key))
        })
    }
}

/// Structural and cell-level edit operations. Each validates synchronously
/// and returns before mutating anything on failure; on success the
/// `last_modified` timestamp is bumped.
impl Scorecard {
    /// Add a user-added column. The key is derived from the display name and
    /// must not collide with an existing key. The column is inserted
    /// immediately before the price column when one exists, and every
    /// existing row gets an empty value for the new key.
    pub fn add_column(
        &mut self,
        name: &str,
        editable: bool,
        now: DateTime<Utc>,
    ) -> Result<String, ScorecardValidationError> {
        if name.trim().is_empty() {
            return Err(ScorecardValidationError::EmptyColumnName);
        }
        let column = Column::user_added(name, editable);
        if self.columns.iter().any(|c| c.key == column.key) {
            return Err(ScorecardValidationError::DuplicateColumnKey(column.key));
        }
        let key = column.key.clone();
        let insert_at = self
            .columns
            .iter()
            .position(|c| c.key == "retail_price")
            .unwrap_or(self.columns.len());
        self.columns.insert(insert_at, column);
        for row in &mut self.rows {
            row.set(key.clone(), CellValue::empty());
        }
        self.touch(now);
        Ok(key)
    }

    /// Rename a column's display label. The key, and therefore all row data
    /// stored under it, is untouched. Empty names are rejected.
    pub fn rename_column(
        &mut self,
        key: &str,
        new_name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ScorecardValidationError> {
        if new_name.trim().is_empty() {
            return Err(ScorecardValidationError::EmptyColumnName);
        }
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.key == key)
            .ok_or_else(|| ScorecardValidationError::UnknownColumn(key.to_string()))?;
        column.name = new_name.trim().to_string();
        self.touch(now);
        Ok(())
    }

    /// Remove a column and strip its key from every row.
    pub fn delete_column(
        &mut self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ScorecardValidationError> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.key == key)
            .ok_or_else(|| ScorecardValidationError::UnknownColumn(key.to_string()))?;
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.cells.remove(key);
        }
        self.touch(now);
        Ok(())
    }

    /// Append a new row with a time-based id and seeded defaults.
    pub fn add_row(&mut self, now: DateTime<Utc>) -> RowId {
        let mut id = now.timestamp_millis();
        while self.rows.iter().any(|r| r.id == RowId::Int(id)) {
            id += 1;
        }
        let row = self.seeded_row(RowId::Int(id));
        let row_id = row.id.clone();
        self.rows.push(row);
        self.touch(now);
        row_id
    }

    /// Remove a row by id. Remaining ids are not renumbered.
    pub fn delete_row(
        &mut self,
        id: &RowId,
        now: DateTime<Utc>,
    ) -> Result<(), ScorecardValidationError> {
        let idx = self
            .rows
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| ScorecardValidationError::UnknownRow(id.to_string()))?;
        self.rows.remove(idx);
        self.touch(now);
        Ok(())
    }

    /// Edit a cell through its column's editor. Raw text input is validated
    /// and converted per editor kind; date and contact cells reject inline
    /// edits (they have dedicated entry points below).
    pub fn set_cell(
        &mut self,
        row_id: &RowId,
        key: &str,
        input: &str,
        caller_can_edit: bool,
        now: DateTime<Utc>,
    ) -> Result<(), ScorecardValidationError> {
        let column = self
            .column(key)
            .ok_or_else(|| ScorecardValidationError::UnknownColumn(key.to_string()))?;
        let value = match column.editor(caller_can_edit) {
            EditorKind::PriorityPicker => {
                if input.is_empty() {
                    CellValue::empty()
                } else {
                    Priority::parse(input)
                        .ok_or_else(|| {
                            ScorecardValidationError::InvalidPriority(input.to_string())
                        })?;
                    CellValue::from(input)
                }
            }
            EditorKind::StatusPicker => {
                if input.is_empty() {
                    CellValue::empty()
                } else {
                    ProductStatus::parse(input)
                        .ok_or_else(|| {
                            ScorecardValidationError::InvalidStatus(input.to_string())
                        })?;
                    CellValue::from(input)
                }
            }
            EditorKind::Currency => parse_currency_input(input)?,
            EditorKind::IntegerCount => parse_store_count_input(input)?,
            EditorKind::DatePicker | EditorKind::ContactCard => {
                return Err(ScorecardValidationError::NotEditable);
            }
            EditorKind::Text { editable } => {
                if !editable {
                    return Err(ScorecardValidationError::NotEditable);
                }
                CellValue::from(input)
            }
        };
        let key = key.to_string();
        let row = self
            .row_mut(row_id)
            .ok_or_else(|| ScorecardValidationError::UnknownRow(row_id.to_string()))?;
        row.set(key, value);
        self.touch(now);
        Ok(())
    }

    /// Set a review date from the date picker (selection only; free-typed
    /// input never reaches this path).
    pub fn set_review_date(
        &mut self,
        row_id: &RowId,
        date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<(), ScorecardValidationError> {
        let row = self
            .row_mut(row_id)
            .ok_or_else(|| ScorecardValidationError::UnknownRow(row_id.to_string()))?;
        let value = match date {
            Some(d) => CellValue::Text(d.format("%Y-%m-%d").to_string()),
            None => CellValue::empty(),
        };
        row.set("category_review_date", value);
        self.touch(now);
        Ok(())
    }

    /// Save a contact card into one of the contact columns.
    pub fn set_contact(
        &mut self,
        row_id: &RowId,
        key: &str,
        contact: Contact,
        now: DateTime<Utc>,
    ) -> Result<(), ScorecardValidationError> {
        let column = self
            .column(key)
            .ok_or_else(|| ScorecardValidationError::UnknownColumn(key.to_string()))?;
        if column.editor(true) != EditorKind::ContactCard {
            return Err(ScorecardValidationError::NotEditable);
        }
        let key = key.to_string();
        let row = self
            .row_mut(row_id)
            .ok_or_else(|| ScorecardValidationError::UnknownRow(row_id.to_string()))?;
        row.set(key, CellValue::Contact(contact));
        self.touch(now);
        Ok(())
    }
}

/// Resolve a possibly-blank title to its effective value.
pub fn effective_title(title: &str) -> String {
    let t = title.trim();
    if t.is_empty() {
        UNTITLED.to_string()
    } else {
        t.to_string()
    }
}

/// Parse raw currency input the price editor accepted ("12.5", "").
/// Empty input is the cleared state, not zero.
pub fn parse_currency_input(input: &str) -> Result<CellValue, ScorecardValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(CellValue::empty());
    }
    let value: f64 = input
        .parse()
        .map_err(|_| ScorecardValidationError::InvalidCurrency(input.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ScorecardValidationError::InvalidCurrency(input.to_string()));
    }
    Ok(CellValue::Number(value))
}

/// Format a price cell for display: `$X.XX`, or empty for the cleared state.
pub fn format_currency(value: &CellValue) -> String {
    match value {
        CellValue::Number(n) => format!("${:.2}", n),
        CellValue::Text(s) if s.is_empty() => String::new(),
        CellValue::Text(s) => match s.parse::<f64>() {
            Ok(n) => format!("${:.2}", n),
            Err(_) => String::new(),
        },
        CellValue::Contact(_) => String::new(),
    }
}

/// Parse store-count input: digits only, no sign, no decimal point.
pub fn parse_store_count_input(input: &str) -> Result<CellValue, ScorecardValidationError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(CellValue::empty());
    }
    if !input.chars().all(|c| c.is_ascii_digit()) {
        return Err(ScorecardValidationError::InvalidStoreCount(
            input.to_string(),
        ));
    }
    let value: i64 = input
        .parse()
        .map_err(|_| ScorecardValidationError::InvalidStoreCount(input.to_string()))?;
    Ok(CellValue::Number(value as f64))
}

/// Format a review-date cell for display (MM/DD/YYYY).
pub fn format_review_date(value: &CellValue) -> String {
    let raw = match value {
        CellValue::Text(s) if !s.is_empty() => s,
        _ => return String::new(),
    };
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => date.format("%m/%d/%Y").to_string(),
        Err(_) => String::new(),
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ScorecardValidationError {
    #[error("Column name cannot be empty")]
    EmptyColumnName,
    #[error("Column name must be unique")]
    DuplicateColumnKey(String),
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
    #[error("Unknown row: {0}")]
    UnknownRow(String),
    #[error("Invalid priority: {0}")]
    InvalidPriority(String),
    #[error("Invalid status: {0}")]
    InvalidStatus(String),
    #[error("Invalid price: {0}")]
    InvalidCurrency(String),
    #[error("Store count must be a whole number: {0}")]
    InvalidStoreCount(String),
    #[error("Column is not editable")]
    NotEditable,
}
