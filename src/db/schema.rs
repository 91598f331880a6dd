/// SQL schema for the scorecard portal backing store.
///
/// Scorecard payloads (columns + rows) are stored as one JSON document per
/// record, the way the portal API persists them. Comments are relational:
/// they carry the foreign key that forces local-only scorecards to migrate
/// before their first comment.

pub const SCHEMA_VERSION: i32 = 1;

pub const CREATE_TABLES: &str = r#"
-- Scorecards. Remote ids are the integer primary key rendered as a string;
-- local-only ids never reach this table.
CREATE TABLE IF NOT EXISTS scorecards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    data TEXT NOT NULL,
    is_draft INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    last_modified TEXT NOT NULL
);

-- Per-row comments, keyed by (scorecard_id, row_id).
CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scorecard_id INTEGER NOT NULL,
    row_id TEXT NOT NULL,
    author TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (scorecard_id) REFERENCES scorecards(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_comments_scorecard ON comments(scorecard_id);
CREATE INDEX IF NOT EXISTS idx_comments_row ON comments(scorecard_id, row_id);

-- Column/row snapshots for re-seeding scorecards.
CREATE TABLE IF NOT EXISTS templates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    columns TEXT NOT NULL,
    rows TEXT,
    created_at TEXT NOT NULL
);

-- Migration history
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
