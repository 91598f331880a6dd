//! Scorecard Portal - core engine for the vendor/retailer scorecard grid
//!
//! Scorecard editing, debounced auto-save with offline backup, and the
//! local-draft-to-store migration, independent of any UI layer.

pub mod db;
pub mod models;
pub mod services;
pub mod session;
pub mod utils;

// Re-exports
pub use db::Database;
pub use models::*;
pub use services::{SaveStatus, ScorecardStore, SqliteStore};
pub use session::EditorSession;
pub use utils::{AppError, AppResult};
