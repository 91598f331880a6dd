pub mod autosave;
pub mod cache;
pub mod debounce;
pub mod import;
pub mod master_scorecard;
pub mod store;

pub use autosave::{AutoSaveEngine, BackupAction, SaveOutcome, SaveReport, SaveStatus};
pub use cache::{LocalCache, BACKUP_KEY, SCORECARDS_KEY};
pub use debounce::Debouncer;
pub use import::{apply_import, ImportError, ImportSheet};
pub use master_scorecard::{
    build_master_scorecard, ColumnPenetration, MasterScorecard, RetailerAverage, ScorecardSummary,
};
pub use store::{SaveAck, ScorecardStore, SqliteStore, StoreError};
