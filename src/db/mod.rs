pub mod schema;
pub mod migrations;
pub mod scorecard_repo;
pub mod comment_repo;
pub mod template_repo;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub use comment_repo::CommentRepository;
pub use scorecard_repo::ScorecardRepository;
pub use template_repo::TemplateRepository;

/// Main database wrapper with thread-safe access
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            "
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        migrations::run_migrations(&conn)
    }

    /// Scorecard repository
    pub fn scorecards(&self) -> ScorecardRepository {
        ScorecardRepository::new(Arc::clone(&self.conn))
    }

    /// Comment repository
    pub fn comments(&self) -> CommentRepository {
        CommentRepository::new(Arc::clone(&self.conn))
    }

    /// Template repository
    pub fn templates(&self) -> TemplateRepository {
        TemplateRepository::new(Arc::clone(&self.conn))
    }

    /// Direct connection access (for advanced operations)
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}
