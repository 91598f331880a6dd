use std::collections::HashMap;
use std::path::PathBuf;

use tracing::warn;

/// Cache key for the offline copy of the scorecard list.
pub const SCORECARDS_KEY: &str = "scorecards";

/// Cache key for the single-slot unsaved-work backup.
pub const BACKUP_KEY: &str = "auto-save-backup";

/// A small key-value cache of JSON strings on local disk.
///
/// This is an availability layer, not a sync layer: writes are best-effort
/// and a failed write only logs a warning. Nothing here ever merges back
/// into the store on its own.
pub struct LocalCache {
    path: Option<PathBuf>,
    entries: HashMap<String, String>,
}

impl LocalCache {
    /// Open the cache file, starting empty if it is missing or unreadable.
    pub fn open(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Discarding unreadable cache at {:?}: {}", path, e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Self {
            path: Some(path),
            entries,
        }
    }

    /// A cache with no backing file (for tests).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
        self.flush();
    }

    pub fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.flush();
        }
    }

    fn flush(&self) {
        let Some(path) = &self.path else {
            return;
        };

        let result = serde_json::to_string(&self.entries)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, json)
            });

        if let Err(e) = result {
            warn!("Failed to write cache at {:?}: {}", path, e);
        }
    }
}
