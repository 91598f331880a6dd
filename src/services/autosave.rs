use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::debounce::Debouncer;
use super::store::{SaveAck, StoreError};

/// What the save indicator shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    Unsaved,
    /// In-flight save. Only drivers that render between observing a document
    /// and applying the report surface this; a synchronous tick completes the
    /// save within one call, so `status()` never returns it.
    Saving,
    Error,
    Offline,
}

/// What to do with the single-slot unsaved-work backup after a save attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupAction {
    Write(String),
    Clear,
}

/// Outcome of one save attempt.
#[derive(Debug)]
pub enum SaveOutcome {
    Saved(SaveAck),
    Failed(StoreError),
    /// Offline: the work went to the backup slot instead of the store.
    Deferred,
}

/// Report emitted when the engine attempted (or deferred) a save.
#[derive(Debug)]
pub struct SaveReport {
    pub outcome: SaveOutcome,
    pub backup: Option<BackupAction>,
}

/// Drives debounced auto-save for one document at a time.
///
/// The engine never talks to a store directly. Each tick the caller observes
/// the current document, then runs the engine with a save closure; the engine
/// decides whether the closure runs at all. Backup actions come back in the
/// report so the owner of the cache applies them.
pub struct AutoSaveEngine<V> {
    debouncer: Debouncer<V>,
    online: bool,
    error: Option<String>,
    last_saved: Option<DateTime<Utc>>,
}

impl<V: Serialize + Clone> AutoSaveEngine<V> {
    pub fn new(window: Duration) -> Self {
        Self {
            debouncer: Debouncer::new(window),
            online: true,
            error: None,
            last_saved: None,
        }
    }

    /// Observe the current document state. Call every tick before [`run`].
    ///
    /// [`run`]: AutoSaveEngine::run
    pub fn observe(&mut self, value: &V, now: DateTime<Utc>) {
        self.debouncer.observe(value, now);
    }

    /// Attempt the debounced save if one is due.
    pub fn run<F>(&mut self, now: DateTime<Utc>, save: F) -> Option<SaveReport>
    where
        F: FnOnce(&V) -> Result<SaveAck, StoreError>,
    {
        let value = self.debouncer.poll(now)?;
        Some(self.attempt(&value, save))
    }

    /// Save any unsaved work immediately, skipping the countdown.
    pub fn force<F>(&mut self, save: F) -> Option<SaveReport>
    where
        F: FnOnce(&V) -> Result<SaveAck, StoreError>,
    {
        let value = self.debouncer.force()?;
        Some(self.attempt(&value, save))
    }

    fn attempt<F>(&mut self, value: &V, save: F) -> SaveReport
    where
        F: FnOnce(&V) -> Result<SaveAck, StoreError>,
    {
        if !self.online {
            debug!("Offline, backing up unsaved work instead of saving");
            self.debouncer.save_failed();
            return SaveReport {
                outcome: SaveOutcome::Deferred,
                backup: self.backup_write(),
            };
        }

        match save(value) {
            Ok(ack) => {
                self.debouncer.committed();
                self.error = None;
                self.last_saved = Some(ack.last_modified);
                SaveReport {
                    outcome: SaveOutcome::Saved(ack),
                    backup: Some(BackupAction::Clear),
                }
            }
            Err(e) if e.is_network() => {
                warn!("Save failed, going offline: {}", e);
                self.online = false;
                self.debouncer.save_failed();
                SaveReport {
                    outcome: SaveOutcome::Failed(e),
                    backup: self.backup_write(),
                }
            }
            Err(e) => {
                warn!("Save failed: {}", e);
                self.error = Some(e.to_string());
                self.debouncer.save_failed();
                SaveReport {
                    outcome: SaveOutcome::Failed(e),
                    backup: self.backup_write(),
                }
            }
        }
    }

    fn backup_write(&self) -> Option<BackupAction> {
        self.debouncer
            .latest_json()
            .map(|json| BackupAction::Write(json.to_string()))
    }

    /// Flip connectivity. Coming back online restarts the countdown for any
    /// work that is still unsaved.
    pub fn set_online(&mut self, online: bool, now: DateTime<Utc>) {
        if online && !self.online {
            self.debouncer.rearm(now);
        }
        self.online = online;
    }

    /// Adopt `value` as the clean baseline, e.g. after the document's
    /// identity changed without any cell edit.
    pub fn rebaseline(&mut self, value: &V) {
        self.debouncer.set_baseline(value);
    }

    /// Switch to a different document. The next observed value becomes the
    /// new baseline and pending work for the old document is dropped.
    pub fn reset(&mut self) {
        self.debouncer.reset();
        self.error = None;
        self.last_saved = None;
    }

    pub fn status(&self) -> SaveStatus {
        if !self.online {
            SaveStatus::Offline
        } else if self.error.is_some() {
            SaveStatus::Error
        } else if self.debouncer.is_dirty() {
            SaveStatus::Unsaved
        } else {
            SaveStatus::Saved
        }
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.debouncer.is_dirty()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
