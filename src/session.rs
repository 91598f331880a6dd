use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::{
    effective_title, is_local_id, new_local_id, CellValue, Comment, Contact, CurrentUser, Row,
    RowId, Scorecard, ScorecardPayload, Template, UserRole,
};
use crate::services::{
    build_master_scorecard, AutoSaveEngine, BackupAction, LocalCache, MasterScorecard, SaveAck,
    SaveOutcome, SaveReport, SaveStatus, ScorecardStore, StoreError, BACKUP_KEY, SCORECARDS_KEY,
};
use crate::utils::{AppError, AppResult};

/// What the auto-save engine watches and what the backup slot stores: the
/// parts of a scorecard whose change means unsaved work. Timestamps are
/// deliberately absent so that acknowledging a save does not look like a
/// fresh edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(flatten)]
    pub payload: ScorecardPayload,
}

impl From<&Scorecard> for DocumentSnapshot {
    fn from(card: &Scorecard) -> Self {
        Self {
            id: card.id.clone(),
            title: card.title.clone(),
            is_draft: card.is_draft,
            payload: ScorecardPayload::from(card),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// View-only sort applied to the selected scorecard's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SortState {
    pub key: String,
    pub direction: SortDirection,
}

/// One user's editing session over the scorecard portal.
///
/// The session owns the in-memory scorecards, the selection, the comment
/// cache, and the auto-save engine, and is driven by [`tick`]: observe the
/// selected document, run any due save, apply the result. All mutation goes
/// through the session so role gating and the local-to-store migration
/// happen in exactly one place.
///
/// [`tick`]: EditorSession::tick
pub struct EditorSession<S> {
    store: S,
    cache: LocalCache,
    user: CurrentUser,
    engine: AutoSaveEngine<DocumentSnapshot>,
    scorecards: Vec<Scorecard>,
    selected: Option<String>,
    comments: HashMap<String, HashMap<RowId, Vec<Comment>>>,
    sort: Option<SortState>,
    last_error: Option<String>,
}

impl<S: ScorecardStore> EditorSession<S> {
    pub fn new(store: S, cache: LocalCache, user: CurrentUser, debounce: Duration) -> Self {
        Self {
            store,
            cache,
            user,
            engine: AutoSaveEngine::new(debounce),
            scorecards: Vec::new(),
            selected: None,
            comments: HashMap::new(),
            sort: None,
            last_error: None,
        }
    }

    /// Load the scorecard list from the store, falling back to the cached
    /// copy when the store is unreachable.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        match self.store.list_scorecards() {
            Ok(cards) => {
                // Local-only drafts never live in the store; keep them.
                let mut merged = cards;
                merged.extend(self.scorecards.drain(..).filter(|c| c.is_local()));
                self.scorecards = merged;
                self.engine.set_online(true, now);
                self.snapshot_scorecards();
            }
            Err(e) if e.is_network() => {
                warn!("Store unreachable, serving cached scorecards: {}", e);
                self.engine.set_online(false, now);
                if self.scorecards.is_empty() {
                    if let Some(json) = self.cache.get(SCORECARDS_KEY) {
                        self.scorecards = serde_json::from_str(json).unwrap_or_default();
                    }
                }
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(id) = &self.selected {
            if !self.scorecards.iter().any(|c| &c.id == id) {
                self.selected = None;
                self.engine.reset();
            }
        }
        Ok(())
    }

    /// Drive the auto-save loop. Call once per frame or poll interval.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        let Some(report) = self.drive(now, false) else {
            return;
        };
        self.apply_report(report, now);
    }

    /// Save unsaved work immediately, skipping the debounce countdown.
    pub fn force_save(&mut self, now: DateTime<Utc>) {
        let Some(report) = self.drive(now, true) else {
            return;
        };
        self.apply_report(report, now);
    }

    fn drive(&mut self, now: DateTime<Utc>, force: bool) -> Option<SaveReport> {
        let selected = self.selected.clone()?;
        let Self {
            engine,
            store,
            scorecards,
            ..
        } = self;
        let card = scorecards.iter().find(|c| c.id == selected)?;
        engine.observe(&DocumentSnapshot::from(card), now);
        let save = |snap: &DocumentSnapshot| persist_snapshot(store, snap, now);
        if force {
            engine.force(save)
        } else {
            engine.run(now, save)
        }
    }

    fn apply_report(&mut self, report: SaveReport, _now: DateTime<Utc>) {
        match report.backup {
            Some(BackupAction::Write(json)) => self.cache.set(BACKUP_KEY, json),
            Some(BackupAction::Clear) => self.cache.remove(BACKUP_KEY),
            None => {}
        }

        match report.outcome {
            SaveOutcome::Saved(ack) => {
                let Some(selected) = self.selected.clone() else {
                    return;
                };
                if ack.id != selected {
                    self.adopt_remote_id(&selected, &ack.id);
                }
                if let Some(card) = self.scorecards.iter_mut().find(|c| c.id == ack.id) {
                    card.last_modified = ack.last_modified;
                }
                self.last_error = None;
                self.snapshot_scorecards();
            }
            SaveOutcome::Failed(StoreError::NotFound(msg)) => {
                // Deleted elsewhere: drop it rather than retry forever.
                if let Some(id) = self.selected.take() {
                    warn!("Scorecard {} is gone, dropping it: {}", id, msg);
                    self.scorecards.retain(|c| c.id != id);
                    self.comments.remove(&id);
                    self.engine.reset();
                    self.sort = None;
                    self.snapshot_scorecards();
                }
                self.last_error = Some(msg);
            }
            SaveOutcome::Failed(e) => {
                self.last_error = Some(e.to_string());
            }
            SaveOutcome::Deferred => {}
        }
    }

    /// Guarantee a scorecard exists in the store, migrating a local-only one
    /// on first need. Idempotent: an already-persisted id is returned as-is.
    /// Returns the store id.
    pub fn ensure_persisted(&mut self, id: &str, now: DateTime<Utc>) -> AppResult<String> {
        let card = self
            .scorecards
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::not_found(format!("Scorecard {} is not loaded", id)))?;

        if !card.is_local() {
            return Ok(card.id.clone());
        }

        let payload = ScorecardPayload::from(card);
        let created = self
            .store
            .create_scorecard(&card.title, &payload, card.is_draft, now)?;
        let new_id = created.id.clone();
        info!("Migrated local scorecard {} to store id {}", id, new_id);

        if let Some(card) = self.scorecards.iter_mut().find(|c| c.id == id) {
            card.created_at = created.created_at;
            card.last_modified = created.last_modified;
        }
        self.adopt_remote_id(id, &new_id);
        self.snapshot_scorecards();
        Ok(new_id)
    }

    /// Rewrite every reference to a scorecard id after migration: the card
    /// itself, the selection, the comment cache, and the engine baseline.
    fn adopt_remote_id(&mut self, old_id: &str, new_id: &str) {
        if let Some(card) = self.scorecards.iter_mut().find(|c| c.id == old_id) {
            card.id = new_id.to_string();
        }
        if self.selected.as_deref() == Some(old_id) {
            self.selected = Some(new_id.to_string());
            if let Some(card) = self.scorecards.iter().find(|c| c.id == new_id) {
                self.engine.rebaseline(&DocumentSnapshot::from(card));
            }
        }
        if let Some(per_row) = self.comments.remove(old_id) {
            self.comments.insert(new_id.to_string(), per_row);
        }
    }

    fn snapshot_scorecards(&mut self) {
        match serde_json::to_string(&self.scorecards) {
            Ok(json) => self.cache.set(SCORECARDS_KEY, json),
            Err(e) => warn!("Failed to snapshot scorecards: {}", e),
        }
    }

    // ---- selection and creation ----

    pub fn open_scorecard(&mut self, id: &str) -> AppResult<()> {
        if !self.scorecards.iter().any(|c| c.id == id) {
            return Err(AppError::not_found(format!(
                "Scorecard {} is not loaded",
                id
            )));
        }
        if self.selected.as_deref() != Some(id) {
            self.engine.reset();
            self.sort = None;
            self.selected = Some(id.to_string());
        }
        Ok(())
    }

    pub fn close_scorecard(&mut self) {
        self.selected = None;
        self.sort = None;
        self.engine.reset();
    }

    /// Create a scorecard directly in the store and select it.
    pub fn create_scorecard(&mut self, title: &str, now: DateTime<Utc>) -> AppResult<String> {
        self.require_editor()?;
        self.reject_duplicate_title(title)?;
        let seed = Scorecard::new_local(title, now);
        let created =
            self.store
                .create_scorecard(&seed.title, &ScorecardPayload::from(&seed), false, now)?;
        let id = created.id.clone();
        self.scorecards.push(created);
        self.snapshot_scorecards();
        self.open_scorecard(&id)?;
        Ok(id)
    }

    /// Create a local-only draft. It reaches the store on the first
    /// auto-save, or through [`ensure_persisted`].
    ///
    /// [`ensure_persisted`]: EditorSession::ensure_persisted
    pub fn create_local_scorecard(&mut self, title: &str, now: DateTime<Utc>) -> AppResult<String> {
        self.require_editor()?;
        self.reject_duplicate_title(title)?;
        let card = Scorecard::new_local(title, now);
        let id = card.id.clone();
        self.scorecards.push(card);
        self.snapshot_scorecards();
        self.open_scorecard(&id)?;
        Ok(id)
    }

    pub fn delete_scorecard(&mut self, id: &str, _now: DateTime<Utc>) -> AppResult<()> {
        self.require_editor()?;
        let card = self
            .scorecards
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::not_found(format!("Scorecard {} is not loaded", id)))?;
        if !card.is_local() {
            self.store.delete_scorecard(id)?;
        }
        self.scorecards.retain(|c| c.id != id);
        self.comments.remove(id);
        if self.selected.as_deref() == Some(id) {
            self.close_scorecard();
        }
        self.snapshot_scorecards();
        Ok(())
    }

    fn reject_duplicate_title(&self, title: &str) -> AppResult<()> {
        let wanted = effective_title(title).to_lowercase();
        if self
            .scorecards
            .iter()
            .any(|c| effective_title(&c.title).to_lowercase() == wanted)
        {
            return Err(AppError::validation(format!(
                "A scorecard named {:?} already exists",
                effective_title(title)
            )));
        }
        Ok(())
    }

    // ---- edits on the selected scorecard ----

    pub fn set_title(&mut self, title: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.require_editor()?;
        let card = self.selected_card_mut()?;
        card.title = effective_title(title);
        card.touch(now);
        Ok(())
    }

    /// Mark the selected scorecard as draft or final. The flag has its own
    /// lifecycle: neither saving nor migration touches it.
    pub fn set_draft(&mut self, is_draft: bool, now: DateTime<Utc>) -> AppResult<()> {
        self.require_editor()?;
        let card = self.selected_card_mut()?;
        card.is_draft = is_draft;
        card.touch(now);
        Ok(())
    }

    pub fn set_cell(
        &mut self,
        row_id: &RowId,
        key: &str,
        input: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.require_editor()?;
        let can_edit = self.user.role.can_edit();
        let card = self.selected_card_mut()?;
        card.set_cell(row_id, key, input, can_edit, now)
            .map_err(|e| AppError::validation(e.to_string()))
    }

    pub fn set_review_date(
        &mut self,
        row_id: &RowId,
        date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.require_editor()?;
        self.selected_card_mut()?
            .set_review_date(row_id, date, now)
            .map_err(|e| AppError::validation(e.to_string()))
    }

    pub fn set_contact(
        &mut self,
        row_id: &RowId,
        key: &str,
        contact: Contact,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.require_editor()?;
        self.selected_card_mut()?
            .set_contact(row_id, key, contact, now)
            .map_err(|e| AppError::validation(e.to_string()))
    }

    pub fn add_column(&mut self, name: &str, now: DateTime<Utc>) -> AppResult<String> {
        self.require_editor()?;
        self.selected_card_mut()?
            .add_column(name, true, now)
            .map_err(|e| AppError::validation(e.to_string()))
    }

    pub fn rename_column(&mut self, key: &str, name: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.require_editor()?;
        self.selected_card_mut()?
            .rename_column(key, name, now)
            .map_err(|e| AppError::validation(e.to_string()))
    }

    pub fn delete_column(&mut self, key: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.require_editor()?;
        self.selected_card_mut()?
            .delete_column(key, now)
            .map_err(|e| AppError::validation(e.to_string()))
    }

    pub fn add_row(&mut self, now: DateTime<Utc>) -> AppResult<RowId> {
        self.require_editor()?;
        Ok(self.selected_card_mut()?.add_row(now))
    }

    pub fn delete_row(&mut self, row_id: &RowId, now: DateTime<Utc>) -> AppResult<()> {
        self.require_editor()?;
        self.selected_card_mut()?
            .delete_row(row_id, now)
            .map_err(|e| AppError::validation(e.to_string()))
    }

    pub fn import_rows(
        &mut self,
        sheet: &crate::services::ImportSheet,
        now: DateTime<Utc>,
    ) -> AppResult<usize> {
        self.require_editor()?;
        let card = self.selected_card_mut()?;
        crate::services::apply_import(card, sheet, now)
            .map_err(|e| AppError::validation(e.to_string()))
    }

    // ---- comments ----

    /// Add a comment to a row. A local-only scorecard is migrated to the
    /// store first, since comments need a store-side foreign key.
    pub fn add_comment(
        &mut self,
        scorecard_id: &str,
        row_id: &RowId,
        text: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Comment> {
        if self.user.role == UserRole::Anonymous {
            return Err(AppError::auth("Sign in to comment"));
        }
        Comment::validate_text(text).map_err(|e| AppError::validation(e.to_string()))?;

        let store_id = self.ensure_persisted(scorecard_id, now)?;
        let author = self.user.name.clone();
        let comment = self
            .store
            .create_comment(&store_id, row_id, &author, text, now)?;

        self.comments
            .entry(store_id)
            .or_default()
            .entry(row_id.clone())
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }

    /// Pull a scorecard's comments from the store. Local-only scorecards
    /// have none by construction.
    pub fn load_comments(&mut self, scorecard_id: &str) -> AppResult<()> {
        if is_local_id(scorecard_id) {
            return Ok(());
        }
        let mut per_row: HashMap<RowId, Vec<Comment>> = HashMap::new();
        for comment in self.store.list_comments(scorecard_id)? {
            per_row.entry(comment.row_id.clone()).or_default().push(comment);
        }
        self.comments.insert(scorecard_id.to_string(), per_row);
        Ok(())
    }

    pub fn comments_for(&self, scorecard_id: &str, row_id: &RowId) -> &[Comment] {
        self.comments
            .get(scorecard_id)
            .and_then(|per_row| per_row.get(row_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn update_comment(
        &mut self,
        scorecard_id: &str,
        id: i64,
        text: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.user.role == UserRole::Anonymous {
            return Err(AppError::auth("Sign in to manage comments"));
        }
        Comment::validate_text(text).map_err(|e| AppError::validation(e.to_string()))?;
        self.store.update_comment(id, text, now)?;
        if let Some(per_row) = self.comments.get_mut(scorecard_id) {
            for list in per_row.values_mut() {
                for c in list.iter_mut().filter(|c| c.id == id) {
                    c.text = text.to_string();
                    c.updated_at = now;
                }
            }
        }
        Ok(())
    }

    pub fn delete_comment(&mut self, scorecard_id: &str, id: i64) -> AppResult<()> {
        if self.user.role == UserRole::Anonymous {
            return Err(AppError::auth("Sign in to manage comments"));
        }
        self.store.delete_comment(id)?;
        if let Some(per_row) = self.comments.get_mut(scorecard_id) {
            for list in per_row.values_mut() {
                list.retain(|c| c.id != id);
            }
        }
        Ok(())
    }

    // ---- templates ----

    pub fn save_template(
        &mut self,
        name: &str,
        include_rows: bool,
        now: DateTime<Utc>,
    ) -> AppResult<Template> {
        self.require_editor()?;
        let card = self.selected_card()?;
        let template = Template::from_scorecard(name, card, include_rows);
        template
            .validate()
            .map_err(|e| AppError::validation(e.to_string()))?;
        Ok(self.store.save_template(&template, now)?)
    }

    pub fn apply_template(&mut self, name: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.require_editor()?;
        let template = self
            .store
            .list_templates()?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| AppError::not_found(format!("Template {:?} not found", name)))?;
        let card = self.selected_card_mut()?;
        template.apply_to(card, now);
        Ok(())
    }

    pub fn list_templates(&self) -> AppResult<Vec<Template>> {
        Ok(self.store.list_templates()?)
    }

    pub fn delete_template(&mut self, id: i64) -> AppResult<()> {
        self.require_editor()?;
        Ok(self.store.delete_template(id)?)
    }

    // ---- sorting (view-only) ----

    /// Cycle a column's sort: ascending, then descending, then off.
    /// Sorting another column starts that column ascending. Row storage
    /// order is never touched.
    pub fn toggle_sort(&mut self, key: &str) {
        self.sort = match self.sort.take() {
            Some(s) if s.key == key => match s.direction {
                SortDirection::Ascending => Some(SortState {
                    key: s.key,
                    direction: SortDirection::Descending,
                }),
                SortDirection::Descending => None,
            },
            _ => Some(SortState {
                key: key.to_string(),
                direction: SortDirection::Ascending,
            }),
        };
    }

    pub fn sort_state(&self) -> Option<&SortState> {
        self.sort.as_ref()
    }

    /// The selected scorecard's rows in display order. Empty cells sort
    /// last in both directions.
    pub fn visible_rows(&self) -> Vec<&Row> {
        let Some(card) = self.selected_card().ok() else {
            return Vec::new();
        };
        let mut rows: Vec<&Row> = card.rows.iter().collect();
        if let Some(sort) = &self.sort {
            rows.sort_by(|a, b| {
                let va = a.get(&sort.key).filter(|v| !v.is_empty());
                let vb = b.get(&sort.key).filter(|v| !v.is_empty());
                match (va, vb) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(_), None) => Ordering::Less,
                    (Some(x), Some(y)) => {
                        let ord = compare_cells(x, y);
                        match sort.direction {
                            SortDirection::Ascending => ord,
                            SortDirection::Descending => ord.reverse(),
                        }
                    }
                }
            });
        }
        rows
    }

    // ---- connectivity and status ----

    pub fn set_online(&mut self, online: bool, now: DateTime<Utc>) {
        self.engine.set_online(online, now);
    }

    pub fn is_online(&self) -> bool {
        self.engine.is_online()
    }

    pub fn save_status(&self) -> SaveStatus {
        self.engine.status()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.engine.has_unsaved_changes()
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.engine.last_saved()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref().or_else(|| self.engine.error())
    }

    // ---- backup recovery ----

    pub fn has_backup(&self) -> bool {
        self.cache.get(BACKUP_KEY).is_some()
    }

    /// Restore the unsaved-work backup into the matching scorecard. When the
    /// scorecard no longer exists it comes back as a local draft. Returns
    /// false when there is nothing to restore.
    pub fn restore_backup(&mut self, now: DateTime<Utc>) -> AppResult<bool> {
        let Some(json) = self.cache.get(BACKUP_KEY) else {
            return Ok(false);
        };
        let snap: DocumentSnapshot = serde_json::from_str(json)
            .map_err(|e| AppError::other(format!("Unreadable backup: {}", e)))?;

        match self.scorecards.iter_mut().find(|c| c.id == snap.id) {
            Some(card) => {
                card.title = snap.title;
                card.columns = snap.payload.columns;
                card.rows = snap.payload.rows;
                card.is_draft = snap.is_draft;
                card.touch(now);
            }
            None => {
                self.scorecards.push(Scorecard {
                    id: new_local_id(now),
                    title: snap.title,
                    columns: snap.payload.columns,
                    rows: snap.payload.rows,
                    created_at: now,
                    last_modified: now,
                    is_draft: true,
                });
            }
        }
        self.cache.remove(BACKUP_KEY);
        self.snapshot_scorecards();
        Ok(true)
    }

    // ---- read access ----

    pub fn scorecards(&self) -> &[Scorecard] {
        &self.scorecards
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_card(&self) -> AppResult<&Scorecard> {
        let id = self
            .selected
            .as_deref()
            .ok_or_else(|| AppError::validation("No scorecard selected"))?;
        self.scorecards
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::not_found(format!("Scorecard {} is not loaded", id)))
    }

    fn selected_card_mut(&mut self) -> AppResult<&mut Scorecard> {
        let id = self
            .selected
            .clone()
            .ok_or_else(|| AppError::validation("No scorecard selected"))?;
        self.scorecards
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::not_found(format!("Scorecard {} is not loaded", id)))
    }

    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn master_scorecard(&self) -> MasterScorecard {
        build_master_scorecard(&self.scorecards)
    }

    fn require_editor(&self) -> AppResult<()> {
        if self.user.role.can_edit() {
            Ok(())
        } else {
            Err(AppError::auth("Editing requires an admin account"))
        }
    }
}

fn persist_snapshot<S: ScorecardStore>(
    store: &S,
    snap: &DocumentSnapshot,
    now: DateTime<Utc>,
) -> Result<SaveAck, StoreError> {
    if is_local_id(&snap.id) {
        store
            .create_scorecard(&snap.title, &snap.payload, snap.is_draft, now)
            .map(|created| SaveAck {
                id: created.id,
                last_modified: created.last_modified,
            })
    } else {
        store.update_scorecard(&snap.id, &snap.title, &snap.payload, snap.is_draft, now)
    }
}

fn compare_cells(a: &CellValue, b: &CellValue) -> Ordering {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.display().to_lowercase().cmp(&b.display().to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::services::SqliteStore;
    use std::cell::Cell;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn admin() -> CurrentUser {
        CurrentUser {
            id: "u1".into(),
            role: UserRole::Admin,
            name: "Dana".into(),
        }
    }

    fn init_logging() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn session() -> EditorSession<SqliteStore> {
        init_logging();
        EditorSession::new(
            SqliteStore::new(Database::open_in_memory().unwrap()),
            LocalCache::in_memory(),
            admin(),
            Duration::seconds(3),
        )
    }

    /// Store wrapper whose connectivity can be flipped from a test.
    struct FlakyStore {
        inner: SqliteStore,
        online: Cell<bool>,
    }

    impl FlakyStore {
        fn new() -> Self {
            init_logging();
            Self {
                inner: SqliteStore::new(Database::open_in_memory().unwrap()),
                online: Cell::new(true),
            }
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.online.get() {
                Ok(())
            } else {
                Err(StoreError::Network("connection refused".into()))
            }
        }
    }

    impl ScorecardStore for FlakyStore {
        fn create_scorecard(
            &self,
            title: &str,
            payload: &ScorecardPayload,
            is_draft: bool,
            now: DateTime<Utc>,
        ) -> Result<Scorecard, StoreError> {
            self.check()?;
            self.inner.create_scorecard(title, payload, is_draft, now)
        }

        fn update_scorecard(
            &self,
            id: &str,
            title: &str,
            payload: &ScorecardPayload,
            is_draft: bool,
            now: DateTime<Utc>,
        ) -> Result<SaveAck, StoreError> {
            self.check()?;
            self.inner.update_scorecard(id, title, payload, is_draft, now)
        }

        fn delete_scorecard(&self, id: &str) -> Result<(), StoreError> {
            self.check()?;
            self.inner.delete_scorecard(id)
        }

        fn list_scorecards(&self) -> Result<Vec<Scorecard>, StoreError> {
            self.check()?;
            self.inner.list_scorecards()
        }

        fn create_comment(
            &self,
            scorecard_id: &str,
            row_id: &RowId,
            author: &str,
            text: &str,
            now: DateTime<Utc>,
        ) -> Result<Comment, StoreError> {
            self.check()?;
            self.inner.create_comment(scorecard_id, row_id, author, text, now)
        }

        fn list_comments(&self, scorecard_id: &str) -> Result<Vec<Comment>, StoreError> {
            self.check()?;
            self.inner.list_comments(scorecard_id)
        }

        fn update_comment(
            &self,
            id: i64,
            text: &str,
            now: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.check()?;
            self.inner.update_comment(id, text, now)
        }

        fn delete_comment(&self, id: i64) -> Result<(), StoreError> {
            self.check()?;
            self.inner.delete_comment(id)
        }

        fn save_template(
            &self,
            template: &Template,
            now: DateTime<Utc>,
        ) -> Result<Template, StoreError> {
            self.check()?;
            self.inner.save_template(template, now)
        }

        fn list_templates(&self) -> Result<Vec<Template>, StoreError> {
            self.check()?;
            self.inner.list_templates()
        }

        fn delete_template(&self, id: i64) -> Result<(), StoreError> {
            self.check()?;
            self.inner.delete_template(id)
        }
    }

    #[test]
    fn test_autosave_migrates_local_draft_and_reconciles_id() {
        let mut s = session();
        let local_id = s.create_local_scorecard("Grocery", t(0)).unwrap();
        assert!(is_local_id(&local_id));

        // Baseline tick, then an edit.
        s.tick(t(0));
        s.set_cell(&RowId::Int(1), "buyer", "Alex", t(1)).unwrap();
        s.tick(t(1));
        assert_eq!(s.save_status(), SaveStatus::Unsaved);

        // Before the deadline nothing is saved.
        s.tick(t(2));
        assert!(s.scorecards()[0].is_local());

        // After the deadline the draft is created in the store and every
        // reference moves to the store id.
        s.tick(t(5));
        assert_eq!(s.save_status(), SaveStatus::Saved);
        let card = &s.scorecards()[0];
        assert!(!card.is_local());
        assert!(card.is_draft);
        assert_eq!(s.selected_id(), Some(card.id.as_str()));

        // And the save is a real store record.
        let stored = s.store.list_scorecards().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored[0].row(&RowId::Int(1)).unwrap().get("buyer"),
            Some(&CellValue::Text("Alex".into()))
        );

        // A later edit updates that record instead of creating another.
        s.set_cell(&RowId::Int(1), "buyer", "Blair", t(6)).unwrap();
        s.tick(t(6));
        s.tick(t(10));
        let stored = s.store.list_scorecards().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored[0].row(&RowId::Int(1)).unwrap().get("buyer"),
            Some(&CellValue::Text("Blair".into()))
        );
    }

    #[test]
    fn test_saved_ack_does_not_retrigger_save() {
        let mut s = session();
        s.create_local_scorecard("Grocery", t(0)).unwrap();
        s.tick(t(0));
        s.set_cell(&RowId::Int(1), "buyer", "Alex", t(1)).unwrap();
        s.tick(t(1));
        s.tick(t(5));
        assert_eq!(s.save_status(), SaveStatus::Saved);

        // Acknowledging the save bumped last_modified; that alone must not
        // look like a new edit.
        s.tick(t(6));
        s.tick(t(20));
        assert_eq!(s.save_status(), SaveStatus::Saved);
        assert_eq!(s.store.list_scorecards().unwrap().len(), 1);
    }

    #[test]
    fn test_ensure_persisted_is_idempotent() {
        let mut s = session();
        let local_id = s.create_local_scorecard("Grocery", t(0)).unwrap();

        let store_id = s.ensure_persisted(&local_id, t(1)).unwrap();
        assert!(!is_local_id(&store_id));
        let again = s.ensure_persisted(&store_id, t(2)).unwrap();
        assert_eq!(store_id, again);
        assert_eq!(s.store.list_scorecards().unwrap().len(), 1);
        assert_eq!(s.scorecards().len(), 1);
    }

    #[test]
    fn test_migration_preserves_draft_flag() {
        let mut s = session();
        let local_id = s.create_local_scorecard("Grocery", t(0)).unwrap();
        assert!(s.scorecards()[0].is_draft);

        // Gaining a store id is not finalization.
        let store_id = s.ensure_persisted(&local_id, t(1)).unwrap();
        let card = s.scorecards().iter().find(|c| c.id == store_id).unwrap();
        assert!(!card.is_local());
        assert!(card.is_draft);

        // Only the explicit setter flips it.
        s.set_draft(false, t(2)).unwrap();
        assert!(!s.selected_card().unwrap().is_draft);
    }

    #[test]
    fn test_local_draft_survives_in_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.json");

        {
            let mut s = EditorSession::new(
                SqliteStore::new(Database::open_in_memory().unwrap()),
                LocalCache::open(cache_path.clone()),
                admin(),
                Duration::seconds(3),
            );
            s.create_local_scorecard("Grocery", t(0)).unwrap();
        }

        // The draft never reached a store, yet a fresh cache sees it.
        let cache = LocalCache::open(cache_path);
        let raw = cache.get(SCORECARDS_KEY).unwrap();
        let cards: Vec<Scorecard> = serde_json::from_str(raw).unwrap();
        assert_eq!(cards.len(), 1);
        assert!(cards[0].is_local());
        assert_eq!(cards[0].title, "Grocery");
    }

    #[test]
    fn test_comment_on_local_draft_migrates_first() {
        let mut s = session();
        let local_id = s.create_local_scorecard("Grocery", t(0)).unwrap();

        let comment = s
            .add_comment(&local_id, &RowId::Int(1), "Check pricing", t(1))
            .unwrap();
        assert!(!is_local_id(&comment.scorecard_id));

        let store_id = s.scorecards()[0].id.clone();
        assert_eq!(comment.scorecard_id, store_id);
        assert_eq!(s.comments_for(&store_id, &RowId::Int(1)).len(), 1);
        // The old local key holds nothing.
        assert!(s.comments_for(&local_id, &RowId::Int(1)).is_empty());
    }

    #[test]
    fn test_empty_comment_rejected_without_migration() {
        let mut s = session();
        let local_id = s.create_local_scorecard("Grocery", t(0)).unwrap();
        let err = s
            .add_comment(&local_id, &RowId::Int(1), "   ", t(1))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        // Rejected before anything was persisted.
        assert!(s.scorecards()[0].is_local());
    }

    #[test]
    fn test_deleted_elsewhere_stops_retrying() {
        let mut s = session();
        let id = s.create_scorecard("Grocery", t(0)).unwrap();
        s.tick(t(0));

        // Someone else deletes it behind the session's back.
        s.store.delete_scorecard(&id).unwrap();

        s.set_cell(&RowId::Int(1), "buyer", "Alex", t(1)).unwrap();
        s.tick(t(1));
        s.tick(t(5));

        assert!(s.scorecards().is_empty());
        assert!(s.selected_id().is_none());
        assert!(s.last_error().is_some());
    }

    #[test]
    fn test_offline_defers_to_backup_then_reconnect_saves() {
        let store = FlakyStore::new();
        let mut s = EditorSession::new(
            store,
            LocalCache::in_memory(),
            admin(),
            Duration::seconds(3),
        );
        let id = s.create_scorecard("Grocery", t(0)).unwrap();
        s.tick(t(0));

        s.store.online.set(false);
        s.set_cell(&RowId::Int(1), "buyer", "Alex", t(1)).unwrap();
        s.tick(t(1));
        s.tick(t(5));
        assert_eq!(s.save_status(), SaveStatus::Offline);
        assert!(s.has_backup());

        s.store.online.set(true);
        s.set_online(true, t(6));
        s.tick(t(10));
        assert_eq!(s.save_status(), SaveStatus::Saved);
        assert!(!s.has_backup());

        let stored = s.store.inner.list_scorecards().unwrap();
        assert_eq!(stored[0].id, id);
        assert_eq!(
            stored[0].row(&RowId::Int(1)).unwrap().get("buyer"),
            Some(&CellValue::Text("Alex".into()))
        );
    }

    #[test]
    fn test_switching_documents_resets_pending_work() {
        let mut s = session();
        let a = s.create_scorecard("Grocery", t(0)).unwrap();
        s.tick(t(0));
        s.set_cell(&RowId::Int(1), "buyer", "Alex", t(1)).unwrap();

        let b = s.create_scorecard("Pet", t(2)).unwrap();
        assert_eq!(s.selected_id(), Some(b.as_str()));
        s.tick(t(2));
        s.tick(t(30));
        assert_eq!(s.save_status(), SaveStatus::Saved);

        // The abandoned edit on the first scorecard never reached the store.
        let stored = s.store.list_scorecards().unwrap();
        let first = stored.iter().find(|c| c.id == a).unwrap();
        assert_eq!(
            first.row(&RowId::Int(1)).unwrap().get("buyer"),
            Some(&CellValue::empty())
        );
    }

    #[test]
    fn test_duplicate_title_rejected() {
        let mut s = session();
        s.create_scorecard("Grocery", t(0)).unwrap();
        let err = s.create_local_scorecard("  grocery ", t(1)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_vendor_cannot_edit_but_can_comment() {
        let mut s = session();
        s.create_scorecard("Grocery", t(0)).unwrap();
        let id = s.scorecards()[0].id.clone();

        s.user = CurrentUser {
            id: "u2".into(),
            role: UserRole::Vendor,
            name: "Sam".into(),
        };
        let err = s
            .set_cell(&RowId::Int(1), "buyer", "Alex", t(1))
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));

        s.add_comment(&id, &RowId::Int(1), "Looks good", t(2)).unwrap();
        assert_eq!(s.comments_for(&id, &RowId::Int(1)).len(), 1);
    }

    #[test]
    fn test_blank_title_falls_back_to_untitled() {
        let mut s = session();
        s.create_scorecard("Grocery", t(0)).unwrap();
        s.set_title("   ", t(1)).unwrap();
        assert_eq!(s.selected_card().unwrap().title, crate::models::UNTITLED);
    }

    #[test]
    fn test_anonymous_cannot_touch_comments() {
        let mut s = session();
        let id = s.create_scorecard("Grocery", t(0)).unwrap();
        let comment = s.add_comment(&id, &RowId::Int(1), "note", t(1)).unwrap();

        s.user = CurrentUser {
            id: String::new(),
            role: UserRole::Anonymous,
            name: String::new(),
        };
        let err = s
            .update_comment(&id, comment.id, "edited", t(2))
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
        let err = s.delete_comment(&id, comment.id).unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));

        let kept = s.comments_for(&id, &RowId::Int(1));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "note");
    }

    #[test]
    fn test_sort_cycle_is_view_only() {
        let mut s = session();
        s.create_scorecard("Grocery", t(0)).unwrap();
        s.set_cell(&RowId::Int(1), "buyer", "Zoe", t(1)).unwrap();
        s.set_cell(&RowId::Int(2), "buyer", "Alex", t(1)).unwrap();

        s.toggle_sort("buyer");
        let asc: Vec<_> = s.visible_rows().iter().map(|r| r.id.clone()).collect();
        assert_eq!(asc, vec![RowId::Int(2), RowId::Int(1)]);

        s.toggle_sort("buyer");
        let desc: Vec<_> = s.visible_rows().iter().map(|r| r.id.clone()).collect();
        assert_eq!(desc, vec![RowId::Int(1), RowId::Int(2)]);

        s.toggle_sort("buyer");
        assert!(s.sort_state().is_none());

        // Storage order was never touched.
        assert_eq!(s.selected_card().unwrap().rows[0].id, RowId::Int(1));
    }

    #[test]
    fn test_sort_puts_empty_cells_last() {
        let mut s = session();
        s.create_scorecard("Grocery", t(0)).unwrap();
        s.set_cell(&RowId::Int(2), "buyer", "Alex", t(1)).unwrap();

        s.toggle_sort("buyer");
        let asc: Vec<_> = s.visible_rows().iter().map(|r| r.id.clone()).collect();
        assert_eq!(asc, vec![RowId::Int(2), RowId::Int(1)]);

        s.toggle_sort("buyer");
        let desc: Vec<_> = s.visible_rows().iter().map(|r| r.id.clone()).collect();
        assert_eq!(desc, vec![RowId::Int(2), RowId::Int(1)]);
    }

    #[test]
    fn test_restore_backup_into_existing_scorecard() {
        let store = FlakyStore::new();
        let mut s = EditorSession::new(
            store,
            LocalCache::in_memory(),
            admin(),
            Duration::seconds(3),
        );
        let id = s.create_scorecard("Grocery", t(0)).unwrap();
        s.tick(t(0));

        s.store.online.set(false);
        s.set_cell(&RowId::Int(1), "buyer", "Alex", t(1)).unwrap();
        s.tick(t(1));
        s.tick(t(5));
        assert!(s.has_backup());

        // Simulate a fresh session: revert the in-memory edit.
        s.set_cell(&RowId::Int(1), "buyer", "", t(6)).unwrap();

        assert!(s.restore_backup(t(7)).unwrap());
        assert!(!s.has_backup());
        let card = s.scorecards().iter().find(|c| c.id == id).unwrap();
        assert_eq!(
            card.row(&RowId::Int(1)).unwrap().get("buyer"),
            Some(&CellValue::Text("Alex".into()))
        );
    }

    #[test]
    fn test_refresh_offline_serves_cached_list() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.json");

        let store = FlakyStore::new();
        let mut s = EditorSession::new(
            store,
            LocalCache::open(cache_path.clone()),
            admin(),
            Duration::seconds(3),
        );
        s.create_scorecard("Grocery", t(0)).unwrap();
        s.refresh(t(1)).unwrap();

        // New session, store down: the cached list still loads.
        let store = FlakyStore::new();
        store.online.set(false);
        let mut s2 = EditorSession::new(
            store,
            LocalCache::open(cache_path),
            admin(),
            Duration::seconds(3),
        );
        s2.refresh(t(2)).unwrap();
        assert_eq!(s2.scorecards().len(), 1);
        assert_eq!(s2.scorecards()[0].title, "Grocery");
        assert!(!s2.is_online());
    }

    #[test]
    fn test_template_round_trip_through_session() {
        let mut s = session();
        s.create_scorecard("Grocery", t(0)).unwrap();
        s.add_column("Natural Co-op", t(1)).unwrap();
        s.save_template("co-op layout", false, t(2)).unwrap();

        s.create_scorecard("Pet", t(3)).unwrap();
        s.apply_template("co-op layout", t(4)).unwrap();
        let card = s.selected_card().unwrap();
        assert!(card.column("natural_co-op").is_some() || card.column("natural_coop").is_some());
        assert!(card.rows_cover_columns());
    }

    #[test]
    fn test_master_scorecard_over_session() {
        let mut s = session();
        s.create_scorecard("Grocery", t(0)).unwrap();
        let key = s.add_column("Natural Co-op", t(1)).unwrap();
        s.set_cell(&RowId::Int(1), &key, "Authorized", t(2)).unwrap();

        let master = s.master_scorecard();
        assert_eq!(master.scorecard_count, 1);
        assert_eq!(master.summaries[0].columns[0].penetration_pct, 50);
    }
}
