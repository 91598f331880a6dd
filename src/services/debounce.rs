use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;

/// Debounced change tracker for a serializable value.
///
/// The first value observed after construction (or after [`reset`]) becomes
/// the baseline and schedules nothing; loading a document is not an edit.
/// Every later observation restarts the countdown, so a burst of edits
/// collapses into one save once the value stops changing for the window.
/// Dirtiness is decided by comparing serialized forms, so an edit that is
/// undone before the deadline cancels the save.
///
/// [`reset`]: Debouncer::reset
pub struct Debouncer<V> {
    window: Duration,
    baseline: Option<String>,
    latest: Option<V>,
    latest_json: Option<String>,
    deadline: Option<DateTime<Utc>>,
}

impl<V: Serialize + Clone> Debouncer<V> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            baseline: None,
            latest: None,
            latest_json: None,
            deadline: None,
        }
    }

    /// Observe the current value. Call on every tick.
    pub fn observe(&mut self, value: &V, now: DateTime<Utc>) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Skipping unserializable value: {}", e);
                return;
            }
        };

        if self.baseline.is_none() {
            self.baseline = Some(json);
            return;
        }

        let changed = self.latest_json.as_ref() != Some(&json);
        let dirty = self.baseline.as_ref() != Some(&json);

        self.latest = Some(value.clone());
        self.latest_json = Some(json);

        if !dirty {
            self.deadline = None;
        } else if changed {
            self.deadline = Some(now + self.window);
        }
    }

    /// True when the observed value differs from the last committed one.
    pub fn is_dirty(&self) -> bool {
        match (&self.latest_json, &self.baseline) {
            (Some(latest), baseline) => baseline.as_ref() != Some(latest),
            (None, _) => false,
        }
    }

    /// True when a save is scheduled but its deadline has not passed yet.
    pub fn is_counting_down(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns the value due for saving once the countdown has elapsed.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<V> {
        let deadline = self.deadline?;
        if now < deadline || !self.is_dirty() {
            return None;
        }
        self.deadline = None;
        self.latest.clone()
    }

    /// Returns the dirty value immediately, skipping the countdown.
    pub fn force(&mut self) -> Option<V> {
        if !self.is_dirty() {
            return None;
        }
        self.deadline = None;
        self.latest.clone()
    }

    /// Serialized form of the latest dirty value, for the offline backup.
    pub fn latest_json(&self) -> Option<&str> {
        self.latest_json.as_deref()
    }

    /// Mark the latest value as committed. It becomes the new baseline.
    pub fn committed(&mut self) {
        self.baseline = self.latest_json.clone();
        self.deadline = None;
    }

    /// A save attempt failed. The value stays dirty but nothing is
    /// scheduled until the next edit or an explicit [`rearm`].
    ///
    /// [`rearm`]: Debouncer::rearm
    pub fn save_failed(&mut self) {
        self.deadline = None;
    }

    /// Restart the countdown for a still-dirty value (used on reconnect).
    pub fn rearm(&mut self, now: DateTime<Utc>) {
        if self.is_dirty() {
            self.deadline = Some(now + self.window);
        }
    }

    /// Adopt `value` as the committed baseline without scheduling anything.
    /// Used when the value's identity changes outside the edit path.
    pub fn set_baseline(&mut self, value: &V) {
        match serde_json::to_string(value) {
            Ok(json) => {
                self.baseline = Some(json.clone());
                self.latest = Some(value.clone());
                self.latest_json = Some(json);
                self.deadline = None;
            }
            Err(e) => warn!("Skipping unserializable baseline: {}", e),
        }
    }

    /// Forget everything; the next observation becomes the new baseline.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.latest = None;
        self.latest_json = None;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn debouncer() -> Debouncer<String> {
        Debouncer::new(Duration::seconds(3))
    }

    #[test]
    fn test_first_observation_schedules_nothing() {
        let mut d = debouncer();
        d.observe(&"loaded".to_string(), t(0));
        assert!(!d.is_dirty());
        assert!(d.poll(t(100)).is_none());
    }

    #[test]
    fn test_burst_of_edits_collapses_into_one_save() {
        let mut d = debouncer();
        d.observe(&"v0".to_string(), t(0));
        d.observe(&"v1".to_string(), t(1));
        d.observe(&"v2".to_string(), t(2));
        d.observe(&"v3".to_string(), t(3));

        // Countdown restarted at t=3, so nothing is due before t=6.
        assert!(d.poll(t(5)).is_none());
        assert_eq!(d.poll(t(6)), Some("v3".to_string()));
        assert!(d.poll(t(10)).is_none());
    }

    #[test]
    fn test_edit_undone_before_deadline_cancels_save() {
        let mut d = debouncer();
        d.observe(&"v0".to_string(), t(0));
        d.observe(&"v1".to_string(), t(1));
        d.observe(&"v0".to_string(), t(2));

        assert!(!d.is_dirty());
        assert!(d.poll(t(10)).is_none());
    }

    #[test]
    fn test_commit_moves_baseline() {
        let mut d = debouncer();
        d.observe(&"v0".to_string(), t(0));
        d.observe(&"v1".to_string(), t(1));
        assert_eq!(d.poll(t(4)), Some("v1".to_string()));
        d.committed();
        assert!(!d.is_dirty());

        // Same value again is not an edit.
        d.observe(&"v1".to_string(), t(5));
        assert!(d.poll(t(20)).is_none());
    }

    #[test]
    fn test_failed_save_stays_dirty_until_rearmed() {
        let mut d = debouncer();
        d.observe(&"v0".to_string(), t(0));
        d.observe(&"v1".to_string(), t(1));
        assert!(d.poll(t(4)).is_some());
        d.save_failed();

        assert!(d.is_dirty());
        assert!(d.poll(t(20)).is_none());

        d.rearm(t(21));
        assert_eq!(d.poll(t(24)), Some("v1".to_string()));
    }

    #[test]
    fn test_force_skips_countdown() {
        let mut d = debouncer();
        d.observe(&"v0".to_string(), t(0));
        assert!(d.force().is_none());

        d.observe(&"v1".to_string(), t(1));
        assert_eq!(d.force(), Some("v1".to_string()));
    }

    #[test]
    fn test_reset_takes_new_baseline() {
        let mut d = debouncer();
        d.observe(&"doc-a".to_string(), t(0));
        d.observe(&"doc-a-edited".to_string(), t(1));
        d.reset();

        // Switching documents: the new document's first value is baseline.
        d.observe(&"doc-b".to_string(), t(2));
        assert!(!d.is_dirty());
        assert!(d.poll(t(30)).is_none());
    }
}
