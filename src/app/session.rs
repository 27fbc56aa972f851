// EnrolSift - app/session.rs
//
// Filter session host: owns the loaded records and the current filter
// state, and keeps the derived outputs in step with them.
//
// - Every input change (records or state) recomputes the outcome once and
//   replaces the previous one; the result sink then receives the filtered
//   subset and the active facet count.
// - Facet options are derived from the full record set only, so they are
//   recomputed when records change, never when the state changes.
// - The saved configuration cache is replaced wholesale by each snapshot the
//   repository pushes.

use crate::app::repository::{ConfigRepository, SavedConfiguration};
use crate::app::store::Subscription;
use crate::core::filter::{self, FilterOutcome, FilterState};
use crate::core::model::Record;
use crate::core::options::{self, FilterOptions};
use crate::util::constants::DEFAULT_MAX_SEARCH_TERM_CHARS;
use crate::util::error::{RecordSourceError, RepositoryError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Exported collections are either a JSON array of records or an object
/// keyed by record id.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordCollection {
    List(Vec<Record>),
    Keyed(BTreeMap<String, Record>),
}

/// Read an exported record collection from disk.
pub fn load_records(path: &Path) -> Result<Vec<Record>, RecordSourceError> {
    let content = std::fs::read(path).map_err(|e| RecordSourceError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let records = match serde_json::from_slice(&content) {
        Ok(RecordCollection::List(records)) => records,
        Ok(RecordCollection::Keyed(records)) => records.into_values().collect(),
        Err(_) => {
            // Re-parse as a plain list so the error names the offending field.
            let source = serde_json::from_slice::<Vec<Record>>(&content)
                .err()
                .unwrap_or_else(|| serde::de::Error::custom("unrecognised record collection"));
            return Err(RecordSourceError::Json {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    tracing::info!(path = %path.display(), records = records.len(), "Records loaded");
    Ok(records)
}

/// Receives `(filtered records, active facet count)` after every recompute.
pub type ResultSink = Box<dyn FnMut(&[&Record], usize) + Send>;

/// Records, the current filter state and everything derived from them.
pub struct FilterSession {
    records: Vec<Record>,
    state: FilterState,
    outcome: FilterOutcome,
    options: FilterOptions,

    /// Longer search terms are truncated on entry.
    max_search_chars: usize,

    sink: Option<ResultSink>,

    saved: Arc<Mutex<Vec<SavedConfiguration>>>,
    subscription: Option<Subscription>,
}

impl FilterSession {
    pub fn new(records: Vec<Record>) -> Self {
        let state = FilterState::default();
        let outcome = filter::apply_filters(&records, &state);
        let options = options::extract_options(&records);
        Self {
            records,
            state,
            outcome,
            options,
            max_search_chars: DEFAULT_MAX_SEARCH_TERM_CHARS,
            sink: None,
            saved: Arc::new(Mutex::new(Vec::new())),
            subscription: None,
        }
    }

    /// Set the search term length limit (from `[filters] max_search_term_chars`).
    #[must_use]
    pub fn with_max_search_chars(mut self, max: usize) -> Self {
        self.max_search_chars = max;
        let state = self.state.clone();
        self.set_state(state);
        self
    }

    /// Register the result sink. It is called immediately with the current
    /// outcome, then after every recompute.
    pub fn set_sink(&mut self, sink: ResultSink) {
        self.sink = Some(sink);
        self.emit();
    }

    /// Replace the record collection. Options and outcome are recomputed.
    pub fn set_records(&mut self, records: Vec<Record>) {
        self.records = records;
        self.options = options::extract_options(&self.records);
        self.recompute();
    }

    /// Replace the filter state. An identical state is a no-op.
    pub fn set_state(&mut self, state: FilterState) {
        let state = self.clamp_search(state);
        if state == self.state {
            return;
        }
        self.state = state;
        self.recompute();
    }

    /// Derive a new state from the current one.
    ///
    /// ```ignore
    /// session.update(|s| s.with_toggled(Categorical::Course, "MATH30-1"));
    /// ```
    pub fn update(&mut self, change: impl FnOnce(FilterState) -> FilterState) {
        let next = change(self.state.clone());
        self.set_state(next);
    }

    /// Clear every facet.
    pub fn reset(&mut self) {
        self.set_state(FilterState::default());
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn outcome(&self) -> &FilterOutcome {
        &self.outcome
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// The records passing the current state, in input order.
    pub fn filtered(&self) -> Vec<&Record> {
        self.outcome.select(&self.records)
    }

    pub fn active_count(&self) -> usize {
        self.outcome.active_count
    }

    // -------------------------------------------------------------------------
    // Saved configurations
    // -------------------------------------------------------------------------

    /// Save the current state under `name` for `owner_id`.
    pub fn save_current(
        &self,
        repo: &ConfigRepository,
        owner_id: &str,
        name: &str,
    ) -> Result<String, RepositoryError> {
        repo.save(owner_id, name, &self.state)
    }

    /// Apply a saved configuration's state.
    pub fn load_saved(&mut self, repo: &ConfigRepository, config: &SavedConfiguration) {
        tracing::info!(
            config_id = %config.id,
            owner = %config.owner,
            "Applying saved configuration"
        );
        self.set_state(repo.load(config));
    }

    /// Keep the saved configuration cache in step with `owner_id`'s
    /// configurations. Replaces any previous watch.
    pub fn watch_saved(
        &mut self,
        repo: &ConfigRepository,
        owner_id: &str,
    ) -> Result<(), RepositoryError> {
        self.stop_watching();
        let cache = Arc::clone(&self.saved);
        let subscription = repo.subscribe(owner_id, move |configs| {
            *lock(&cache) = configs;
        })?;
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Current cache contents, newest first.
    pub fn saved_configurations(&self) -> Vec<SavedConfiguration> {
        lock(&self.saved).clone()
    }

    pub fn is_watching(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Cancel the saved configuration watch. The cache keeps its last
    /// snapshot.
    pub fn stop_watching(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn clamp_search(&self, mut state: FilterState) -> FilterState {
        let length = state.search_term.chars().count();
        if length > self.max_search_chars {
            tracing::warn!(
                length,
                max = self.max_search_chars,
                "Search term truncated"
            );
            state.search_term = state
                .search_term
                .chars()
                .take(self.max_search_chars)
                .collect();
        }
        state
    }

    fn recompute(&mut self) {
        self.outcome = filter::apply_filters(&self.records, &self.state);
        self.emit();
    }

    fn emit(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            let filtered = self.outcome.select(&self.records);
            sink(&filtered, self.outcome.active_count);
        }
    }
}

impl Drop for FilterSession {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

/// A poisoned cache still holds the last complete snapshot.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::repository::StoreLayout;
    use crate::app::store::MemoryBackend;
    use crate::core::filter::{Categorical, Presence, PresenceField};
    use tempfile::TempDir;

    fn record(name: &str, course: &str, grade: Option<&str>) -> Record {
        Record {
            student_name: Some(name.to_string()),
            course_code: Some(course.to_string()),
            value: grade.map(str::to_string),
            ..Default::default()
        }
    }

    fn sample() -> Vec<Record> {
        vec![
            record("Ada Smith", "MATH30-1", Some("85")),
            record("Ben Ray", "ELA30-1", None),
            record("Cara Lee", "MATH30-1", Some("-")),
        ]
    }

    fn recording_sink() -> (Arc<Mutex<Vec<(usize, usize)>>>, ResultSink) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink_calls = Arc::clone(&calls);
        let sink: ResultSink = Box::new(move |filtered, active| {
            sink_calls.lock().unwrap().push((filtered.len(), active));
        });
        (calls, sink)
    }

    #[test]
    fn test_sink_receives_every_recompute() {
        let mut session = FilterSession::new(sample());
        let (calls, sink) = recording_sink();
        session.set_sink(sink);
        session.update(|s| s.with_selection(Categorical::Course, ["MATH30-1"]));
        session.update(|s| s.with_presence(PresenceField::Grade, Presence::Missing));
        session.reset();
        assert_eq!(
            *calls.lock().unwrap(),
            vec![(3, 0), (2, 1), (1, 2), (3, 0)]
        );
    }

    #[test]
    fn test_identical_state_does_not_recompute() {
        let mut session = FilterSession::new(sample());
        let (calls, sink) = recording_sink();
        session.set_sink(sink);
        session.set_state(FilterState::default());
        session.update(|s| s);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_options_ignore_filter_state() {
        let mut session = FilterSession::new(sample());
        let before = session.options().clone();
        session.update(|s| s.with_search("ada"));
        assert_eq!(session.filtered().len(), 1);
        assert_eq!(session.options(), &before);
        assert_eq!(session.options().facet(Categorical::Course).count("MATH30-1"), 2);
    }

    #[test]
    fn test_set_records_refreshes_options_and_outcome() {
        let mut session = FilterSession::new(Vec::new());
        session.update(|s| s.with_selection(Categorical::Course, ["ELA30-1"]));
        assert!(session.filtered().is_empty());
        session.set_records(sample());
        assert_eq!(session.filtered().len(), 1);
        assert_eq!(session.options().aggregates.total_records, 3);
    }

    #[test]
    fn test_search_term_truncated() {
        let mut session = FilterSession::new(sample()).with_max_search_chars(3);
        session.update(|s| s.with_search("smithers"));
        assert_eq!(session.state().search_term, "smi");
        assert_eq!(session.filtered().len(), 1);
    }

    #[test]
    fn test_watch_save_and_load() {
        let repo = ConfigRepository::new(Arc::new(MemoryBackend::new()), StoreLayout::default());
        let mut session = FilterSession::new(sample());
        session.watch_saved(&repo, "u1").unwrap();
        assert!(session.is_watching());
        assert!(session.saved_configurations().is_empty());

        session.update(|s| s.with_selection(Categorical::Course, ["ELA30-1"]));
        session.save_current(&repo, "u1", "English").unwrap();
        let saved = session.saved_configurations();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "English");

        session.reset();
        assert_eq!(session.filtered().len(), 3);
        session.load_saved(&repo, &saved[0]);
        assert_eq!(session.filtered().len(), 1);
        assert_eq!(session.active_count(), 1);

        session.stop_watching();
        assert!(!session.is_watching());
        session.save_current(&repo, "u1", "Later").unwrap();
        assert_eq!(session.saved_configurations().len(), 1);
    }

    #[test]
    fn test_load_records_accepts_list_and_keyed_object() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("list.json");
        std::fs::write(&list, r#"[{"studentName": "Ada", "value": 85}]"#).unwrap();
        let records = load_records(&list).unwrap();
        assert_eq!(records[0].value.as_deref(), Some("85"));

        let keyed = dir.path().join("keyed.json");
        std::fs::write(&keyed, r#"{"r1": {"studentName": "Ada"}, "r2": {"studentName": "Ben"}}"#)
            .unwrap();
        assert_eq!(load_records(&keyed).unwrap().len(), 2);
    }

    #[test]
    fn test_load_records_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_records(&dir.path().join("absent.json")),
            Err(RecordSourceError::Io { .. })
        ));
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "42").unwrap();
        assert!(matches!(load_records(&bad), Err(RecordSourceError::Json { .. })));
    }
}
