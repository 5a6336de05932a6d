use crate::application::NowProvider;
use crate::domain::models::{stored_precision, AppState, EntryDraft, ScheduleEntry, ViewMode};
use crate::infrastructure::document_mapper::{decode_document, encode_document};
use crate::infrastructure::document_store::DocumentStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::retry::{retry_with_backoff, RetryPolicy};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    Loaded,
    NotFound,
    Malformed,
    Unavailable,
}

/// Handle to a background document write. Dropping it leaves the write running.
#[derive(Debug)]
pub struct PendingSave {
    handle: Option<JoinHandle<bool>>,
}

impl PendingSave {
    fn skipped() -> Self {
        Self { handle: None }
    }

    /// Resolves to `true` once the document was written.
    pub async fn wait(self) -> bool {
        let Some(handle) = self.handle else {
            return false;
        };
        match handle.await {
            Ok(saved) => saved,
            Err(error) => {
                warn!(%error, "document save task did not complete");
                false
            }
        }
    }
}

/// Sole owner of the entry collection and view state.
pub struct EntityStore<S>
where
    S: DocumentStore + 'static,
{
    state: AppState,
    document_store: Arc<S>,
    retry_policy: RetryPolicy,
    timezone: Tz,
    now_provider: NowProvider,
}

impl<S> EntityStore<S>
where
    S: DocumentStore + 'static,
{
    pub fn new(document_store: Arc<S>, timezone: Tz) -> Self {
        let now_provider: NowProvider = Arc::new(Utc::now);
        let today = now_provider().with_timezone(&timezone).date_naive();
        Self {
            state: AppState::empty(ViewMode::default(), today),
            document_store,
            retry_policy: RetryPolicy::default(),
            timezone,
            now_provider,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self.state.view.reference_date = self.today();
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.timezone).date_naive()
    }

    pub fn select_view(&mut self, mode: ViewMode) {
        self.state.view.select(mode);
    }

    pub fn change_date(&mut self, offset: i32) -> bool {
        self.state.view.change_date(offset)
    }

    /// Replaces the in-memory state with the stored document. A missing,
    /// malformed or unreachable document resets to an empty state instead of
    /// failing.
    pub async fn load(&mut self) -> LoadOutcome {
        let fetched = retry_with_backoff(
            &self.retry_policy,
            "document_fetch",
            InfraError::is_transient,
            || self.document_store.fetch(),
        )
        .await;

        let mode = self.state.view.mode;
        let today = self.today();
        let outcome = match fetched {
            Ok(Some(value)) => match decode_document(value, mode, today, &self.timezone) {
                Ok(state) => {
                    info!(
                        entries = state.entries.len(),
                        last_id = state.last_id,
                        view = state.view.mode.as_str(),
                        "document loaded"
                    );
                    self.state = state;
                    return LoadOutcome::Loaded;
                }
                Err(error) => {
                    warn!(%error, "discarding malformed document");
                    LoadOutcome::Malformed
                }
            },
            Ok(None) => {
                info!("no stored document, starting empty");
                LoadOutcome::NotFound
            }
            Err(error @ InfraError::MalformedDocument(_)) => {
                warn!(%error, "discarding unreadable document");
                LoadOutcome::Malformed
            }
            Err(error) => {
                warn!(%error, "document store unavailable, starting empty");
                LoadOutcome::Unavailable
            }
        };
        self.state = AppState::empty(mode, today);
        outcome
    }

    /// Inserts a new entry or replaces the one whose id matches `draft.id`.
    pub fn upsert(&mut self, draft: EntryDraft) -> Result<(ScheduleEntry, PendingSave), InfraError> {
        let existing_index = draft
            .id
            .and_then(|id| self.state.entries.iter().position(|entry| entry.id == id));
        let id = match existing_index {
            Some(index) => self.state.entries[index].id,
            None => self
                .state
                .last_id
                .checked_add(1)
                .ok_or_else(|| InfraError::Validation("entry id space exhausted".to_string()))?,
        };

        let entry = draft.into_entry(id, existing_index.map(|index| &self.state.entries[index]));
        entry.validate().map_err(InfraError::Validation)?;

        match existing_index {
            Some(index) => self.state.entries[index] = entry.clone(),
            None => {
                self.state.last_id = id;
                self.state.entries.push(entry.clone());
            }
        }
        info!(
            id = entry.id,
            entry_type = entry.entry_type.as_str(),
            created = existing_index.is_none(),
            "entry saved"
        );
        Ok((entry, self.save()))
    }

    /// Deletes an entry. Callers confirm with the user first. Returns `None`
    /// when no entry has `id`.
    pub fn remove(&mut self, id: u64) -> Option<(ScheduleEntry, PendingSave)> {
        let index = self.state.entries.iter().position(|entry| entry.id == id)?;
        let removed = self.state.entries.remove(index);
        info!(id, "entry removed");
        Some((removed, self.save()))
    }

    /// Flips a task between pending and completed. Schedules and unknown ids
    /// are left untouched and yield `None`.
    pub fn toggle_task_completion(&mut self, id: u64) -> Option<(ScheduleEntry, PendingSave)> {
        let now = stored_precision(self.now());
        let entry = self.state.entries.iter_mut().find(|entry| entry.id == id)?;
        if !entry.is_task() {
            debug!(id, "completion toggle ignored for schedule");
            return None;
        }
        entry.completed = !entry.completed;
        entry.actual_end = entry.completed.then_some(now);
        let updated = entry.clone();
        info!(id, completed = updated.completed, "task completion toggled");
        Some((updated, self.save()))
    }

    /// Writes a snapshot of the current state in the background.
    pub fn save(&self) -> PendingSave {
        let document = encode_document(&self.state, &self.timezone);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available, document save skipped");
            return PendingSave::skipped();
        };

        let document_store = Arc::clone(&self.document_store);
        let retry_policy = self.retry_policy.clone();
        let handle = runtime.spawn(async move {
            let result = retry_with_backoff(
                &retry_policy,
                "document_store",
                InfraError::is_transient,
                || document_store.store(&document),
            )
            .await;
            match result {
                Ok(()) => {
                    info!(entries = document.schedules.len(), "document saved");
                    true
                }
                Err(error) => {
                    warn!(%error, "document save abandoned");
                    false
                }
            }
        });
        PendingSave {
            handle: Some(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EntryType, Tag};
    use crate::infrastructure::document_mapper::PersistedDocument;
    use crate::infrastructure::document_store::{InMemoryDocumentStore, ReqwestJsonBinStore};
    use async_trait::async_trait;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FlakyDocumentStore {
        inner: InMemoryDocumentStore,
        store_failures: AtomicUsize,
        fetch_always_fails: bool,
        fetch_calls: AtomicUsize,
        store_calls: AtomicUsize,
    }

    impl FlakyDocumentStore {
        fn failing_stores(count: usize) -> Self {
            Self {
                store_failures: AtomicUsize::new(count),
                ..Self::default()
            }
        }

        fn unreachable() -> Self {
            Self {
                fetch_always_fails: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FlakyDocumentStore {
        async fn fetch(&self) -> Result<Option<serde_json::Value>, InfraError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fetch_always_fails {
                return Err(InfraError::Network("connection refused".to_string()));
            }
            self.inner.fetch().await
        }

        async fn store(&self, document: &PersistedDocument) -> Result<(), InfraError> {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.store_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.store_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(InfraError::HttpStatus {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            self.inner.store(document).await
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
        }
    }

    fn store_with<S: DocumentStore + 'static>(document_store: Arc<S>) -> EntityStore<S> {
        EntityStore::new(document_store, chrono_tz::Asia::Tokyo)
            .with_retry_policy(fast_retry())
            .with_now_provider(Arc::new(|| fixed_time("2026-02-16T03:00:00Z")))
    }

    fn draft(title: &str, entry_type: EntryType) -> EntryDraft {
        EntryDraft {
            id: None,
            entry_type,
            title: title.to_string(),
            start: fixed_time("2026-02-16T01:00:00Z"),
            end: fixed_time("2026-02-16T02:00:00Z"),
            location: "Shin-Urayasu".to_string(),
            notes: String::new(),
            tag: Tag::Yellow,
        }
    }

    #[tokio::test]
    async fn upsert_assigns_next_id_and_persists() {
        let document_store = Arc::new(InMemoryDocumentStore::default());
        let mut store = store_with(Arc::clone(&document_store));

        let (first, pending) = store.upsert(draft("Dentist", EntryType::Schedule)).expect("insert");
        assert!(pending.wait().await);
        let (second, pending) = store.upsert(draft("Report", EntryType::Task)).expect("insert");
        assert!(pending.wait().await);

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(store.state().last_id, 2);
        assert!(second.location.is_empty());
        assert_eq!(document_store.write_count(), 2);
        let stored = document_store.document().expect("read").expect("stored");
        assert_eq!(stored["lastId"], 2);
        assert_eq!(stored["schedules"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn upsert_with_existing_id_replaces_in_place() {
        let mut store = store_with(Arc::new(InMemoryDocumentStore::default()));
        let (created, _) = store.upsert(draft("Dentist", EntryType::Schedule)).expect("insert");
        store.upsert(draft("Gym", EntryType::Schedule)).expect("insert");

        let mut edit = draft("Dentist (moved)", EntryType::Schedule);
        edit.id = Some(created.id);
        let (updated, pending) = store.upsert(edit).expect("update");
        pending.wait().await;

        assert_eq!(updated.id, created.id);
        assert_eq!(store.state().last_id, 2);
        assert_eq!(store.state().entries.len(), 2);
        assert_eq!(store.state().entries[0].title, "Dentist (moved)");
    }

    #[tokio::test]
    async fn upsert_with_unknown_id_appends_with_fresh_id() {
        let mut store = store_with(Arc::new(InMemoryDocumentStore::default()));
        let mut stray = draft("Imported", EntryType::Schedule);
        stray.id = Some(42);

        let (entry, _) = store.upsert(stray).expect("insert");
        assert_eq!(entry.id, 1);
        assert_eq!(store.state().last_id, 1);
    }

    #[tokio::test]
    async fn invalid_draft_is_rejected_without_side_effects() {
        let document_store = Arc::new(InMemoryDocumentStore::default());
        let mut store = store_with(Arc::clone(&document_store));

        let mut reversed = draft("Dentist", EntryType::Schedule);
        reversed.end = fixed_time("2026-02-16T00:00:00Z");
        assert!(matches!(store.upsert(reversed), Err(InfraError::Validation(_))));
        assert!(matches!(
            store.upsert(draft("   ", EntryType::Task)),
            Err(InfraError::Validation(_))
        ));

        assert!(store.state().entries.is_empty());
        assert_eq!(store.state().last_id, 0);
        assert_eq!(document_store.write_count(), 0);
    }

    #[tokio::test]
    async fn toggling_twice_restores_task_and_ignores_schedules() {
        let mut store = store_with(Arc::new(InMemoryDocumentStore::default()));
        let (task, _) = store.upsert(draft("Report", EntryType::Task)).expect("insert task");
        let (schedule, _) = store
            .upsert(draft("Dentist", EntryType::Schedule))
            .expect("insert schedule");

        let (done, _) = store.toggle_task_completion(task.id).expect("toggle task");
        assert!(done.completed);
        assert_eq!(done.actual_end, Some(fixed_time("2026-02-16T03:00:00Z")));

        let (reopened, _) = store.toggle_task_completion(task.id).expect("toggle back");
        assert_eq!(reopened, task);

        assert!(store.toggle_task_completion(schedule.id).is_none());
        assert!(store.toggle_task_completion(99).is_none());
        assert_eq!(store.state().entry(schedule.id), Some(&schedule));
    }

    #[tokio::test]
    async fn removed_ids_are_never_reused() {
        let mut store = store_with(Arc::new(InMemoryDocumentStore::default()));
        store.upsert(draft("One", EntryType::Task)).expect("insert");
        let (second, _) = store.upsert(draft("Two", EntryType::Task)).expect("insert");

        let (removed, pending) = store.remove(second.id).expect("remove");
        pending.wait().await;
        assert_eq!(removed.id, 2);
        assert!(store.remove(second.id).is_none());

        let (third, _) = store.upsert(draft("Three", EntryType::Task)).expect("insert");
        assert_eq!(third.id, 3);
        assert_eq!(store.state().entries.len(), 2);
    }

    #[tokio::test]
    async fn saved_state_loads_back_identically() {
        let document_store = Arc::new(InMemoryDocumentStore::default());
        let mut writer = store_with(Arc::clone(&document_store));
        let (_, pending) = writer.upsert(draft("Dentist", EntryType::Schedule)).expect("insert");
        pending.wait().await;
        let (task, pending) = writer.upsert(draft("Report", EntryType::Task)).expect("insert");
        pending.wait().await;
        let (_, pending) = writer.toggle_task_completion(task.id).expect("complete");
        pending.wait().await;
        writer.select_view(ViewMode::Week);
        assert!(writer.change_date(1));
        assert!(writer.save().wait().await);

        let mut reader = store_with(Arc::clone(&document_store));
        assert_eq!(reader.load().await, LoadOutcome::Loaded);

        assert_eq!(reader.state(), writer.state());
    }

    #[tokio::test]
    async fn missing_document_loads_as_empty_state() {
        let mut fresh = store_with(Arc::new(InMemoryDocumentStore::default()));
        assert_eq!(fresh.load().await, LoadOutcome::NotFound);
        assert!(fresh.state().entries.is_empty());
        assert_eq!(fresh.state().last_id, 0);
        assert_eq!(
            fresh.state().view.reference_date,
            NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date")
        );
    }

    #[tokio::test]
    async fn malformed_document_is_discarded() {
        let document_store = Arc::new(InMemoryDocumentStore::with_document(
            serde_json::json!({"entries": [], "lastId": 12}),
        ));
        let mut store = store_with(document_store);
        store.select_view(ViewMode::Log);

        assert_eq!(store.load().await, LoadOutcome::Malformed);
        assert!(store.state().entries.is_empty());
        assert_eq!(store.state().last_id, 0);
        assert_eq!(store.state().view.mode, ViewMode::Log);
    }

    #[tokio::test]
    async fn one_bad_entry_does_not_discard_the_rest() {
        let document_store = Arc::new(InMemoryDocumentStore::with_document(serde_json::json!({
            "schedules": [
                {"id": 1, "type": "schedule", "title": "Keep me", "start": "2026-02-16T01:00:00.000Z", "end": "2026-02-16T02:00:00.000Z"},
                {"id": 2, "type": "schedule", "title": "Backwards", "start": "2026-02-16T05:00:00.000Z", "end": "2026-02-16T04:00:00.000Z"},
                {"id": 4, "type": "task", "title": "Lost", "start": "not a date", "end": "2026-02-16T04:00:00.000Z"}
            ],
            "lastId": 2
        })));
        let mut store = store_with(Arc::clone(&document_store));

        assert_eq!(store.load().await, LoadOutcome::Loaded);
        assert_eq!(store.state().entries.len(), 2);
        assert_eq!(store.state().last_id, 4);

        let (created, pending) = store.upsert(draft("New", EntryType::Schedule)).expect("insert");
        assert!(pending.wait().await);
        assert_eq!(created.id, 5);

        let stored = document_store.document().expect("read").expect("stored");
        let titles: Vec<_> = stored["schedules"]
            .as_array()
            .expect("schedules array")
            .iter()
            .map(|entry| entry["title"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(titles, vec!["Keep me", "Backwards", "New"]);
        assert_eq!(stored["lastId"], 5);
    }

    #[tokio::test]
    async fn completion_time_survives_a_save_and_reload() {
        let document_store = Arc::new(InMemoryDocumentStore::default());
        let mut writer = EntityStore::new(Arc::clone(&document_store), chrono_tz::Asia::Tokyo)
            .with_retry_policy(fast_retry())
            .with_now_provider(Arc::new(|| fixed_time("2026-02-16T03:00:00.123456789Z")));
        let mut task = draft("Report", EntryType::Task);
        task.end = fixed_time("2026-02-16T02:00:00.000999Z");
        let (task, pending) = writer.upsert(task).expect("insert");
        pending.wait().await;
        let (done, pending) = writer.toggle_task_completion(task.id).expect("complete");
        assert!(pending.wait().await);
        assert_eq!(done.actual_end, Some(fixed_time("2026-02-16T03:00:00.123Z")));

        let mut reader = store_with(Arc::clone(&document_store));
        assert_eq!(reader.load().await, LoadOutcome::Loaded);
        assert_eq!(reader.state().entries, writer.state().entries);
    }

    #[tokio::test]
    async fn non_json_remote_body_is_malformed_not_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/b/planner-bin"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .expect(1)
            .mount(&server)
            .await;
        let remote = ReqwestJsonBinStore::new(
            reqwest::Client::new(),
            &format!("{}/v3/b/", server.uri()),
            "planner-bin",
            "master-key",
        )
        .expect("build store");
        let mut store = store_with(Arc::new(remote));

        assert_eq!(store.load().await, LoadOutcome::Malformed);
        assert!(store.state().entries.is_empty());
    }

    #[tokio::test]
    async fn unreachable_store_retries_then_starts_empty() {
        let document_store = Arc::new(FlakyDocumentStore::unreachable());
        let mut store = store_with(Arc::clone(&document_store));

        assert_eq!(store.load().await, LoadOutcome::Unavailable);
        assert_eq!(document_store.fetch_calls.load(Ordering::SeqCst), 3);
        assert!(store.state().entries.is_empty());
    }

    #[tokio::test]
    async fn save_retries_transient_failures() {
        let document_store = Arc::new(FlakyDocumentStore::failing_stores(2));
        let mut store = store_with(Arc::clone(&document_store));

        let (_, pending) = store.upsert(draft("Report", EntryType::Task)).expect("insert");
        assert!(pending.wait().await);
        assert_eq!(document_store.store_calls.load(Ordering::SeqCst), 3);
        assert_eq!(document_store.inner.write_count(), 1);
    }

    #[tokio::test]
    async fn save_is_abandoned_after_retries_without_touching_state() {
        let document_store = Arc::new(FlakyDocumentStore::failing_stores(10));
        let mut store = store_with(Arc::clone(&document_store));

        let (entry, pending) = store.upsert(draft("Report", EntryType::Task)).expect("insert");
        assert!(!pending.wait().await);
        assert_eq!(document_store.store_calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.state().entry(entry.id), Some(&entry));
    }

    #[test]
    fn mutations_outside_a_runtime_skip_the_save() {
        let document_store = Arc::new(InMemoryDocumentStore::default());
        let mut store = store_with(Arc::clone(&document_store));

        let (entry, pending) = store.upsert(draft("Offline", EntryType::Task)).expect("insert");
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        assert!(!runtime.block_on(pending.wait()));

        assert_eq!(entry.id, 1);
        assert_eq!(document_store.write_count(), 0);
    }
}
