use crate::application::entity_store::{EntityStore, LoadOutcome, PendingSave};
use crate::application::forecast::ForecastService;
use crate::domain::models::{AppState, EntryDraft, ScheduleEntry, ViewMode};
use crate::domain::slots::{analyze_free_slots, SlotWindow};
use crate::domain::view::{entry_status, project, EntryStatus, ViewModel};
use crate::domain::weather::ForecastSummary;
use crate::infrastructure::document_store::DocumentStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::weather_client::WeatherClient;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreeSlotsReport {
    pub date: NaiveDate,
    pub slots: Vec<FreeSlot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryDetails {
    pub entry: ScheduleEntry,
    pub status: EntryStatus,
    pub tag_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ForecastSummary>,
}

/// Result of a mutating command: the affected entry and its background save.
#[derive(Debug)]
pub struct EntryChange {
    pub entry: ScheduleEntry,
    pub save: PendingSave,
}

impl From<(ScheduleEntry, PendingSave)> for EntryChange {
    fn from((entry, save): (ScheduleEntry, PendingSave)) -> Self {
        Self { entry, save }
    }
}

pub struct Planner<S, C>
where
    S: DocumentStore + 'static,
    C: WeatherClient,
{
    store: EntityStore<S>,
    forecast: ForecastService<C>,
    slot_window: SlotWindow,
}

impl<S, C> Planner<S, C>
where
    S: DocumentStore + 'static,
    C: WeatherClient,
{
    pub fn new(store: EntityStore<S>, forecast: ForecastService<C>, slot_window: SlotWindow) -> Self {
        Self {
            store,
            forecast,
            slot_window,
        }
    }

    pub fn state(&self) -> &AppState {
        self.store.state()
    }

    pub async fn load(&mut self) -> LoadOutcome {
        self.store.load().await
    }

    /// Applies an explicit view selection and navigation offset. Returns a
    /// save handle only when the view state actually changed.
    pub fn navigate(&mut self, mode: Option<ViewMode>, offset: i32) -> Option<PendingSave> {
        let before = self.store.state().view.clone();
        if let Some(mode) = mode {
            self.store.select_view(mode);
        }
        if offset != 0 && !self.store.change_date(offset) {
            debug!(
                view = self.store.state().view.mode.as_str(),
                offset, "navigation ignored"
            );
        }

        let after = &self.store.state().view;
        if *after == before {
            return None;
        }
        info!(
            view = after.mode.as_str(),
            reference_date = %after.reference_date,
            "view changed"
        );
        Some(self.store.save())
    }

    pub fn render(&self) -> ViewModel {
        project(
            self.store.state(),
            self.store.today(),
            &self.slot_window,
            &self.store.timezone(),
        )
    }

    pub fn free_slots(&self, date: NaiveDate) -> FreeSlotsReport {
        let slots = analyze_free_slots(
            date,
            &self.store.state().entries,
            &self.slot_window,
            &self.store.timezone(),
        )
        .into_iter()
        .map(|slot| FreeSlot {
            start: slot.start,
            end: slot.end,
            duration_minutes: slot.duration_minutes(),
        })
        .collect();
        FreeSlotsReport { date, slots }
    }

    pub fn save_entry(&mut self, draft: EntryDraft) -> Result<EntryChange, InfraError> {
        self.store.upsert(draft).map(EntryChange::from)
    }

    pub fn toggle_task(&mut self, id: u64) -> Result<EntryChange, InfraError> {
        match self.store.state().entry(id) {
            None => Err(InfraError::NotFound(format!("entry {id}"))),
            Some(entry) if !entry.is_task() => Err(InfraError::Validation(format!(
                "entry {id} is a schedule and has no completion state"
            ))),
            Some(_) => self
                .store
                .toggle_task_completion(id)
                .map(EntryChange::from)
                .ok_or_else(|| InfraError::NotFound(format!("entry {id}"))),
        }
    }

    /// Deletes an entry. The caller is responsible for confirming first.
    pub fn delete_entry(&mut self, id: u64) -> Result<EntryChange, InfraError> {
        self.store
            .remove(id)
            .map(EntryChange::from)
            .ok_or_else(|| InfraError::NotFound(format!("entry {id}")))
    }

    pub async fn entry_details(&self, id: u64) -> Result<EntryDetails, InfraError> {
        let entry = self
            .store
            .state()
            .entry(id)
            .cloned()
            .ok_or_else(|| InfraError::NotFound(format!("entry {id}")))?;

        let forecast = if entry.is_schedule() {
            Some(
                self.forecast
                    .resolve_forecast(&entry.location, entry.start)
                    .await,
            )
        } else {
            None
        };
        Ok(EntryDetails {
            status: entry_status(&entry, self.store.now()),
            tag_label: entry.tag.label(),
            forecast,
            entry,
        })
    }
}
