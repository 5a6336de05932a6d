use chrono::{DateTime, NaiveDate, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Schedule,
    Task,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Schedule => "schedule",
            EntryType::Task => "task",
        }
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "schedule" => Ok(EntryType::Schedule),
            "task" => Ok(EntryType::Task),
            other => Err(format!("unknown entry type: {other}")),
        }
    }
}

/// Colour tag attached to every entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Red,
    Yellow,
    #[default]
    White,
    Black,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Red => "red",
            Tag::Yellow => "yellow",
            Tag::White => "white",
            Tag::Black => "black",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tag::Red => "urgent/important",
            Tag::Yellow => "hobby/private",
            Tag::White => "normal/other",
            Tag::Black => "work/business",
        }
    }

    /// Unknown colours fall back to white.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl FromStr for Tag {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(Tag::Red),
            "yellow" => Ok(Tag::Yellow),
            "white" => Ok(Tag::White),
            "black" => Ok(Tag::Black),
            other => Err(format!("unknown tag: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Month,
    Week,
    Task,
    Log,
}

impl ViewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Month => "month",
            ViewMode::Week => "week",
            ViewMode::Task => "task",
            ViewMode::Log => "log",
        }
    }

    /// Whether date navigation applies to this view.
    pub fn is_navigable(self) -> bool {
        matches!(self, ViewMode::Month | ViewMode::Week)
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "month" => Ok(ViewMode::Month),
            "week" => Ok(ViewMode::Week),
            "task" => Ok(ViewMode::Task),
            "log" => Ok(ViewMode::Log),
            other => Err(format!("unknown view: {other}")),
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub id: u64,
    pub entry_type: EntryType,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: String,
    pub notes: String,
    pub tag: Tag,
    pub completed: bool,
    pub actual_end: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "entry.title")?;
        if self.end < self.start {
            return Err("entry.end must be >= entry.start".to_string());
        }
        match self.entry_type {
            EntryType::Schedule => {
                if self.completed || self.actual_end.is_some() {
                    return Err("schedules cannot carry completion state".to_string());
                }
            }
            EntryType::Task => {
                if self.completed != self.actual_end.is_some() {
                    return Err("task.actual_end must be set exactly when completed".to_string());
                }
            }
        }
        Ok(())
    }

    pub fn is_task(&self) -> bool {
        self.entry_type == EntryType::Task
    }

    pub fn is_schedule(&self) -> bool {
        self.entry_type == EntryType::Schedule
    }

    pub fn is_completed_task(&self) -> bool {
        self.is_task() && self.completed
    }

    /// Schedules and incomplete tasks occupy time; completed tasks do not.
    pub fn blocks_time(&self) -> bool {
        !self.is_completed_task()
    }

    pub fn start_date<Z: TimeZone>(&self, timezone: &Z) -> NaiveDate {
        self.start.with_timezone(timezone).date_naive()
    }

    /// Instant used to order the activity log.
    pub fn log_time(&self) -> DateTime<Utc> {
        self.actual_end.unwrap_or(self.end)
    }
}

/// Stored documents carry millisecond timestamps; instants entering the model
/// are cut to the same precision so a saved state loads back unchanged.
pub fn stored_precision(value: DateTime<Utc>) -> DateTime<Utc> {
    value.trunc_subsecs(3)
}

/// A submitted entry form. `id` is set when editing an existing entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryDraft {
    pub id: Option<u64>,
    pub entry_type: EntryType,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tag: Tag,
}

impl EntryDraft {
    /// Builds the stored entry. Completion state is carried over from `existing`
    /// when editing; tasks never keep a location.
    pub fn into_entry(self, id: u64, existing: Option<&ScheduleEntry>) -> ScheduleEntry {
        let (completed, actual_end) = match (self.entry_type, existing) {
            (EntryType::Task, Some(previous)) if previous.is_task() => {
                (previous.completed, previous.actual_end)
            }
            _ => (false, None),
        };
        let location = match self.entry_type {
            EntryType::Schedule => self.location.trim().to_string(),
            EntryType::Task => String::new(),
        };

        ScheduleEntry {
            id,
            entry_type: self.entry_type,
            title: self.title.trim().to_string(),
            start: stored_precision(self.start),
            end: stored_precision(self.end),
            location,
            notes: self.notes,
            tag: self.tag,
            completed,
            actual_end,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewState {
    pub mode: ViewMode,
    pub reference_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppState {
    pub entries: Vec<ScheduleEntry>,
    pub view: ViewState,
    pub last_id: u64,
}

impl AppState {
    pub fn empty(mode: ViewMode, reference_date: NaiveDate) -> Self {
        Self {
            entries: Vec::new(),
            view: ViewState {
                mode,
                reference_date,
            },
            last_id: 0,
        }
    }

    pub fn entry(&self, id: u64) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for entry in &self.entries {
            entry.validate()?;
            if !seen.insert(entry.id) {
                return Err(format!("duplicate entry id {}", entry.id));
            }
            if entry.id > self.last_id {
                return Err(format!(
                    "entry id {} exceeds last_id {}",
                    entry.id, self.last_id
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeSlot {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
