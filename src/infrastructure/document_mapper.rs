use crate::domain::models::{
    stored_precision, AppState, EntryType, ScheduleEntry, Tag, ViewMode, ViewState,
};
use crate::domain::slots::local_instant;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

const UNTITLED: &str = "(untitled)";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntry {
    pub id: u64,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    pub start: String,
    pub end: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub notes: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tag: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completed: bool,
    #[serde(default)]
    pub actual_end: Option<String>,
}

/// The whole remote document, written and read in one piece.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDocument {
    pub schedules: Vec<PersistedEntry>,
    #[serde(default)]
    pub current_view: Option<String>,
    #[serde(default)]
    pub last_id: Option<u64>,
    #[serde(default)]
    pub current_date: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn encode_document<Z: TimeZone>(state: &AppState, timezone: &Z) -> PersistedDocument {
    PersistedDocument {
        schedules: state.entries.iter().map(encode_entry).collect(),
        current_view: Some(state.view.mode.as_str().to_string()),
        last_id: Some(state.last_id),
        current_date: Some(format_timestamp(local_instant(
            state.view.reference_date,
            0,
            timezone,
        ))),
    }
}

fn encode_entry(entry: &ScheduleEntry) -> PersistedEntry {
    PersistedEntry {
        id: entry.id,
        entry_type: entry.entry_type.as_str().to_string(),
        title: entry.title.clone(),
        start: format_timestamp(entry.start),
        end: format_timestamp(entry.end),
        location: entry.location.clone(),
        notes: entry.notes.clone(),
        tag: entry.tag.as_str().to_string(),
        completed: entry.completed,
        actual_end: entry.actual_end.map(format_timestamp),
    }
}

/// Decodes a fetched document. Only a missing or non-array `schedules`
/// collection makes the document malformed. Entries are repaired where
/// possible and skipped otherwise, each with a warning; view fields fall back
/// to `fallback_mode` and `today` when missing or unreadable.
pub fn decode_document<Z: TimeZone>(
    value: serde_json::Value,
    fallback_mode: ViewMode,
    today: NaiveDate,
    timezone: &Z,
) -> Result<AppState, InfraError> {
    let Some(raw_entries) = value.get("schedules").and_then(Value::as_array) else {
        return Err(InfraError::MalformedDocument(
            "document has no schedules array".to_string(),
        ));
    };

    let mut seen = HashSet::new();
    let mut max_id = 0;
    let mut entries = Vec::with_capacity(raw_entries.len());
    for (position, raw) in raw_entries.iter().enumerate() {
        let persisted = match PersistedEntry::deserialize(raw) {
            Ok(persisted) => persisted,
            Err(error) => {
                warn!(position, %error, "skipping unreadable entry");
                continue;
            }
        };
        max_id = max_id.max(persisted.id);
        let entry = match decode_entry(&persisted) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(id = persisted.id, %error, "skipping invalid entry");
                continue;
            }
        };
        if !seen.insert(entry.id) {
            warn!(id = entry.id, "skipping entry with duplicate id");
            continue;
        }
        entries.push(entry);
    }

    // Skipped ids still count so they are never handed out again.
    let last_id = value
        .get("lastId")
        .and_then(Value::as_u64)
        .unwrap_or(0)
        .max(max_id);
    let mode = value
        .get("currentView")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<ViewMode>().ok())
        .unwrap_or(fallback_mode);
    let reference_date = value
        .get("currentDate")
        .and_then(Value::as_str)
        .and_then(|raw| parse_reference_date(raw, timezone))
        .unwrap_or(today);

    Ok(AppState {
        entries,
        view: ViewState {
            mode,
            reference_date,
        },
        last_id,
    })
}

fn decode_entry(persisted: &PersistedEntry) -> Result<ScheduleEntry, InfraError> {
    let id = persisted.id;
    let entry_type: EntryType = persisted
        .entry_type
        .parse()
        .map_err(|error: String| malformed_entry(id, &error))?;
    let start = parse_timestamp(&persisted.start)
        .ok_or_else(|| malformed_entry(id, "start is not an ISO-8601 timestamp"))?;
    let mut end = parse_timestamp(&persisted.end)
        .ok_or_else(|| malformed_entry(id, "end is not an ISO-8601 timestamp"))?;
    if end < start {
        warn!(id, "entry ends before it starts, moving end to start");
        end = start;
    }

    let title = if persisted.title.trim().is_empty() {
        warn!(id, "entry has a blank title");
        UNTITLED.to_string()
    } else {
        persisted.title.clone()
    };

    let (completed, actual_end) = match entry_type {
        EntryType::Schedule => (false, None),
        EntryType::Task if persisted.completed => {
            let recorded = persisted.actual_end.as_deref().and_then(|raw| {
                let parsed = parse_timestamp(raw);
                if parsed.is_none() {
                    warn!(id, "unreadable actualEnd, using the deadline");
                }
                parsed
            });
            // Completed without a usable finish time: fall back to the deadline.
            (true, Some(recorded.unwrap_or(end)))
        }
        EntryType::Task => (false, None),
    };

    let entry = ScheduleEntry {
        id,
        entry_type,
        title,
        start,
        end,
        location: persisted.location.clone(),
        notes: persisted.notes.clone(),
        tag: Tag::parse_lenient(&persisted.tag),
        completed,
        actual_end,
    };
    entry.validate().map_err(|error| malformed_entry(id, &error))?;
    Ok(entry)
}

fn malformed_entry(id: u64, reason: &str) -> InfraError {
    InfraError::MalformedDocument(format!("entry {id}: {reason}"))
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|value| stored_precision(value.with_timezone(&Utc)))
}

fn parse_reference_date<Z: TimeZone>(raw: &str, timezone: &Z) -> Option<NaiveDate> {
    if let Some(timestamp) = parse_timestamp(raw) {
        return Some(timestamp.with_timezone(timezone).date_naive());
    }
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
