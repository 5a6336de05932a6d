use crate::domain::models::{
    AppState, EntryType, ScheduleEntry, Tag, TimeSlot, ViewMode, ViewState,
};
use crate::domain::slots::{analyze_free_slots, local_instant, SlotWindow};
use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub const MONTH_CHIPS_PER_DAY: usize = 2;
pub const TIMELINE_FIRST_HOUR: u32 = 8;
pub const TIMELINE_LAST_HOUR: u32 = 23;
pub const RECENT_COMPLETED_LIMIT: usize = 5;

impl ViewState {
    pub fn new(mode: ViewMode, reference_date: NaiveDate) -> Self {
        Self {
            mode,
            reference_date,
        }
    }

    /// Explicit user selection; the reference date is kept.
    pub fn select(&mut self, mode: ViewMode) {
        self.mode = mode;
    }

    /// Moves the reference date by `offset` months (month view) or weeks
    /// (week view). Returns `false` when the view ignores navigation or the
    /// target date is out of range.
    pub fn change_date(&mut self, offset: i32) -> bool {
        let shifted = match self.mode {
            ViewMode::Month => shift_months(self.reference_date, offset),
            ViewMode::Week => shift_days(self.reference_date, i64::from(offset) * 7),
            ViewMode::Task | ViewMode::Log => return false,
        };
        match shifted {
            Some(date) => {
                self.reference_date = date;
                true
            }
            None => false,
        }
    }
}

/// Calendar month arithmetic that keeps the day-of-month and lets overflow
/// roll into the following month (Jan 31 + 1 month = Mar 3 in 2026).
fn shift_months(date: NaiveDate, offset: i32) -> Option<NaiveDate> {
    let total = i64::from(date.year()) * 12 + i64::from(date.month0()) + i64::from(offset);
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
    NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_days(Days::new(u64::from(date.day() - 1)))
}

fn shift_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::try_days(days)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryChip {
    pub id: u64,
    pub title: String,
    pub entry_type: EntryType,
    pub tag: Tag,
}

impl From<&ScheduleEntry> for EntryChip {
    fn from(entry: &ScheduleEntry) -> Self {
        Self {
            id: entry.id,
            title: entry.title.clone(),
            entry_type: entry.entry_type,
            tag: entry.tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthDay {
    pub date: NaiveDate,
    pub is_today: bool,
    pub chips: Vec<EntryChip>,
    pub hidden_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    /// Blank cells before the 1st in a Sunday-first grid.
    pub leading_blanks: u32,
    pub days: Vec<MonthDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineBlock {
    pub id: u64,
    pub title: String,
    pub entry_type: EntryType,
    pub tag: Tag,
    pub top_percent: f64,
    pub height_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineCell {
    pub date: NaiveDate,
    pub blocks: Vec<TimelineBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineRow {
    pub hour: u32,
    pub cells: Vec<TimelineCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekDay {
    pub date: NaiveDate,
    pub is_today: bool,
    pub free_slots: Vec<TimeSlot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekTimeline {
    pub week_start: NaiveDate,
    pub days: Vec<WeekDay>,
    pub rows: Vec<TimelineRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskBoard {
    pub pending: Vec<ScheduleEntry>,
    pub recently_completed: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogItem {
    pub id: u64,
    pub title: String,
    pub entry_type: EntryType,
    pub tag: Tag,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogDay {
    pub date: NaiveDate,
    pub items: Vec<LogItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogTimeline {
    pub days: Vec<LogDay>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewModel {
    Month(MonthGrid),
    Week(WeekTimeline),
    Task(TaskBoard),
    Log(LogTimeline),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Upcoming,
    Done,
    Pending,
    Completed,
}

pub fn entry_status(entry: &ScheduleEntry, now: DateTime<Utc>) -> EntryStatus {
    match entry.entry_type {
        EntryType::Schedule if entry.end < now => EntryStatus::Done,
        EntryType::Schedule => EntryStatus::Upcoming,
        EntryType::Task if entry.completed => EntryStatus::Completed,
        EntryType::Task => EntryStatus::Pending,
    }
}

/// Projection for the state's current view.
pub fn project<Z: TimeZone>(
    state: &AppState,
    today: NaiveDate,
    window: &SlotWindow,
    timezone: &Z,
) -> ViewModel {
    let reference_date = state.view.reference_date;
    match state.view.mode {
        ViewMode::Month => {
            ViewModel::Month(month_grid(&state.entries, reference_date, today, timezone))
        }
        ViewMode::Week => ViewModel::Week(week_timeline(
            &state.entries,
            reference_date,
            today,
            window,
            timezone,
        )),
        ViewMode::Task => ViewModel::Task(task_board(&state.entries)),
        ViewMode::Log => ViewModel::Log(log_timeline(&state.entries, timezone)),
    }
}

pub fn month_grid<Z: TimeZone>(
    entries: &[ScheduleEntry],
    reference_date: NaiveDate,
    today: NaiveDate,
    timezone: &Z,
) -> MonthGrid {
    let first = reference_date.with_day(1).unwrap_or(reference_date);
    let mut by_day: BTreeMap<NaiveDate, Vec<&ScheduleEntry>> = BTreeMap::new();
    for entry in entries.iter().filter(|entry| !entry.is_completed_task()) {
        by_day.entry(entry.start_date(timezone)).or_default().push(entry);
    }

    let days = first
        .iter_days()
        .take_while(|date| date.month() == first.month())
        .map(|date| {
            let mut visible = by_day.remove(&date).unwrap_or_default();
            visible.sort_by_key(|entry| entry.start);
            let hidden_count = visible.len().saturating_sub(MONTH_CHIPS_PER_DAY);
            MonthDay {
                date,
                is_today: date == today,
                chips: visible
                    .into_iter()
                    .take(MONTH_CHIPS_PER_DAY)
                    .map(EntryChip::from)
                    .collect(),
                hidden_count,
            }
        })
        .collect();

    MonthGrid {
        year: first.year(),
        month: first.month(),
        leading_blanks: first.weekday().num_days_from_sunday(),
        days,
    }
}

pub fn week_timeline<Z: TimeZone>(
    entries: &[ScheduleEntry],
    reference_date: NaiveDate,
    today: NaiveDate,
    window: &SlotWindow,
    timezone: &Z,
) -> WeekTimeline {
    let back = u64::from(reference_date.weekday().num_days_from_sunday());
    let week_start = reference_date
        .checked_sub_days(Days::new(back))
        .unwrap_or(reference_date);
    let dates: Vec<NaiveDate> = week_start.iter_days().take(7).collect();
    let visible: Vec<&ScheduleEntry> = entries
        .iter()
        .filter(|entry| !entry.is_completed_task())
        .collect();

    let rows = (TIMELINE_FIRST_HOUR..=TIMELINE_LAST_HOUR)
        .map(|hour| TimelineRow {
            hour,
            cells: dates
                .iter()
                .map(|date| {
                    let hour_start = local_instant(*date, hour, timezone);
                    let hour_end = hour_start + Duration::hours(1);
                    TimelineCell {
                        date: *date,
                        blocks: visible
                            .iter()
                            .filter_map(|entry| timeline_block(entry, hour_start, hour_end))
                            .collect(),
                    }
                })
                .collect(),
        })
        .collect();

    let days = dates
        .iter()
        .map(|date| WeekDay {
            date: *date,
            is_today: *date == today,
            free_slots: analyze_free_slots(*date, entries, window, timezone),
        })
        .collect();

    WeekTimeline {
        week_start,
        days,
        rows,
    }
}

fn timeline_block(
    entry: &ScheduleEntry,
    hour_start: DateTime<Utc>,
    hour_end: DateTime<Utc>,
) -> Option<TimelineBlock> {
    if entry.start >= hour_end || entry.end <= hour_start {
        return None;
    }
    let visible_start = entry.start.max(hour_start);
    let visible_end = entry.end.min(hour_end);
    let hour_seconds = (hour_end - hour_start).num_seconds() as f64;
    let top = (visible_start - hour_start).num_seconds() as f64 / hour_seconds * 100.0;
    let height = (visible_end - visible_start).num_seconds() as f64 / hour_seconds * 100.0;

    Some(TimelineBlock {
        id: entry.id,
        title: entry.title.clone(),
        entry_type: entry.entry_type,
        tag: entry.tag,
        top_percent: top,
        height_percent: height.min(100.0 - top),
    })
}

pub fn task_board(entries: &[ScheduleEntry]) -> TaskBoard {
    let mut pending: Vec<ScheduleEntry> = entries
        .iter()
        .filter(|entry| entry.is_task() && !entry.completed)
        .cloned()
        .collect();
    pending.sort_by_key(|entry| entry.end);

    let mut recently_completed: Vec<ScheduleEntry> = entries
        .iter()
        .filter(|entry| entry.is_completed_task())
        .cloned()
        .collect();
    recently_completed.sort_by(|left, right| right.actual_end.cmp(&left.actual_end));
    recently_completed.truncate(RECENT_COMPLETED_LIMIT);

    TaskBoard {
        pending,
        recently_completed,
    }
}

/// Schedules and completed tasks, newest first, grouped by local day.
pub fn log_timeline<Z: TimeZone>(entries: &[ScheduleEntry], timezone: &Z) -> LogTimeline {
    let mut items: Vec<LogItem> = entries
        .iter()
        .filter(|entry| entry.is_schedule() || entry.is_completed_task())
        .map(|entry| LogItem {
            id: entry.id,
            title: entry.title.clone(),
            entry_type: entry.entry_type,
            tag: entry.tag,
            logged_at: entry.log_time(),
        })
        .collect();
    items.sort_by(|left, right| right.logged_at.cmp(&left.logged_at));

    let mut days: Vec<LogDay> = Vec::new();
    for item in items {
        let date = item.logged_at.with_timezone(timezone).date_naive();
        match days.last_mut() {
            Some(day) if day.date == date => day.items.push(item),
            _ => days.push(LogDay {
                date,
                items: vec![item],
            }),
        }
    }
    LogTimeline { days }
}
