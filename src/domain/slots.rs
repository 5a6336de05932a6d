use crate::domain::models::{ScheduleEntry, TimeSlot};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Daily analysis window and the shortest gap worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotWindow {
    pub day_start_hour: u32,
    pub day_end_hour: u32,
    pub min_slot_minutes: u32,
}

impl Default for SlotWindow {
    fn default() -> Self {
        Self {
            day_start_hour: 9,
            day_end_hour: 22,
            min_slot_minutes: 30,
        }
    }
}

impl SlotWindow {
    pub fn validate(&self) -> Result<(), String> {
        if self.day_end_hour > 24 {
            return Err("slotWindow.dayEndHour must be <= 24".to_string());
        }
        if self.day_start_hour >= self.day_end_hour {
            return Err("slotWindow.dayStartHour must be before dayEndHour".to_string());
        }
        if self.min_slot_minutes == 0 {
            return Err("slotWindow.minSlotMinutes must be > 0".to_string());
        }
        Ok(())
    }
}

/// The instant at `hour:00` local time on `date`. Hours past a DST gap are
/// shifted forward one hour.
pub fn local_instant<Z: TimeZone>(date: NaiveDate, hour: u32, timezone: &Z) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(hour));
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            timezone
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
        })
        .map(|value| value.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Free gaps on `date` between the window bounds.
///
/// Only schedules and incomplete tasks starting on `date` count as booked.
/// Bookings are swept in start order with a cursor that only moves forward,
/// so overlapping bookings behave as one busy stretch. A booking that starts
/// at or after the window end stops the sweep.
pub fn analyze_free_slots<Z: TimeZone>(
    date: NaiveDate,
    entries: &[ScheduleEntry],
    window: &SlotWindow,
    timezone: &Z,
) -> Vec<TimeSlot> {
    let day_start = local_instant(date, window.day_start_hour, timezone);
    let day_end = local_instant(date, window.day_end_hour, timezone);
    if day_end <= day_start {
        return Vec::new();
    }
    let min_slot = Duration::minutes(i64::from(window.min_slot_minutes));

    let mut booked: Vec<TimeSlot> = entries
        .iter()
        .filter(|entry| entry.blocks_time() && entry.start_date(timezone) == date)
        .map(|entry| TimeSlot {
            start: entry.start,
            end: entry.end,
        })
        .collect();
    booked.sort_by_key(|interval| interval.start);

    let mut slots = Vec::new();
    let mut cursor = day_start;
    for interval in &booked {
        if interval.start >= day_end {
            break;
        }
        if interval.start - cursor >= min_slot {
            slots.push(TimeSlot {
                start: cursor,
                end: interval.start,
            });
        }
        if interval.end > cursor {
            cursor = interval.end;
        }
    }
    if day_end - cursor >= min_slot {
        slots.push(TimeSlot {
            start: cursor,
            end: day_end,
        });
    }
    slots
}
