use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::config::{
    display_offset, DEFAULT_EVENT_DURATION_MINS, DESCRIPTION_MAX_CHARS, DISPLAY_TZ_NAME,
    TITLE_MAX_CHARS,
};
use crate::types::EventTime;

/// Start or end of a calendar entry: a bare date for all-day entries, or an
/// instant with the display zone attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTime {
    AllDay(NaiveDate),
    Timed(DateTime<FixedOffset>),
}

impl EntryTime {
    /// Instant the entry begins at, used for the duplicate lookup window.
    pub fn instant(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            EntryTime::AllDay(d) => EventTime::AllDay(*d).start_instant(),
            EntryTime::Timed(t) => Some(*t),
        }
    }
}

impl Serialize for EntryTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            EntryTime::AllDay(d) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("date", &d.format("%Y-%m-%d").to_string())?;
                map.end()
            }
            EntryTime::Timed(t) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("dateTime", &t.to_rfc3339())?;
                map.serialize_entry("timeZone", DISPLAY_TZ_NAME)?;
                map.end()
            }
        }
    }
}

/// Request body for a new calendar entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryBody {
    pub summary: String,
    pub description: String,
    pub start: EntryTime,
    pub end: EntryTime,
}

impl EntryBody {
    pub fn new(summary: &str, description: &str, start: EntryTime, end: EntryTime) -> Self {
        Self {
            summary: truncate_chars(summary.trim(), TITLE_MAX_CHARS),
            description: truncate_chars(description, DESCRIPTION_MAX_CHARS),
            start,
            end,
        }
    }
}

/// Keep at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Derive the entry's start and end.
///
/// A date-only start is an all-day entry ending (exclusively) on the given
/// end date when that is later, else on the next day. A timed start ends at
/// the given end when that is later, else after the default duration.
pub fn derive_span(start: EventTime, end: Option<EventTime>) -> Option<(EntryTime, EntryTime)> {
    match start {
        EventTime::AllDay(day) => {
            let end_day = match end {
                Some(EventTime::AllDay(e)) if e > day => e,
                _ => day.succ_opt()?,
            };
            Some((EntryTime::AllDay(day), EntryTime::AllDay(end_day)))
        }
        EventTime::Timed(_) => {
            let begin = start.start_instant()?;
            let finish = end
                .and_then(|e| e.start_instant())
                .filter(|e| *e > begin)
                .unwrap_or(begin + Duration::minutes(DEFAULT_EVENT_DURATION_MINS));
            Some((
                EntryTime::Timed(begin.with_timezone(&display_offset())),
                EntryTime::Timed(finish.with_timezone(&display_offset())),
            ))
        }
    }
}
