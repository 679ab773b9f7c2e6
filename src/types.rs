use std::hash::Hash;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::config::display_offset;

const DB_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
const DB_DATE_FMT: &str = "%Y-%m-%d";

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Crypto,
    Economic,
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Domain::Crypto => "crypto",
            Domain::Economic => "economic",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Event time
// ---------------------------------------------------------------------------

/// A wall-clock time in the display zone, or a bare date for all-day events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventTime {
    AllDay(NaiveDate),
    Timed(NaiveDateTime),
}

impl EventTime {
    /// Parse the stored text form: `YYYY-MM-DD` is all-day, anything with a
    /// time-of-day is timed. Accepts `T` or space separators, `/` date
    /// separators and a trailing offset, which is dropped.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, DB_DATE_FMT) {
            return Some(EventTime::AllDay(d));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(EventTime::Timed(dt.naive_local()));
        }
        for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
                return Some(EventTime::Timed(dt));
            }
        }
        None
    }

    /// Text form written to the store. Sorts lexicographically in time order
    /// against `YYYY-MM-DD` window bounds.
    pub fn to_db_string(&self) -> String {
        match self {
            EventTime::AllDay(d) => d.format(DB_DATE_FMT).to_string(),
            EventTime::Timed(dt) => dt.format(DB_DATETIME_FMT).to_string(),
        }
    }

    /// The instant this time starts at in the display zone (midnight for all-day).
    pub fn start_instant(&self) -> Option<DateTime<FixedOffset>> {
        let naive = match self {
            EventTime::AllDay(d) => d.and_hms_opt(0, 0, 0)?,
            EventTime::Timed(dt) => *dt,
        };
        display_offset().from_local_datetime(&naive).single()
    }
}

impl std::fmt::Display for EventTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A record with a domain identity key used for deduplication.
pub trait Keyed {
    type Key: Eq + Hash + Clone + std::fmt::Debug;

    fn key(&self) -> Self::Key;
}

// ---------------------------------------------------------------------------
// Crypto events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CryptoEvent {
    /// Source-assigned id; integer ids are kept in their decimal text form.
    pub id: String,
    pub title: String,
    /// Categories joined with ", ".
    pub categories: String,
    pub coin_name: Option<String>,
    pub coin_symbol: Option<String>,
    /// Start time already converted to Asia/Seoul.
    pub start_time_kst: Option<DateTime<FixedOffset>>,
    pub link: Option<String>,
    pub source: Option<String>,
}

impl CryptoEvent {
    pub fn start_time(&self) -> Option<EventTime> {
        self.start_time_kst
            .map(|t| EventTime::Timed(t.with_timezone(&display_offset()).naive_local()))
    }
}

impl Keyed for CryptoEvent {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

// ---------------------------------------------------------------------------
// Economic events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EconomicEventType {
    Report,
    Speech,
    Release,
}

impl EconomicEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EconomicEventType::Report => "report",
            EconomicEventType::Speech => "speech",
            EconomicEventType::Release => "release",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "report" => Some(EconomicEventType::Report),
            "speech" => Some(EconomicEventType::Speech),
            "release" => Some(EconomicEventType::Release),
            _ => None,
        }
    }
}

impl std::fmt::Display for EconomicEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EconomicEvent {
    /// Source-local display time; no zone conversion is applied.
    pub datetime: EventTime,
    pub currency: Option<String>,
    pub impact_bulls: u8,
    pub title: String,
    pub event_url: Option<String>,
    pub actual: Option<String>,
    pub forecast: Option<String>,
    pub previous: Option<String>,
    pub event_type: Option<EconomicEventType>,
}

/// (stored datetime text, currency or "", title): the same columns and the
/// same NULL folding as the `uq_economic_calendar_key` index.
pub type EconomicKey = (String, String, String);

impl Keyed for EconomicEvent {
    type Key = EconomicKey;

    fn key(&self) -> EconomicKey {
        (
            self.datetime.to_db_string(),
            self.currency.clone().unwrap_or_default(),
            self.title.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_date_as_all_day() {
        let t = EventTime::parse("2025-09-18").unwrap();
        assert_eq!(t, EventTime::AllDay(NaiveDate::from_ymd_opt(2025, 9, 18).unwrap()));
        assert_eq!(t.to_db_string(), "2025-09-18");
    }

    #[test]
    fn parses_timed_forms() {
        let expected = NaiveDate::from_ymd_opt(2025, 9, 18)
            .unwrap()
            .and_hms_opt(21, 30, 0)
            .unwrap();
        for s in [
            "2025-09-18 21:30:00",
            "2025/09/18 21:30:00",
            "2025-09-18T21:30:00",
            "2025-09-18T21:30:00+09:00",
        ] {
            assert_eq!(EventTime::parse(s), Some(EventTime::Timed(expected)), "{s}");
        }
        assert_eq!(EventTime::parse(""), None);
        assert_eq!(EventTime::parse("tomorrow"), None);
    }

    #[test]
    fn db_strings_order_against_date_bounds() {
        let all_day = EventTime::parse("2025-09-18").unwrap().to_db_string();
        let timed = EventTime::parse("2025-09-18 23:59:59").unwrap().to_db_string();
        assert!(all_day.as_str() >= "2025-09-18" && all_day.as_str() < "2025-09-19");
        assert!(timed.as_str() >= "2025-09-18" && timed.as_str() < "2025-09-19");
    }

    #[test]
    fn all_day_starts_at_local_midnight() {
        let t = EventTime::parse("2025-09-18").unwrap();
        assert_eq!(t.start_instant().unwrap().to_rfc3339(), "2025-09-18T00:00:00+09:00");
    }

    #[test]
    fn economic_key_treats_missing_currency_alike() {
        let ev = |currency: Option<&str>| EconomicEvent {
            datetime: EventTime::parse("2025-09-18 21:30:00").unwrap(),
            currency: currency.map(str::to_string),
            impact_bulls: 3,
            title: "CPI (YoY)".to_string(),
            event_url: None,
            actual: None,
            forecast: None,
            previous: None,
            event_type: None,
        };
        assert_eq!(ev(None).key(), ev(None).key());
        assert_eq!(ev(None).key(), ev(Some("")).key());
        assert_ne!(ev(None).key(), ev(Some("USD")).key());
        assert_ne!(ev(Some(" ")).key(), ev(None).key());
    }
}
