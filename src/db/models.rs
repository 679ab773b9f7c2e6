//! Database row types matching `migrations/0001_calendar_tables.sql`.
//! Timestamps are stored as display-zone wall-clock text.
use chrono::TimeZone;
use tracing::warn;

use crate::config::display_offset;
use crate::types::{CryptoEvent, EconomicEvent, EconomicEventType, EventTime};

#[derive(Debug, sqlx::FromRow)]
pub struct CryptoRow {
    pub id: String,
    pub title: String,
    pub categories: String,
    pub coin_name: Option<String>,
    pub coin_symbol: Option<String>,
    pub start_time_kst: Option<String>,
    pub link: Option<String>,
    pub source: Option<String>,
}

impl CryptoRow {
    pub fn from_event(ev: &CryptoEvent) -> Self {
        Self {
            id: ev.id.clone(),
            title: ev.title.clone(),
            categories: ev.categories.clone(),
            coin_name: ev.coin_name.clone(),
            coin_symbol: ev.coin_symbol.clone(),
            start_time_kst: ev.start_time().map(|t| t.to_db_string()),
            link: ev.link.clone(),
            source: ev.source.clone(),
        }
    }

    pub fn into_event(self) -> CryptoEvent {
        let start_time_kst = self.start_time_kst.as_deref().and_then(|raw| {
            let parsed = match EventTime::parse(raw) {
                Some(EventTime::Timed(naive)) => display_offset().from_local_datetime(&naive).single(),
                Some(EventTime::AllDay(d)) => d
                    .and_hms_opt(0, 0, 0)
                    .and_then(|naive| display_offset().from_local_datetime(&naive).single()),
                None => None,
            };
            if parsed.is_none() {
                warn!(id = %self.id, raw, "crypto_calendar row has unreadable start_time_kst");
            }
            parsed
        });

        CryptoEvent {
            id: self.id,
            title: self.title,
            categories: self.categories,
            coin_name: self.coin_name,
            coin_symbol: self.coin_symbol,
            start_time_kst,
            link: self.link,
            source: self.source,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct EconomicRow {
    pub datetime: String,
    pub currency: Option<String>,
    pub impact_bulls: i64,
    pub title: String,
    pub event_url: Option<String>,
    pub actual: Option<String>,
    pub forecast: Option<String>,
    pub previous: Option<String>,
    #[sqlx(rename = "type")]
    pub event_type: Option<String>,
}

impl EconomicRow {
    pub fn from_event(ev: &EconomicEvent) -> Self {
        Self {
            datetime: ev.datetime.to_db_string(),
            currency: ev.currency.clone(),
            impact_bulls: i64::from(ev.impact_bulls),
            title: ev.title.clone(),
            event_url: ev.event_url.clone(),
            actual: ev.actual.clone(),
            forecast: ev.forecast.clone(),
            previous: ev.previous.clone(),
            event_type: ev.event_type.map(|t| t.as_str().to_string()),
        }
    }

    /// None if the stored datetime cannot be read back.
    pub fn into_event(self) -> Option<EconomicEvent> {
        let Some(datetime) = EventTime::parse(&self.datetime) else {
            warn!(raw = %self.datetime, title = %self.title, "economic_calendar row has unreadable datetime");
            return None;
        };
        Some(EconomicEvent {
            datetime,
            currency: self.currency,
            impact_bulls: self.impact_bulls.clamp(0, i64::from(u8::MAX)) as u8,
            title: self.title,
            event_url: self.event_url,
            actual: self.actual,
            forecast: self.forecast,
            previous: self.previous,
            event_type: self.event_type.as_deref().and_then(EconomicEventType::parse),
        })
    }
}
