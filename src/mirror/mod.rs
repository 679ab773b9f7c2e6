pub mod calendar;
pub mod entry;
pub mod sync;

pub use calendar::GoogleCalendarClient;
pub use sync::{CalendarMirror, MirrorSummary};

use crate::types::{CryptoEvent, EconomicEvent, EventTime};

/// A persisted row that can be turned into a calendar entry.
pub trait MirrorRecord {
    /// Identity used in log lines.
    fn label(&self) -> String;

    fn summary(&self) -> String;

    fn description(&self) -> String;

    /// Free-text query for the duplicate lookup.
    fn search_text(&self) -> String;

    fn start(&self) -> Option<EventTime>;

    fn end(&self) -> Option<EventTime> {
        None
    }
}

fn or_blank(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("")
}

impl MirrorRecord for CryptoEvent {
    fn label(&self) -> String {
        format!("id={}", self.id)
    }

    fn summary(&self) -> String {
        self.title.trim().to_string()
    }

    fn description(&self) -> String {
        format!(
            "{}\n\nSource: {}\nCoin: {} ({})",
            or_blank(&self.link),
            or_blank(&self.source),
            or_blank(&self.coin_name),
            or_blank(&self.coin_symbol),
        )
    }

    fn search_text(&self) -> String {
        self.title.clone()
    }

    fn start(&self) -> Option<EventTime> {
        self.start_time()
    }
}

impl MirrorRecord for EconomicEvent {
    fn label(&self) -> String {
        format!("{}|{}|{}", self.datetime, or_blank(&self.currency), self.title)
    }

    fn summary(&self) -> String {
        format!("{} - {}", or_blank(&self.currency).trim(), self.title.trim())
            .trim()
            .to_string()
    }

    fn description(&self) -> String {
        format!(
            "{}\n\nImpact (bulls): {}\nForecast: {}\nActual: {}\nPrevious: {}",
            or_blank(&self.event_url),
            self.impact_bulls,
            or_blank(&self.forecast),
            or_blank(&self.actual),
            or_blank(&self.previous),
        )
    }

    fn search_text(&self) -> String {
        self.title.trim().to_string()
    }

    fn start(&self) -> Option<EventTime> {
        Some(self.datetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_description_template() {
        let ev = CryptoEvent {
            id: "42".to_string(),
            title: " Token Unlock ".to_string(),
            categories: String::new(),
            coin_name: Some("Aptos".to_string()),
            coin_symbol: Some("APT".to_string()),
            start_time_kst: None,
            link: Some("https://example.com/apt".to_string()),
            source: None,
        };
        assert_eq!(ev.summary(), "Token Unlock");
        assert_eq!(ev.description(), "https://example.com/apt\n\nSource: \nCoin: Aptos (APT)");
        assert_eq!(ev.start(), None);
        assert_eq!(ev.label(), "id=42");
    }

    #[test]
    fn economic_summary_and_description() {
        let ev = EconomicEvent {
            datetime: EventTime::parse("2025-09-18 21:30:00").unwrap(),
            currency: Some("USD".to_string()),
            impact_bulls: 3,
            title: "Initial Jobless Claims".to_string(),
            event_url: Some("https://www.investing.com/economic-calendar/jobless-294".to_string()),
            actual: None,
            forecast: Some("240K".to_string()),
            previous: Some("263K".to_string()),
            event_type: None,
        };
        assert_eq!(ev.summary(), "USD - Initial Jobless Claims");
        assert_eq!(
            ev.description(),
            "https://www.investing.com/economic-calendar/jobless-294\n\n\
             Impact (bulls): 3\nForecast: 240K\nActual: \nPrevious: 263K"
        );
        assert_eq!(ev.search_text(), "Initial Jobless Claims");

        let no_currency = EconomicEvent { currency: None, ..ev };
        assert_eq!(no_currency.summary(), "- Initial Jobless Claims");
    }
}
