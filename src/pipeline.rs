use chrono::NaiveDate;
use tracing::{error, info};

use crate::db::EventStore;
use crate::error::{AppError, Result};
use crate::mirror::{CalendarMirror, MirrorSummary};
use crate::sources::{fetch_range, FetchPacing, SourceFetcher};
use crate::types::{CryptoEvent, Domain, EconomicEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainReport {
    Completed {
        fetched: usize,
        inserted: u64,
        mirrored: MirrorSummary,
    },
    Failed(String),
}

impl DomainReport {
    fn empty() -> Self {
        DomainReport::Completed {
            fetched: 0,
            inserted: 0,
            mirrored: MirrorSummary::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub crypto: DomainReport,
    pub economic: DomainReport,
}

/// Fetch -> store -> mirror, once per domain, strictly in sequence.
pub struct Pipeline {
    store: EventStore,
    crypto: Box<dyn SourceFetcher<Event = CryptoEvent>>,
    economic: Box<dyn SourceFetcher<Event = EconomicEvent>>,
    mirror: CalendarMirror,
    crypto_calendar_id: String,
    economic_calendar_id: String,
    pacing: FetchPacing,
}

impl Pipeline {
    pub fn new(
        store: EventStore,
        crypto: Box<dyn SourceFetcher<Event = CryptoEvent>>,
        economic: Box<dyn SourceFetcher<Event = EconomicEvent>>,
        mirror: CalendarMirror,
        crypto_calendar_id: String,
        economic_calendar_id: String,
        pacing: FetchPacing,
    ) -> Self {
        Self {
            store,
            crypto,
            economic,
            mirror,
            crypto_calendar_id,
            economic_calendar_id,
            pacing,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub async fn close(self) {
        self.store.close().await;
    }

    /// Run both domains over the inclusive day range. A failure in one
    /// domain is reported and does not stop the other.
    pub async fn run(&self, start: NaiveDate, end: NaiveDate) -> RunReport {
        info!("Sync window {start} ..= {end}");

        let crypto = self.run_crypto(start, end).await.unwrap_or_else(|e| {
            error!(domain = %Domain::Crypto, "[crypto] pipeline failed: {e}");
            DomainReport::Failed(e.to_string())
        });
        let economic = self.run_economic(start, end).await.unwrap_or_else(|e| {
            error!(domain = %Domain::Economic, "[economic] pipeline failed: {e}");
            DomainReport::Failed(e.to_string())
        });

        RunReport { crypto, economic }
    }

    async fn run_crypto(&self, start: NaiveDate, end: NaiveDate) -> Result<DomainReport> {
        let fetched = fetch_range(self.crypto.as_ref(), start, end, self.pacing).await?;
        if fetched.is_empty() {
            info!(domain = %Domain::Crypto, "[crypto] nothing fetched, skipping store and mirror");
            return Ok(DomainReport::empty());
        }
        let fetched_len = fetched.len();

        let inserted = self.store.insert_new_crypto(fetched).await?;
        let rows = self.store.crypto_in_window(start, exclusive_end(end)?).await?;
        let outcomes = self
            .mirror
            .mirror(Domain::Crypto, &rows, &self.crypto_calendar_id)
            .await;

        Ok(DomainReport::Completed {
            fetched: fetched_len,
            inserted,
            mirrored: MirrorSummary::from_outcomes(&outcomes),
        })
    }

    async fn run_economic(&self, start: NaiveDate, end: NaiveDate) -> Result<DomainReport> {
        let fetched = fetch_range(self.economic.as_ref(), start, end, self.pacing).await?;
        if fetched.is_empty() {
            info!(domain = %Domain::Economic, "[economic] nothing fetched, skipping store and mirror");
            return Ok(DomainReport::empty());
        }
        let fetched_len = fetched.len();

        let inserted = self.store.insert_new_economic(fetched).await?;
        let rows = self.store.economic_in_window(start, exclusive_end(end)?).await?;
        let outcomes = self
            .mirror
            .mirror(Domain::Economic, &rows, &self.economic_calendar_id)
            .await;

        Ok(DomainReport::Completed {
            fetched: fetched_len,
            inserted,
            mirrored: MirrorSummary::from_outcomes(&outcomes),
        })
    }
}

fn exclusive_end(end: NaiveDate) -> Result<NaiveDate> {
    end.succ_opt()
        .ok_or_else(|| AppError::Fetch(format!("no day after {end}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, FixedOffset, TimeZone};

    use crate::mirror::calendar::{CalendarEntry, CalendarService};
    use crate::mirror::entry::EntryBody;
    use crate::types::EventTime;

    struct FakeSource<E> {
        domain: Domain,
        fail_on: Option<NaiveDate>,
        rows: Vec<E>,
    }

    #[async_trait]
    impl<E: Clone + Send + Sync> SourceFetcher for FakeSource<E> {
        type Event = E;

        fn domain(&self) -> Domain {
            self.domain
        }

        async fn fetch_day(&self, day: NaiveDate) -> Result<Vec<E>> {
            if Some(day) == self.fail_on {
                return Err(AppError::Fetch("HTTP 403 Forbidden".to_string()));
            }
            Ok(self.rows.clone())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingCalendar {
        created: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl CalendarService for RecordingCalendar {
        async fn list_entries(
            &self,
            _calendar_id: &str,
            _time_min: DateTime<FixedOffset>,
            _time_max: DateTime<FixedOffset>,
            _text_query: &str,
        ) -> Result<Vec<CalendarEntry>> {
            Ok(Vec::new())
        }

        async fn create_entry(&self, calendar_id: &str, body: &EntryBody) -> Result<CalendarEntry> {
            self.created
                .lock()
                .unwrap()
                .push((calendar_id.to_string(), body.summary.clone()));
            Ok(CalendarEntry::default())
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
    }

    fn crypto_event(id: &str) -> CryptoEvent {
        CryptoEvent {
            id: id.to_string(),
            title: format!("Listing {id}"),
            categories: String::new(),
            coin_name: None,
            coin_symbol: None,
            start_time_kst: FixedOffset::east_opt(9 * 3600)
                .unwrap()
                .with_ymd_and_hms(2025, 9, 18, 15, 0, 0)
                .single(),
            link: None,
            source: None,
        }
    }

    fn economic_event(title: &str) -> EconomicEvent {
        EconomicEvent {
            datetime: EventTime::parse("2025-09-18 21:30:00").unwrap(),
            currency: Some("USD".to_string()),
            impact_bulls: 3,
            title: title.to_string(),
            event_url: None,
            actual: None,
            forecast: None,
            previous: None,
            event_type: None,
        }
    }

    async fn pipeline(
        crypto: FakeSource<CryptoEvent>,
        economic: FakeSource<EconomicEvent>,
        calendar: RecordingCalendar,
    ) -> Pipeline {
        Pipeline::new(
            EventStore::open_in_memory().await.unwrap(),
            Box::new(crypto),
            Box::new(economic),
            CalendarMirror::new(Box::new(calendar)),
            "crypto-cal".to_string(),
            "economic-cal".to_string(),
            FetchPacing::default(),
        )
    }

    #[tokio::test]
    async fn crypto_fetch_failure_does_not_block_economic() {
        let calendar = RecordingCalendar::default();
        let p = pipeline(
            FakeSource { domain: Domain::Crypto, fail_on: Some(day(18)), rows: Vec::new() },
            FakeSource { domain: Domain::Economic, fail_on: None, rows: vec![economic_event("CPI")] },
            calendar.clone(),
        )
        .await;

        let report = p.run(day(18), day(18)).await;
        assert_eq!(report.crypto, DomainReport::empty());
        assert!(matches!(
            report.economic,
            DomainReport::Completed { fetched: 1, inserted: 1, .. }
        ));
        assert_eq!(p.store().count(Domain::Economic).await.unwrap(), 1);
        assert_eq!(
            *calendar.created.lock().unwrap(),
            vec![("economic-cal".to_string(), "USD - CPI".to_string())]
        );
    }

    #[tokio::test]
    async fn store_failure_is_isolated_to_its_domain() {
        let p = pipeline(
            FakeSource { domain: Domain::Crypto, fail_on: None, rows: vec![crypto_event("1")] },
            FakeSource { domain: Domain::Economic, fail_on: None, rows: vec![economic_event("PPI")] },
            RecordingCalendar::default(),
        )
        .await;
        sqlx::query("DROP TABLE crypto_calendar")
            .execute(p.store().pool())
            .await
            .unwrap();

        let report = p.run(day(18), day(18)).await;
        assert!(matches!(report.crypto, DomainReport::Failed(_)));
        assert!(matches!(report.economic, DomainReport::Completed { inserted: 1, .. }));
    }

    #[tokio::test]
    async fn empty_fetch_skips_store_and_mirror() {
        let calendar = RecordingCalendar::default();
        let p = pipeline(
            FakeSource { domain: Domain::Crypto, fail_on: None, rows: Vec::new() },
            FakeSource { domain: Domain::Economic, fail_on: None, rows: Vec::new() },
            calendar.clone(),
        )
        .await;

        let report = p.run(day(18), day(20)).await;
        assert_eq!(report.crypto, DomainReport::empty());
        assert_eq!(report.economic, DomainReport::empty());
        assert!(calendar.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rerun_inserts_nothing_new() {
        let p = pipeline(
            FakeSource { domain: Domain::Crypto, fail_on: None, rows: vec![crypto_event("7")] },
            FakeSource { domain: Domain::Economic, fail_on: None, rows: Vec::new() },
            RecordingCalendar::default(),
        )
        .await;

        // Two days returning the same row: fetched twice, stored once.
        let first = p.run(day(18), day(19)).await;
        assert!(matches!(first.crypto, DomainReport::Completed { fetched: 2, inserted: 1, .. }));
        let second = p.run(day(18), day(19)).await;
        assert!(matches!(second.crypto, DomainReport::Completed { inserted: 0, .. }));
        assert_eq!(p.store().count(Domain::Crypto).await.unwrap(), 1);
    }
}
