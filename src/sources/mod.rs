pub mod bitget;
pub mod coinmarketcap;
pub mod html;
pub mod investing;
pub mod transport;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::types::Domain;

pub use bitget::BitgetFetcher;
pub use coinmarketcap::CmcCalendarDump;
pub use investing::InvestingFetcher;

/// One third-party source: fetches a single day and returns normalized rows.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    type Event: Send;

    fn domain(&self) -> Domain;

    async fn fetch_day(&self, day: NaiveDate) -> Result<Vec<Self::Event>>;
}

/// Courtesy delay between successive per-day requests: `base` plus a
/// uniform random `[0, jitter]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchPacing {
    pub base: Duration,
    pub jitter: Duration,
}

impl FetchPacing {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.base + Duration::from_millis(extra)
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Fetch every day in `[start, end]`. A failing day is logged and skipped;
/// the pause follows every request either way.
pub async fn fetch_range<F>(
    fetcher: &F,
    start: NaiveDate,
    end: NaiveDate,
    pacing: FetchPacing,
) -> Result<Vec<F::Event>>
where
    F: SourceFetcher + ?Sized,
{
    if end < start {
        return Err(AppError::Fetch(format!(
            "range end {end} is before start {start}"
        )));
    }

    let domain = fetcher.domain();
    let mut out = Vec::new();
    let mut failed_days = 0usize;

    for day in start.iter_days().take_while(|d| *d <= end) {
        match fetcher.fetch_day(day).await {
            Ok(rows) => {
                debug!(domain = %domain, day = %day, rows = rows.len(), "day fetched");
                out.extend(rows);
            }
            Err(e) => {
                failed_days += 1;
                warn!(domain = %domain, day = %day, "[{domain}][{day}] fetch error: {e}");
            }
        }
        pacing.pause().await;
    }

    info!(
        domain = %domain,
        rows = out.len(),
        failed_days,
        "[{domain}] fetched {} rows for {start}..={end}",
        out.len(),
    );
    Ok(out)
}
