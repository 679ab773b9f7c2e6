mod config;
mod db;
mod error;
mod mirror;
mod pipeline;
mod sources;
#[cfg(test)]
mod test_support;
mod types;

use std::collections::HashMap;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{
    Config, FetchStrategy, RunMode, BITGET_ORIGIN, BITGET_REFERER, CMC_EVENTS_URL, CMC_ORIGIN,
    DISPLAY_TZ_NAME,
};
use crate::db::EventStore;
use crate::error::Result;
use crate::mirror::{CalendarMirror, GoogleCalendarClient};
use crate::pipeline::{DomainReport, Pipeline};
use crate::sources::transport::{BrowserTransport, HttpTransport, PayloadTransport};
use crate::sources::{BitgetFetcher, CmcCalendarDump, FetchPacing, InvestingFetcher};
use crate::types::Domain;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if !cfg.investing_matches_display_zone() {
        warn!(
            "INVESTING_TZ_OFFSET={} differs from {DISPLAY_TZ_NAME}; economic times are stored and mirrored unconverted",
            cfg.investing_tz_offset
        );
    }

    let outcome = match cfg.run_mode {
        RunMode::Sync => run(cfg).await,
        RunMode::CmcDump => dump_cmc(cfg).await,
    };
    if let Err(e) = outcome {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Store ---
    let store = EventStore::open(&cfg.db_path).await?;

    // --- Sources ---
    let transport = crypto_transport(&cfg, BITGET_ORIGIN, BITGET_REFERER, true)?;
    info!("Crypto source transport: {}", transport.name());

    let crypto = BitgetFetcher::new(
        transport,
        cfg.bitget_api_url.clone(),
        cfg.bitget_page_size,
        cfg.bitget_max_pages,
    );
    let economic = InvestingFetcher::new(
        cfg.investing_api_url.clone(),
        cfg.investing_tz_offset,
        cfg.investing_countries.clone(),
        cfg.investing_importances.clone(),
        cfg.http_timeout,
    )?;

    // --- Calendar ---
    let calendar = GoogleCalendarClient::new(
        &cfg.google_calendar_api_url,
        cfg.google_access_token.clone(),
        cfg.http_timeout,
    )?;

    let pipeline = Pipeline::new(
        store,
        Box::new(crypto),
        Box::new(economic),
        CalendarMirror::new(Box::new(calendar)),
        cfg.crypto_calendar_id.clone(),
        cfg.economic_calendar_id.clone(),
        FetchPacing::new(cfg.fetch_delay, cfg.fetch_jitter),
    );

    let report = pipeline.run(cfg.sync_start, cfg.sync_end).await;
    log_report(Domain::Crypto, &report.crypto);
    log_report(Domain::Economic, &report.economic);

    for domain in [Domain::Crypto, Domain::Economic] {
        match pipeline.store().count(domain).await {
            Ok(total) => info!("[{domain}] {total} rows stored"),
            Err(e) => warn!("[{domain}] row count unavailable: {e}"),
        }
    }

    pipeline.close().await;
    Ok(())
}

/// Print the raw CoinMarketCap calendar payload for the configured window.
async fn dump_cmc(cfg: Config) -> Result<()> {
    let transport = crypto_transport(&cfg, CMC_ORIGIN, CMC_EVENTS_URL, false)?;
    info!("CoinMarketCap dump via {} transport", transport.name());
    let dump = CmcCalendarDump::new(transport, cfg.cmc_api_url.clone(), cfg.cmc_page_size);
    let payload = dump.fetch_raw(cfg.sync_start, cfg.sync_end, 1).await?;
    println!("{payload:#}");
    Ok(())
}

/// Transport for a crypto source. The captured Bitget cookies and headers
/// are only sent to Bitget.
fn crypto_transport(
    cfg: &Config,
    origin: &str,
    page_url: &str,
    bitget_credentials: bool,
) -> Result<Box<dyn PayloadTransport>> {
    Ok(match cfg.crypto_fetch_strategy {
        FetchStrategy::Http => {
            let no_headers = HashMap::new();
            let (cookies, headers) = if bitget_credentials {
                (cfg.bitget_cookies.as_deref(), &cfg.bitget_extra_headers)
            } else {
                (None, &no_headers)
            };
            Box::new(HttpTransport::new(origin, page_url, cookies, headers, cfg.http_timeout)?)
        }
        FetchStrategy::Browser => Box::new(BrowserTransport::new(
            &cfg.webdriver_url,
            page_url,
            cfg.browser_settle,
            cfg.http_timeout,
        )?),
    })
}

fn log_report(domain: Domain, report: &DomainReport) {
    match report {
        DomainReport::Completed { fetched, inserted, mirrored } => info!(
            "[{domain}] fetched={fetched} inserted={inserted} created={} skipped={} failed={}",
            mirrored.created, mirrored.skipped, mirrored.failed,
        ),
        DomainReport::Failed(reason) => error!("[{domain}] failed: {reason}"),
    }
}
