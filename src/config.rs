use std::collections::HashMap;
use std::time::Duration;

use chrono::{Days, FixedOffset, NaiveDate, Offset, Utc};

use crate::error::{AppError, Result};

pub const BITGET_API_URL: &str = "https://www.bitget.com/v1/cms/crypto/calendar/events/daily";
pub const BITGET_ORIGIN: &str = "https://www.bitget.com";
pub const BITGET_REFERER: &str = "https://www.bitget.com/calendar";
pub const INVESTING_API_URL: &str =
    "https://www.investing.com/economic-calendar/Service/getCalendarFilteredData";
pub const INVESTING_ORIGIN: &str = "https://www.investing.com";
pub const INVESTING_REFERER: &str = "https://www.investing.com/economic-calendar/";
pub const CMC_CALENDAR_API_URL: &str = "https://api.coinmarketcap.com/data-api/v3/calendar/query";
pub const CMC_ORIGIN: &str = "https://coinmarketcap.com";
pub const CMC_EVENTS_URL: &str = "https://coinmarketcap.com/events/";
pub const GOOGLE_CALENDAR_API_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const WEBDRIVER_URL: &str = "http://localhost:9515";

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36";

/// Display zone for every stored and mirrored timestamp. Asia/Seoul has no DST.
pub const DISPLAY_TZ_NAME: &str = "Asia/Seoul";
pub const DISPLAY_TZ_OFFSET_SECS: i32 = 9 * 3600;

/// Calendar entry summary limit, in characters.
pub const TITLE_MAX_CHARS: usize = 300;
/// Calendar entry description limit, in characters.
pub const DESCRIPTION_MAX_CHARS: usize = 8000;
/// Width of the `[start, start + window)` duplicate lookup.
pub const DUPLICATE_LOOKUP_WINDOW_SECS: i64 = 60;
/// Duration given to timed entries that carry no explicit end.
pub const DEFAULT_EVENT_DURATION_MINS: i64 = 60;

/// Rows per multi-row INSERT statement.
pub const INSERT_CHUNK_SIZE: usize = 500;

/// Marker left in example env files for calendar ids that were never filled in.
pub const PLACEHOLDER_PREFIX: &str = "REPLACE_ME";

pub fn display_offset() -> FixedOffset {
    FixedOffset::east_opt(DISPLAY_TZ_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// How the crypto source obtains its raw payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Direct HTTP with captured cookies/headers.
    Http,
    /// Full browser automation through a WebDriver endpoint.
    Browser,
}

impl std::str::FromStr for FetchStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(FetchStrategy::Http),
            "browser" => Ok(FetchStrategy::Browser),
            other => Err(AppError::Config(format!(
                "CRYPTO_FETCH_STRATEGY must be 'http' or 'browser', got '{other}'"
            ))),
        }
    }
}

/// What one invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Fetch, store and mirror both domains.
    Sync,
    /// Print the raw CoinMarketCap calendar payload for the window and exit.
    CmcDump,
}

impl std::str::FromStr for RunMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(RunMode::Sync),
            "cmc-dump" => Ok(RunMode::CmcDump),
            other => Err(AppError::Config(format!(
                "RUN_MODE must be 'sync' or 'cmc-dump', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub run_mode: RunMode,
    pub log_level: String,
    pub db_path: String,
    pub crypto_calendar_id: String,
    pub economic_calendar_id: String,
    /// OAuth2 bearer token for the calendar API (GOOGLE_ACCESS_TOKEN).
    pub google_access_token: String,
    pub google_calendar_api_url: String,
    pub bitget_api_url: String,
    pub investing_api_url: String,
    pub crypto_fetch_strategy: FetchStrategy,
    pub webdriver_url: String,
    /// Wait after page load so page scripts can set cookies (BROWSER_SETTLE_MS).
    pub browser_settle: Duration,
    /// Raw `Cookie` header captured from a browser session (BITGET_COOKIES).
    pub bitget_cookies: Option<String>,
    /// Extra request headers as a JSON object (BITGET_EXTRA_HEADERS).
    pub bitget_extra_headers: HashMap<String, String>,
    pub bitget_page_size: u32,
    pub bitget_max_pages: u32,
    /// Hour offset the economic source renders its times in (INVESTING_TZ_OFFSET).
    /// Rows are stored and mirrored as display-zone wall clock without
    /// conversion, so anything other than 9 shifts every economic entry.
    pub investing_tz_offset: i32,
    pub investing_countries: Vec<u32>,
    pub investing_importances: Vec<u32>,
    pub cmc_api_url: String,
    pub cmc_page_size: u32,
    pub fetch_delay: Duration,
    pub fetch_jitter: Duration,
    pub http_timeout: Duration,
    /// First day of the sync window (SYNC_START_DATE, defaults to today).
    pub sync_start: NaiveDate,
    /// Last day of the sync window, inclusive (SYNC_DAYS counts the start day).
    pub sync_end: NaiveDate,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let crypto_calendar_id = required_calendar_id(&var, "CRYPTO_CALENDAR_ID")?;
        let economic_calendar_id = required_calendar_id(&var, "ECONOMIC_CALENDAR_ID")?;

        let google_access_token = var("GOOGLE_ACCESS_TOKEN")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Config("GOOGLE_ACCESS_TOKEN must be set".to_string()))?;

        let bitget_extra_headers = match var("BITGET_EXTRA_HEADERS").filter(|s| !s.trim().is_empty()) {
            Some(raw) => serde_json::from_str::<HashMap<String, String>>(&raw).map_err(|e| {
                AppError::Config(format!("BITGET_EXTRA_HEADERS must be a JSON object of strings: {e}"))
            })?,
            None => HashMap::new(),
        };

        let sync_start = match var("SYNC_START_DATE").filter(|s| !s.trim().is_empty()) {
            Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                AppError::Config(format!("SYNC_START_DATE must be YYYY-MM-DD, got '{raw}'"))
            })?,
            None => Utc::now().with_timezone(&display_offset()).date_naive(),
        };

        let sync_days: u32 = parse_num(&or("SYNC_DAYS", "7"), "SYNC_DAYS")?;
        if sync_days == 0 {
            return Err(AppError::Config("SYNC_DAYS must be at least 1".to_string()));
        }
        let sync_end = sync_start
            .checked_add_days(Days::new(u64::from(sync_days - 1)))
            .ok_or_else(|| {
                AppError::Config(format!("SYNC_DAYS={sync_days} runs past the last representable date"))
            })?;

        Ok(Self {
            run_mode: or("RUN_MODE", "sync").parse()?,
            log_level: or("LOG_LEVEL", "info"),
            db_path: or("DB_PATH", "calendar.db"),
            crypto_calendar_id,
            economic_calendar_id,
            google_access_token,
            google_calendar_api_url: or("GOOGLE_CALENDAR_API_URL", GOOGLE_CALENDAR_API_URL),
            bitget_api_url: or("BITGET_API_URL", BITGET_API_URL),
            investing_api_url: or("INVESTING_API_URL", INVESTING_API_URL),
            crypto_fetch_strategy: or("CRYPTO_FETCH_STRATEGY", "http").parse()?,
            webdriver_url: or("WEBDRIVER_URL", WEBDRIVER_URL),
            browser_settle: Duration::from_millis(parse_num(
                &or("BROWSER_SETTLE_MS", "5000"),
                "BROWSER_SETTLE_MS",
            )?),
            bitget_cookies: var("BITGET_COOKIES").filter(|s| !s.trim().is_empty()),
            bitget_extra_headers,
            bitget_page_size: parse_num(&or("BITGET_PAGE_SIZE", "100"), "BITGET_PAGE_SIZE")?,
            bitget_max_pages: parse_num(&or("BITGET_MAX_PAGES", "10"), "BITGET_MAX_PAGES")?,
            investing_tz_offset: parse_num(&or("INVESTING_TZ_OFFSET", "9"), "INVESTING_TZ_OFFSET")?,
            investing_countries: parse_id_list(&or("INVESTING_COUNTRIES", ""), "INVESTING_COUNTRIES")?,
            investing_importances: parse_id_list(
                &or("INVESTING_IMPORTANCES", ""),
                "INVESTING_IMPORTANCES",
            )?,
            cmc_api_url: or("CMC_API_URL", CMC_CALENDAR_API_URL),
            cmc_page_size: parse_num(&or("CMC_PAGE_SIZE", "20"), "CMC_PAGE_SIZE")?,
            fetch_delay: Duration::from_millis(parse_num(&or("FETCH_DELAY_MS", "500"), "FETCH_DELAY_MS")?),
            fetch_jitter: Duration::from_millis(parse_num(
                &or("FETCH_JITTER_MS", "700"),
                "FETCH_JITTER_MS",
            )?),
            http_timeout: Duration::from_secs(parse_num(
                &or("HTTP_TIMEOUT_SECS", "20"),
                "HTTP_TIMEOUT_SECS",
            )?),
            sync_start,
            sync_end,
        })
    }

    /// Whether the economic source renders its times in the display zone.
    pub fn investing_matches_display_zone(&self) -> bool {
        self.investing_tz_offset.checked_mul(3600) == Some(DISPLAY_TZ_OFFSET_SECS)
    }
}

fn required_calendar_id(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    let value = var(key).map(|s| s.trim().to_string()).unwrap_or_default();
    if value.is_empty() || value.starts_with(PLACEHOLDER_PREFIX) {
        return Err(AppError::Config(format!(
            "{key} must be set to a shared calendar id (got '{value}')"
        )));
    }
    Ok(value)
}

fn parse_num<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AppError::Config(format!("{key} must be a valid number, got '{raw}'")))
}

fn parse_id_list(raw: &str, key: &str) -> Result<Vec<u32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_num(s, key))
        .collect()
}
