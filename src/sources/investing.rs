use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::config::{BROWSER_USER_AGENT, INVESTING_ORIGIN, INVESTING_REFERER};
use crate::error::{AppError, Result};
use crate::sources::html;
use crate::sources::SourceFetcher;
use crate::types::{Domain, EconomicEvent, EconomicEventType, EventTime};

const ROW_DATETIME_FMT: &str = "%Y/%m/%d %H:%M:%S";

/// Investing.com economic calendar, one day per form POST. The endpoint
/// answers with JSON whose `data` field is an HTML table fragment.
pub struct InvestingFetcher {
    client: reqwest::Client,
    api_url: String,
    tz_offset: i32,
    countries: Vec<u32>,
    importances: Vec<u32>,
}

impl InvestingFetcher {
    pub fn new(
        api_url: String,
        tz_offset: i32,
        countries: Vec<u32>,
        importances: Vec<u32>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        headers.insert(reqwest::header::ORIGIN, HeaderValue::from_static(INVESTING_ORIGIN));
        headers.insert(reqwest::header::REFERER, HeaderValue::from_static(INVESTING_REFERER));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            api_url,
            tz_offset,
            countries,
            importances,
        })
    }

    fn form_for(&self, day: NaiveDate) -> Vec<(String, String)> {
        let date = day.format("%Y-%m-%d").to_string();
        let mut form = vec![
            ("dateFrom".to_string(), date.clone()),
            ("dateTo".to_string(), date),
            ("timeZone".to_string(), self.tz_offset.to_string()),
            ("limit_from".to_string(), "0".to_string()),
        ];
        for (i, c) in self.countries.iter().enumerate() {
            form.push((format!("country[{i}]"), c.to_string()));
        }
        for (i, imp) in self.importances.iter().enumerate() {
            form.push((format!("importance[{i}]"), imp.to_string()));
        }
        form
    }
}

#[async_trait]
impl SourceFetcher for InvestingFetcher {
    type Event = EconomicEvent;

    fn domain(&self) -> Domain {
        Domain::Economic
    }

    async fn fetch_day(&self, day: NaiveDate) -> Result<Vec<EconomicEvent>> {
        let resp = self
            .client
            .post(&self.api_url)
            .form(&self.form_for(day))
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("{} unreachable: {e}", self.api_url)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Fetch(format!("{} returned HTTP {status}", self.api_url)));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::Fetch(format!("calendar response is not JSON: {e}")))?;
        let fragment = body.get("data").and_then(|d| d.as_str()).unwrap_or("");

        let events = parse_calendar_rows(fragment);
        debug!(day = %day, rows = events.len(), "investing day parsed");
        Ok(events)
    }
}

/// Parse every `tr.js-event-item` row. Rows without a readable datetime or
/// title are dropped. Output is ordered by time, then by impact descending.
pub fn parse_calendar_rows(fragment: &str) -> Vec<EconomicEvent> {
    let mut events: Vec<EconomicEvent> = html::tag_blocks(fragment, "tr")
        .into_iter()
        .filter(|row| html::has_class(html::open_tag(row), "js-event-item"))
        .filter_map(parse_row)
        .collect();

    events.sort_by(|a, b| {
        time_sort_key(&a.datetime)
            .cmp(&time_sort_key(&b.datetime))
            .then(b.impact_bulls.cmp(&a.impact_bulls))
    });
    events
}

/// All-day entries sort before timed ones on the same date.
fn time_sort_key(t: &EventTime) -> (NaiveDate, Option<NaiveDateTime>) {
    match t {
        EventTime::AllDay(d) => (*d, None),
        EventTime::Timed(dt) => (dt.date(), Some(*dt)),
    }
}

fn parse_row(row: &str) -> Option<EconomicEvent> {
    let raw_dt = html::attr(html::open_tag(row), "data-event-datetime")?;
    let Ok(timestamp) = NaiveDateTime::parse_from_str(raw_dt.trim(), ROW_DATETIME_FMT) else {
        debug!("unparsable event datetime '{raw_dt}'");
        return None;
    };

    let all_day = html::find_by_class(row, "td", "time")
        .map(|td| html::text(td).eq_ignore_ascii_case("all day"))
        .unwrap_or(false);
    let datetime = if all_day {
        EventTime::AllDay(timestamp.date())
    } else {
        EventTime::Timed(timestamp)
    };

    let impact_bulls = html::find_by_class(row, "td", "sentiment")
        .map(|td| html::count_ci(td, "grayFullBullishIcon"))
        .unwrap_or(0)
        .min(u8::MAX as usize) as u8;

    let currency = html::find_by_class(row, "td", "flagCur").and_then(|td| {
        html::tag_blocks(td, "span")
            .first()
            .and_then(|span| html::attr(html::open_tag(span), "title"))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| non_empty(html::text(td)))
    });

    let event_cell = html::find_by_class(row, "td", "event");
    let link = event_cell.and_then(|td| html::tag_blocks(td, "a").first().copied());

    let title = link
        .or(event_cell)
        .map(html::text)
        .and_then(non_empty)?;
    let event_url = link
        .and_then(|a| html::attr(html::open_tag(a), "href"))
        .map(|href| absolute_url(&href));
    let event_type = event_cell.and_then(event_type_of);

    Some(EconomicEvent {
        datetime,
        currency,
        impact_bulls,
        title,
        event_url,
        actual: cell_value(row, "bold"),
        forecast: cell_value(row, "fore"),
        previous: cell_value(row, "prev"),
        event_type,
    })
}

fn event_type_of(cell: &str) -> Option<EconomicEventType> {
    if html::contains_ci(cell, "smallGrayReport") {
        Some(EconomicEventType::Report)
    } else if html::contains_ci(cell, "audioIconNew") {
        Some(EconomicEventType::Speech)
    } else if html::contains_ci(cell, "smallGrayP") {
        Some(EconomicEventType::Release)
    } else {
        None
    }
}

fn cell_value(row: &str, class: &str) -> Option<String> {
    html::find_by_class(row, "td", class)
        .map(html::text)
        .and_then(non_empty)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn absolute_url(href: &str) -> String {
    if href.starts_with('/') {
        format!("{INVESTING_ORIGIN}{href}")
    } else {
        href.to_string()
    }
}
