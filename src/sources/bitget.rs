use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::display_offset;
use crate::error::{AppError, Result};
use crate::sources::transport::PayloadTransport;
use crate::sources::SourceFetcher;
use crate::types::{CryptoEvent, Domain};

/// Bitget daily crypto calendar. The transport decides whether the request
/// goes out as plain HTTP or from inside a browser page.
pub struct BitgetFetcher {
    transport: Box<dyn PayloadTransport>,
    api_url: String,
    page_size: u32,
    max_pages: u32,
}

impl BitgetFetcher {
    pub fn new(transport: Box<dyn PayloadTransport>, api_url: String, page_size: u32, max_pages: u32) -> Self {
        Self {
            transport,
            api_url,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
        }
    }
}

#[async_trait]
impl SourceFetcher for BitgetFetcher {
    type Event = CryptoEvent;

    fn domain(&self) -> Domain {
        Domain::Crypto
    }

    async fn fetch_day(&self, day: NaiveDate) -> Result<Vec<CryptoEvent>> {
        let date_ms = date_to_ms_utc(day)?;
        let mut events = Vec::new();

        for page_num in 1..=self.max_pages {
            let body = request_body(date_ms, page_num, self.page_size);
            let payload = self.transport.post_json(&self.api_url, &body).await?;
            check_envelope(&payload)?;

            let page_len = payload_items(&payload).map(|items| items.len()).unwrap_or(0);
            events.extend(normalize_payload(&payload));
            debug!(
                day = %day,
                page_num,
                page_len,
                transport = self.transport.name(),
                "bitget page fetched"
            );

            if page_len < self.page_size as usize {
                break;
            }
        }

        Ok(events)
    }
}

/// Epoch milliseconds of 00:00 UTC on `day`, the key the endpoint expects.
pub fn date_to_ms_utc(day: NaiveDate) -> Result<i64> {
    day.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| AppError::Fetch(format!("no midnight for {day}")))
}

pub fn request_body(date_ms: i64, page_num: u32, page_size: u32) -> Value {
    json!({
        "languageType": 0,
        "pageNum": page_num,
        "pageSize": page_size,
        "params": {
            "date": date_ms,
            "languageId": 0,
            "categoryName": "",
        },
    })
}

/// Bitget answers HTTP 200 with `{"code": "<non-zero>", "msg": ...}` on
/// rejected requests.
fn check_envelope(payload: &Value) -> Result<()> {
    let code = match payload.get("code") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Ok(()),
    };
    if code == "0" || code == "00000" || code == "200" {
        return Ok(());
    }
    let msg = payload.get("msg").and_then(|m| m.as_str()).unwrap_or("");
    Err(AppError::Fetch(format!("bitget rejected request: code={code} msg={msg}")))
}

fn payload_items(payload: &Value) -> Option<&Vec<Value>> {
    payload.get("data")?.get("items")?.as_array()
}

/// Map a raw Bitget payload to normalized crypto events. Missing fields
/// become `None`; items without an id cannot be deduplicated and are dropped.
pub fn normalize_payload(payload: &Value) -> Vec<CryptoEvent> {
    let Some(items) = payload_items(payload) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let event = normalize_item(item);
            if event.is_none() {
                debug!("bitget item without id dropped: {item}");
            }
            event
        })
        .collect()
}

fn normalize_item(item: &Value) -> Option<CryptoEvent> {
    let id = scalar_text(item.get("id")?)?;
    let coin = item.get("coin").filter(|c| c.is_object());

    let categories = item
        .get("categories")
        .and_then(|c| c.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    Some(CryptoEvent {
        id,
        title: item
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string(),
        categories,
        coin_name: coin.and_then(|c| opt_str(c, "name")),
        coin_symbol: coin.and_then(|c| opt_str(c, "symbol")),
        start_time_kst: item.get("startTime").and_then(ms_to_display_zone),
        link: opt_str(item, "link"),
        source: opt_str(item, "source"),
    })
}

fn opt_str(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(|s| s.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// String or integer ids, as text.
fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Epoch milliseconds (number or numeric string) to the display zone.
pub fn ms_to_display_zone(v: &Value) -> Option<DateTime<FixedOffset>> {
    let ms = match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp_millis(ms).map(|utc| utc.with_timezone(&display_offset()))
}
