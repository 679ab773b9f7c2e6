use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Result;
use crate::sources::transport::PayloadTransport;

/// CoinMarketCap events calendar. Its payload is not normalized or stored;
/// the raw JSON is only printed for inspection.
pub struct CmcCalendarDump {
    transport: Box<dyn PayloadTransport>,
    api_url: String,
    page_size: u32,
}

impl CmcCalendarDump {
    pub fn new(transport: Box<dyn PayloadTransport>, api_url: String, page_size: u32) -> Self {
        Self {
            transport,
            api_url,
            page_size: page_size.max(1),
        }
    }

    /// One page of events for the inclusive `[start, end]` window.
    pub async fn fetch_raw(&self, start: NaiveDate, end: NaiveDate, page: u32) -> Result<Value> {
        let body = request_body(start, end, page, self.page_size);
        let payload = self.transport.post_json(&self.api_url, &body).await?;
        debug!(%start, %end, page, transport = self.transport.name(), "cmc calendar page fetched");
        Ok(payload)
    }
}

pub fn request_body(start: NaiveDate, end: NaiveDate, page: u32, size: u32) -> Value {
    json!({
        "startDate": start.format("%Y-%m-%d").to_string(),
        "endDate": end.format("%Y-%m-%d").to_string(),
        "page": page,
        "size": size,
    })
}
