use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use reqwest::Url;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::mirror::entry::EntryBody;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(rename = "htmlLink", default)]
    pub html_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntryList {
    #[serde(default)]
    items: Vec<CalendarEntry>,
}

/// External calendar capability used by the mirror.
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Entries overlapping `[time_min, time_max)` whose text matches `text_query`.
    async fn list_entries(
        &self,
        calendar_id: &str,
        time_min: DateTime<FixedOffset>,
        time_max: DateTime<FixedOffset>,
        text_query: &str,
    ) -> Result<Vec<CalendarEntry>>;

    async fn create_entry(&self, calendar_id: &str, body: &EntryBody) -> Result<CalendarEntry>;
}

/// Google Calendar v3 REST client authenticated with a bearer access token.
pub struct GoogleCalendarClient {
    client: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl GoogleCalendarClient {
    pub fn new(base_url: &str, access_token: String, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("invalid calendar API url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!("calendar API url '{base_url}' cannot be a base")));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            access_token,
        })
    }

    /// `{base}/calendars/{id}/events`, with the id percent-encoded as one segment.
    fn events_url(&self, calendar_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["calendars", calendar_id, "events"]);
        }
        url
    }
}

async fn error_body(resp: reqwest::Response) -> String {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let snippet: String = text.chars().take(300).collect();
    format!("HTTP {status}: {snippet}")
}

#[async_trait]
impl CalendarService for GoogleCalendarClient {
    async fn list_entries(
        &self,
        calendar_id: &str,
        time_min: DateTime<FixedOffset>,
        time_max: DateTime<FixedOffset>,
        text_query: &str,
    ) -> Result<Vec<CalendarEntry>> {
        let resp = self
            .client
            .get(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .query(&[
                ("timeMin", time_min.to_rfc3339_opts(SecondsFormat::Secs, false)),
                ("timeMax", time_max.to_rfc3339_opts(SecondsFormat::Secs, false)),
                ("q", text_query.to_string()),
                ("singleEvents", "true".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AppError::MirrorLookup(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::MirrorLookup(error_body(resp).await));
        }
        let list: EntryList = resp
            .json()
            .await
            .map_err(|e| AppError::MirrorLookup(format!("bad list response: {e}")))?;
        Ok(list.items)
    }

    async fn create_entry(&self, calendar_id: &str, body: &EntryBody) -> Result<CalendarEntry> {
        let resp = self
            .client
            .post(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::MirrorCreate(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::MirrorCreate(error_body(resp).await));
        }
        resp.json()
            .await
            .map_err(|e| AppError::MirrorCreate(format!("bad create response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::TimeZone;

    use crate::mirror::entry::EntryTime;
    use crate::test_support::StubServer;

    #[test]
    fn events_url_encodes_calendar_id() {
        let client = GoogleCalendarClient::new(
            "https://www.googleapis.com/calendar/v3",
            "token".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        let url = client.events_url("abc#x@group.calendar.google.com");
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/abc%23x@group.calendar.google.com/events"
        );
    }

    #[test]
    fn trailing_slash_on_base_is_tolerated() {
        let client = GoogleCalendarClient::new(
            "http://localhost:8080/calendar/v3/",
            "token".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.events_url("primary").as_str(),
            "http://localhost:8080/calendar/v3/calendars/primary/events"
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        let err = GoogleCalendarClient::new("not a url", "t".to_string(), Duration::from_secs(5));
        assert!(matches!(err, Err(AppError::Config(_))));
        let err = GoogleCalendarClient::new("mailto:x@y.z", "t".to_string(), Duration::from_secs(5));
        assert!(matches!(err, Err(AppError::Config(_))));
    }

    #[test]
    fn list_response_tolerates_missing_items() {
        let list: EntryList = serde_json::from_str(r#"{"kind": "calendar#events"}"#).unwrap();
        assert!(list.items.is_empty());
        let entry: CalendarEntry =
            serde_json::from_str(r#"{"id": "e1", "htmlLink": "https://calendar/e1"}"#).unwrap();
        assert_eq!(entry.html_link.as_deref(), Some("https://calendar/e1"));
    }

    fn client_for(server: &StubServer) -> GoogleCalendarClient {
        GoogleCalendarClient::new(
            &format!("{}/calendar/v3", server.url),
            "ya29.token".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn kst(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 9, 18, h, m, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn list_sends_window_query_and_bearer_token() {
        let server = StubServer::start(vec![(
            200,
            r#"{"items":[{"id":"e1","summary":"SUI - Mainnet Launch"}]}"#,
        )])
        .await;

        let entries = client_for(&server)
            .list_entries("crypto@group.calendar.google.com", kst(21, 30), kst(21, 31), "Mainnet Launch")
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "e1");
        assert_eq!(entries[0].summary.as_deref(), Some("SUI - Mainnet Launch"));

        let req = &server.requests()[0];
        assert_eq!(req.method, "GET");
        assert_eq!(req.path(), "/calendar/v3/calendars/crypto@group.calendar.google.com/events");
        assert_eq!(req.header("authorization"), Some("Bearer ya29.token"));

        let sent = Url::parse(&format!("{}{}", server.url, req.target)).unwrap();
        let query: HashMap<String, String> = sent.query_pairs().into_owned().collect();
        assert_eq!(query.get("timeMin").map(String::as_str), Some("2025-09-18T21:30:00+09:00"));
        assert_eq!(query.get("timeMax").map(String::as_str), Some("2025-09-18T21:31:00+09:00"));
        assert_eq!(query.get("q").map(String::as_str), Some("Mainnet Launch"));
        assert_eq!(query.get("singleEvents").map(String::as_str), Some("true"));
    }

    #[tokio::test]
    async fn list_error_status_is_a_lookup_error() {
        let server = StubServer::start(vec![(401, r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#)]).await;
        let err = client_for(&server)
            .list_entries("primary", kst(9, 0), kst(9, 1), "CPI")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MirrorLookup(msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn create_posts_body_and_returns_link() {
        let server = StubServer::start(vec![(
            200,
            r#"{"id":"e9","htmlLink":"https://www.google.com/calendar/event?eid=e9"}"#,
        )])
        .await;
        let body = EntryBody::new(
            "USD - CPI (YoY)",
            "Forecast: 2.9%",
            EntryTime::Timed(kst(21, 30)),
            EntryTime::Timed(kst(22, 30)),
        );

        let created = client_for(&server).create_entry("econ@group.calendar.google.com", &body).await.unwrap();
        assert_eq!(created.id, "e9");
        assert_eq!(
            created.html_link.as_deref(),
            Some("https://www.google.com/calendar/event?eid=e9")
        );

        let req = &server.requests()[0];
        assert_eq!(req.method, "POST");
        assert_eq!(req.header("authorization"), Some("Bearer ya29.token"));
        let sent: serde_json::Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(sent["summary"], "USD - CPI (YoY)");
        assert_eq!(sent["start"]["timeZone"], "Asia/Seoul");
    }

    #[tokio::test]
    async fn create_error_status_is_a_create_error() {
        let server = StubServer::start(vec![(500, r#"{"error":{"code":500}}"#)]).await;
        let body = EntryBody::new("t", "", EntryTime::Timed(kst(9, 0)), EntryTime::Timed(kst(10, 0)));
        let err = client_for(&server).create_entry("primary", &body).await.unwrap_err();
        assert!(matches!(err, AppError::MirrorCreate(msg) if msg.contains("500")));
    }
}
