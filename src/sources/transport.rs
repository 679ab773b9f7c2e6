//! How a source obtains its raw JSON payload: plain HTTP with captured
//! credentials, or a real browser session that sets its own cookies.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::BROWSER_USER_AGENT;
use crate::error::{AppError, Result};

#[async_trait]
pub trait PayloadTransport: Send + Sync {
    /// POST `body` as JSON to `url` and return the parsed JSON response.
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value>;

    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Direct HTTP
// ---------------------------------------------------------------------------

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `cookies` is a raw `Cookie` header value copied from a browser session.
    pub fn new(
        origin: &str,
        referer: &str,
        cookies: Option<&str>,
        extra_headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json;charset=UTF-8"),
        );
        headers.insert(reqwest::header::ORIGIN, header_value("origin", origin)?);
        headers.insert(reqwest::header::REFERER, header_value("referer", referer)?);
        if let Some(cookies) = cookies {
            headers.insert(reqwest::header::COOKIE, header_value("cookie", cookies)?);
        }
        for (name, value) in extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| AppError::Config(format!("invalid header name '{name}': {e}")))?;
            headers.insert(name.clone(), header_value(name.as_str(), value)?);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::Config(format!("invalid value for header '{name}': {e}")))
}

#[async_trait]
impl PayloadTransport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("{url} unreachable: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Fetch(format!("{url} returned HTTP {status}")));
        }
        let text = resp
            .text()
            .await
            .map_err(|e| AppError::Fetch(format!("{url} body unreadable: {e}")))?;
        serde_json::from_str(&text).map_err(|e| {
            let snippet: String = text.chars().take(500).collect();
            AppError::Fetch(format!("JSON decode failed ({e}): {snippet}"))
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

// ---------------------------------------------------------------------------
// Browser automation over the W3C WebDriver protocol
// ---------------------------------------------------------------------------

/// Runs the request from inside a page loaded in a real browser, so the
/// site's own scripts set whatever cookies and tokens it expects.
///
/// Talks to a WebDriver server (chromedriver, geckodriver) over HTTP. Each
/// call opens a fresh session and always deletes it.
pub struct BrowserTransport {
    client: reqwest::Client,
    webdriver_url: String,
    page_url: String,
    settle: Duration,
}

const IN_PAGE_FETCH_SCRIPT: &str = r#"
const callback = arguments[arguments.length - 1];
const url = arguments[0];
const payload = arguments[1];
fetch(url, {
  method: 'POST',
  headers: { 'content-type': 'application/json' },
  body: JSON.stringify(payload),
  credentials: 'include'
})
  .then(res => res.text())
  .then(body => callback(body))
  .catch(err => callback(JSON.stringify({ error: String(err) })));
"#;

impl BrowserTransport {
    pub fn new(webdriver_url: &str, page_url: &str, settle: Duration, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout + settle).build()?;
        Ok(Self {
            client,
            webdriver_url: webdriver_url.trim_end_matches('/').to_string(),
            page_url: page_url.to_string(),
            settle,
        })
    }

    async fn command(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.webdriver_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp: Value = req
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("webdriver {path} unreachable: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::Fetch(format!("webdriver {path} answered non-JSON: {e}")))?;
        let value = resp.get("value").cloned().unwrap_or(Value::Null);
        if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
            let message = value.get("message").and_then(|m| m.as_str()).unwrap_or("");
            return Err(AppError::Fetch(format!("webdriver {path}: {err}: {message}")));
        }
        Ok(value)
    }

    async fn open_session(&self) -> Result<String> {
        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": ["--disable-gpu", "--no-sandbox", "--window-size=1200,900"]
                    }
                }
            }
        });
        let value = self.command(reqwest::Method::POST, "/session", Some(caps)).await?;
        value
            .get("sessionId")
            .and_then(|s| s.as_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::Fetch("webdriver returned no sessionId".to_string()))
    }

    async fn fetch_in_session(&self, session: &str, url: &str, body: &Value) -> Result<Value> {
        self.command(
            reqwest::Method::POST,
            &format!("/session/{session}/url"),
            Some(json!({ "url": self.page_url })),
        )
        .await?;
        tokio::time::sleep(self.settle).await;

        let raw = self
            .command(
                reqwest::Method::POST,
                &format!("/session/{session}/execute/async"),
                Some(json!({ "script": IN_PAGE_FETCH_SCRIPT, "args": [url, body] })),
            )
            .await?;
        let text = raw
            .as_str()
            .ok_or_else(|| AppError::Fetch("in-page fetch returned a non-string body".to_string()))?;

        let parsed: Value = serde_json::from_str(text).map_err(|e| {
            let snippet: String = text.chars().take(500).collect();
            AppError::Fetch(format!("JSON decode failed ({e}): {snippet}"))
        })?;
        if let Some(err) = parsed.get("error").and_then(|e| e.as_str()) {
            return Err(AppError::Fetch(format!("in-page fetch failed: {err}")));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl PayloadTransport for BrowserTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let session = self.open_session().await?;
        debug!(session = %session, page = %self.page_url, "browser session opened");

        let result = self.fetch_in_session(&session, url, body).await;

        if let Err(e) = self
            .command(reqwest::Method::DELETE, &format!("/session/{session}"), None)
            .await
        {
            warn!(session = %session, "failed to close browser session: {e}");
        }
        result
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}
