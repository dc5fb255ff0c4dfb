//! W3C WebDriver client for synthetic checks.
//!
//! Talks to a chromedriver/geckodriver endpoint over plain HTTP+JSON. Only
//! the handful of commands a page-load check needs are implemented.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Browser, BrowserSession, PageSnapshot, ProbeError};

/// Upper bound on any single WebDriver command, browser start-up included.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Which headless browser to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chrome,
    Firefox,
}

impl FromStr for BrowserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(Self::Chrome),
            "firefox" => Ok(Self::Firefox),
            other => Err(format!("unknown browser: {}", other)),
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chrome => f.write_str("chrome"),
            Self::Firefox => f.write_str("firefox"),
        }
    }
}

/// New-session capabilities for a headless browser.
fn capabilities(kind: BrowserKind, page_timeout: Duration) -> Value {
    let mut always = json!({
        "browserName": kind.to_string(),
        "pageLoadStrategy": "normal",
        "timeouts": { "pageLoad": page_timeout.as_millis() as u64 },
    });

    match kind {
        BrowserKind::Chrome => {
            always["goog:chromeOptions"] = json!({
                "args": ["--headless=new", "--no-sandbox", "--disable-gpu", "--disable-dev-shm-usage"]
            });
        }
        BrowserKind::Firefox => {
            always["moz:firefoxOptions"] = json!({ "args": ["-headless"] });
        }
    }

    json!({ "capabilities": { "alwaysMatch": always } })
}

#[derive(Deserialize)]
struct Envelope {
    value: Value,
}

#[derive(Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSession {
    session_id: String,
}

/// Map a WebDriver error payload onto a probe error.
fn wire_error(value: Value, timeout: Duration) -> ProbeError {
    match serde_json::from_value::<WireError>(value) {
        Ok(e) if e.error == "timeout" => ProbeError::Timeout(timeout),
        Ok(e) => ProbeError::Browser(format!("{}: {}", e.error, e.message)),
        Err(_) => ProbeError::Browser("malformed WebDriver error".to_string()),
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    client: reqwest::Client,
    base: String,
}

impl Endpoint {
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, ProbeError> {
        let url = format!("{}{}", self.base, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(COMMAND_TIMEOUT)
            } else {
                ProbeError::Browser(format!("WebDriver unreachable at {}: {}", self.base, e))
            }
        })?;

        let status = response.status();
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| ProbeError::Browser(format!("invalid WebDriver response: {}", e)))?;

        if !status.is_success() {
            return Err(wire_error(envelope.value, timeout));
        }

        Ok(envelope.value)
    }
}

/// Headless browser reached through a WebDriver server.
#[derive(Debug, Clone)]
pub struct WebDriverBrowser {
    endpoint: Endpoint,
    kind: BrowserKind,
    page_timeout: Duration,
}

impl WebDriverBrowser {
    pub fn new(base_url: &str, kind: BrowserKind, page_timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(COMMAND_TIMEOUT)
            .build()
            .map_err(|e| ProbeError::Config(e.to_string()))?;

        Ok(Self {
            endpoint: Endpoint {
                client,
                base: base_url.trim_end_matches('/').to_string(),
            },
            kind,
            page_timeout,
        })
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, ProbeError> {
        let value = self
            .endpoint
            .command(
                Method::POST,
                "/session",
                Some(capabilities(self.kind, self.page_timeout)),
                self.page_timeout,
            )
            .await?;

        let session: NewSession = serde_json::from_value(value)
            .map_err(|e| ProbeError::Browser(format!("no session id in response: {}", e)))?;

        tracing::debug!("Opened {} session {}", self.kind, session.session_id);

        Ok(Box::new(WebDriverSession {
            endpoint: self.endpoint.clone(),
            id: session.session_id,
            closed: false,
        }))
    }
}

/// A live WebDriver session. Deleted on `close`, or on drop as a fallback.
pub struct WebDriverSession {
    endpoint: Endpoint,
    id: String,
    closed: bool,
}

impl WebDriverSession {
    fn path(&self, command: &str) -> String {
        format!("/session/{}{}", self.id, command)
    }

    async fn get_string(&self, command: &str, timeout: Duration) -> Result<String, ProbeError> {
        let value = self
            .endpoint
            .command(Method::GET, &self.path(command), None, timeout)
            .await?;
        match value {
            Value::String(s) => Ok(s),
            Value::Null => Ok(String::new()),
            other => Err(ProbeError::Browser(format!("expected string, got {}", other))),
        }
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn load(&mut self, url: &str, timeout: Duration) -> Result<PageSnapshot, ProbeError> {
        self.endpoint
            .command(
                Method::POST,
                &self.path("/timeouts"),
                Some(json!({ "pageLoad": timeout.as_millis() as u64 })),
                timeout,
            )
            .await?;

        self.endpoint
            .command(Method::POST, &self.path("/url"), Some(json!({ "url": url })), timeout)
            .await?;

        let title = self.get_string("/title", timeout).await?;
        let source = self.get_string("/source", timeout).await?;

        Ok(PageSnapshot { title, source })
    }

    async fn close(&mut self) -> Result<(), ProbeError> {
        if self.closed {
            return Ok(());
        }

        // Left unset on failure so a later close or drop retries the delete
        self.endpoint
            .command(Method::DELETE, &format!("/session/{}", self.id), None, COMMAND_TIMEOUT)
            .await?;
        self.closed = true;
        tracing::debug!("Closed session {}", self.id);
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        // Dropped mid-flight (e.g. the run was cancelled): delete in the background
        let endpoint = self.endpoint.clone();
        let path = format!("/session/{}", self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = endpoint
                        .command(Method::DELETE, &path, None, COMMAND_TIMEOUT)
                        .await
                    {
                        tracing::warn!("Failed to delete abandoned session {}: {}", path, e);
                    }
                });
            }
            Err(_) => tracing::warn!("Leaking WebDriver session {}: no runtime to delete it", self.id),
        }
    }
}
