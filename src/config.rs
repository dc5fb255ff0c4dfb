//! Configuration module for NetSentinel.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::probe::BrowserKind;

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Where the health report is written (default: "network_health.json")
    pub output_path: PathBuf,
    /// Where the rolling latency history is kept (default: "latency_history.json")
    pub history_path: PathBuf,
    /// Optional JSON target registry; the built-in list is used when unset
    pub targets_path: Option<PathBuf>,
    /// WebDriver endpoint for synthetic checks (default: "http://localhost:9515")
    pub webdriver_url: String,
    /// Headless browser requested from the WebDriver endpoint
    pub browser: BrowserKind,
    /// Concurrent probes per target group (default: 8)
    pub concurrency: usize,
    /// Delay between runs; `None` runs once and exits
    pub interval: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("network_health.json"),
            history_path: PathBuf::from("latency_history.json"),
            targets_path: None,
            webdriver_url: "http://localhost:9515".to_string(),
            browser: BrowserKind::Chrome,
            concurrency: 8,
            interval: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `NETSENTINEL_OUTPUT_PATH`: report file (default: "network_health.json")
    /// - `NETSENTINEL_HISTORY_PATH`: history file (default: "latency_history.json")
    /// - `NETSENTINEL_TARGETS_PATH`: JSON registry file (default: built-in targets)
    /// - `NETSENTINEL_WEBDRIVER_URL`: WebDriver endpoint (default: "http://localhost:9515")
    /// - `NETSENTINEL_BROWSER`: "chrome" or "firefox" (default: "chrome")
    /// - `NETSENTINEL_CONCURRENCY`: probes in flight per group (default: 8)
    /// - `NETSENTINEL_INTERVAL_SECS`: seconds between runs, 0 for a single run (default: 0)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(path) = lookup("NETSENTINEL_OUTPUT_PATH") {
            cfg.output_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("NETSENTINEL_HISTORY_PATH") {
            cfg.history_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("NETSENTINEL_TARGETS_PATH") {
            if !path.is_empty() {
                cfg.targets_path = Some(PathBuf::from(path));
            }
        }

        if let Some(url) = lookup("NETSENTINEL_WEBDRIVER_URL") {
            cfg.webdriver_url = url;
        }

        if let Some(browser) = lookup("NETSENTINEL_BROWSER") {
            match browser.parse() {
                Ok(kind) => cfg.browser = kind,
                Err(e) => tracing::warn!("Ignoring NETSENTINEL_BROWSER: {}", e),
            }
        }

        if let Some(n) = lookup("NETSENTINEL_CONCURRENCY") {
            if let Ok(n) = n.parse::<usize>() {
                cfg.concurrency = n.max(1);
            }
        }

        if let Some(secs) = lookup("NETSENTINEL_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                cfg.interval = (secs > 0).then(|| Duration::from_secs(secs));
            }
        }

        cfg
    }
}
