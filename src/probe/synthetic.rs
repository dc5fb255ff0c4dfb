//! Synthetic transaction probe.
//!
//! Loads a page in a headless browser session and evaluates the target's
//! assertion against it. The session is closed on every exit path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{with_deadline, ProbeError};
use crate::registry::SyntheticTarget;

/// Page-load budget for one transaction.
pub const PAGE_LOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// Budget for starting a browser session.
const OPEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Budget for tearing a session down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack on top of the page-load budget before we stop waiting on the browser.
const LOAD_GRACE: Duration = Duration::from_secs(5);

/// What a loaded page looks like to an assertion.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub title: String,
    /// Rendered page source
    pub source: String,
}

/// A headless browser able to start sessions.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, ProbeError>;
}

/// One live browser session.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to `url`, waiting at most `timeout` for the load to finish.
    async fn load(&mut self, url: &str, timeout: Duration) -> Result<PageSnapshot, ProbeError>;

    /// Release the session and its browser process.
    async fn close(&mut self) -> Result<(), ProbeError>;
}

/// Outcome of a transaction whose page loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transaction {
    pub passed: bool,
    /// Just before navigation to just after the assertion, in milliseconds
    pub elapsed_ms: u64,
}

/// Runs synthetic targets against a [`Browser`], one session per target.
#[derive(Clone)]
pub struct SyntheticRunner {
    browser: Arc<dyn Browser>,
    page_timeout: Duration,
}

impl SyntheticRunner {
    pub fn new(browser: Arc<dyn Browser>, page_timeout: Duration) -> Self {
        Self {
            browser,
            page_timeout,
        }
    }

    /// Run one transaction.
    ///
    /// `Ok` means the page loaded and the assertion was evaluated; `Err`
    /// means the browser session itself failed.
    pub async fn run(&self, target: &SyntheticTarget) -> Result<Transaction, ProbeError> {
        let mut session = with_deadline(OPEN_TIMEOUT, self.browser.open()).await?;

        let outcome = self.drive(session.as_mut(), target).await;

        match with_deadline(CLOSE_TIMEOUT, session.close()).await {
            Ok(()) => {}
            Err(e) => tracing::warn!("Failed to close browser session for {}: {}", target.name, e),
        }

        outcome
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        target: &SyntheticTarget,
    ) -> Result<Transaction, ProbeError> {
        let start = Instant::now();

        let page = with_deadline(
            self.page_timeout + LOAD_GRACE,
            session.load(&target.url, self.page_timeout),
        )
        .await?;

        let passed = target.holds(&page.title, &page.source);

        Ok(Transaction {
            passed,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}
