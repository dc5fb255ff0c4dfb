//! Probe module for network monitoring.
//!
//! Supports ICMP ping, HTTP, TLS certificate and synthetic browser probes.
//! Every prober returns a typed `Result`; turning failures into report
//! sentinels is the aggregator's job.

mod http;
mod ping;
mod synthetic;
mod tls;
mod webdriver;

pub use http::*;
pub use ping::*;
pub use synthetic::*;
pub use tls::*;
pub use webdriver::*;

#[cfg(test)]
pub(crate) use synthetic::fake;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("certificate error: {0}")]
    Certificate(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("probe task failed: {0}")]
    Task(String),
}

/// ICMP reachability.
#[async_trait]
pub trait IcmpProber: Send + Sync {
    /// Send a batch of echo requests to `address` (IP or hostname).
    ///
    /// Errors when no reply came back at all.
    async fn ping(&self, address: &str) -> Result<EchoStats, ProbeError>;
}

/// HTTP status and latency.
#[async_trait]
pub trait HttpProber: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpOutcome, ProbeError>;
}

/// TLS certificate expiry.
#[async_trait]
pub trait CertificateProber: Send + Sync {
    /// Whole days until the peer certificate of `url` expires.
    async fn days_remaining(&self, url: &str) -> Result<i64, ProbeError>;
}

/// Bound a probe future by `limit`, turning expiry into a [`ProbeError::Timeout`].
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ProbeError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_expires() {
        let result: Result<(), _> = with_deadline(Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ProbeError::Timeout(d)) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_deadline_passes_through() {
        let ok = with_deadline(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<(), _> = with_deadline(Duration::from_secs(1), async {
            Err(ProbeError::Network("refused".into()))
        })
        .await;
        assert!(matches!(err, Err(ProbeError::Network(_))));
    }
}
