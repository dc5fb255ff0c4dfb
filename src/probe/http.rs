//! HTTP probe implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{HttpProber, ProbeError};

/// Timeout for a single service request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Status code and wall-clock latency of one GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpOutcome {
    pub status: u16,
    /// Request start to body fully read, in whole milliseconds
    pub latency_ms: u64,
}

/// HTTP prober backed by a shared `reqwest` client.
///
/// Redirects are followed by the client; the reported status is the final one.
#[derive(Debug, Clone)]
pub struct ReqwestProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestProber {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("netsentinel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Config(e.to_string()))?;

        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl HttpProber for ReqwestProber {
    async fn get(&self, url: &str) -> Result<HttpOutcome, ProbeError> {
        let start = Instant::now();

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        // Read the full body to measure complete transfer time
        let _body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

        Ok(HttpOutcome {
            status,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `response` verbatim to every connection.
    async fn serve(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_http_probe_ok() {
        let url = serve("HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok").await;
        let prober = ReqwestProber::new(HTTP_TIMEOUT).unwrap();

        let outcome = prober.get(&url).await.unwrap();
        assert_eq!(outcome.status, 200);
        assert!(outcome.latency_ms < HTTP_TIMEOUT.as_millis() as u64);
    }

    #[tokio::test]
    async fn test_http_probe_server_error_is_not_a_failure() {
        let url = serve("HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let prober = ReqwestProber::new(HTTP_TIMEOUT).unwrap();

        let outcome = prober.get(&url).await.unwrap();
        assert_eq!(outcome.status, 503);
    }

    #[tokio::test]
    async fn test_http_probe_invalid_url() {
        let prober = ReqwestProber::new(Duration::from_millis(100)).unwrap();
        let result = prober.get("http://256.256.256.256").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_http_probe_requires_scheme() {
        let prober = ReqwestProber::new(Duration::from_millis(100)).unwrap();
        let result = prober.get("example.com").await;
        assert!(matches!(result, Err(ProbeError::Network(_))));
    }

    #[tokio::test]
    async fn test_http_probe_timeout() {
        // Accepts but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let prober = ReqwestProber::new(Duration::from_millis(200)).unwrap();
        let result = prober.get(&format!("http://{}/", addr)).await;
        assert!(matches!(result, Err(ProbeError::Timeout(_))));
    }
}
