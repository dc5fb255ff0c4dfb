//! TLS certificate expiry probe.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::{with_deadline, CertificateProber, ProbeError};

/// Bound on TCP connect and, separately, on the TLS handshake.
pub const TLS_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads the peer certificate's `notAfter` over a verified TLS handshake.
///
/// Trust anchors are the Mozilla roots from `webpki-roots`; a certificate the
/// client rejects (expired, wrong host, unknown issuer) fails the probe.
#[derive(Clone)]
pub struct RustlsCertProber {
    connector: TlsConnector,
    timeout: Duration,
}

impl RustlsCertProber {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_roots(root_store, timeout)
    }

    /// Verify peers against `root_store` instead of the Mozilla roots.
    pub fn with_roots(root_store: rustls::RootCertStore, timeout: Duration) -> Result<Self, ProbeError> {
        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Config(format!("tls protocol version error: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout,
        })
    }
}

#[async_trait]
impl CertificateProber for RustlsCertProber {
    async fn days_remaining(&self, url: &str) -> Result<i64, ProbeError> {
        let (host, port) = host_and_port(url)?;

        let server_name = ServerName::try_from(host.as_str())
            .map_err(|e| ProbeError::Config(format!("invalid server name {host}: {e}")))?
            .to_owned();

        let stream = with_deadline(self.timeout, async {
            TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|e| ProbeError::Network(format!("connect to {host}:{port} failed: {e}")))
        })
        .await?;

        let tls = with_deadline(self.timeout, async {
            self.connector
                .connect(server_name, stream)
                .await
                .map_err(|e| ProbeError::Tls(e.to_string()))
        })
        .await?;

        let (_, conn) = tls.get_ref();
        let leaf = conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| ProbeError::Certificate("peer sent no certificate".to_string()))?;

        let (_, cert) = x509_parser::parse_x509_certificate(leaf.as_ref())
            .map_err(|e| ProbeError::Certificate(format!("unparseable certificate: {e}")))?;

        let not_after = cert.validity().not_after.timestamp();
        let expiry = DateTime::from_timestamp(not_after, 0)
            .ok_or_else(|| ProbeError::Certificate(format!("notAfter out of range: {not_after}")))?;

        Ok(days_until(expiry, Utc::now()))
    }
}

/// Host and port for the TLS connection; port 443 unless the URL names one.
fn host_and_port(url: &str) -> Result<(String, u16), ProbeError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ProbeError::Config(format!("invalid URL {url}: {e}")))?;

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ProbeError::Config(format!("URL has no host: {url}")))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();

    Ok((host, parsed.port().unwrap_or(443)))
}

/// Whole days from `now` to `expiry`, truncated toward zero.
fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_days()
}
