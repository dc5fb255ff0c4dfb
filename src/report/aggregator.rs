//! Runs every probe against every target and folds the results into a report.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;

use super::models::*;
use crate::history::{jitter, HistoryStore};
use crate::probe::{
    with_deadline, CertificateProber, EchoStats, HttpOutcome, HttpProber, IcmpProber, ProbeError,
    SyntheticRunner, Transaction,
};
use crate::registry::{NetworkTarget, Registry, ServiceTarget, SyntheticTarget};

/// Outer bound on one ICMP batch (3 echoes at 2s plus the pauses between them).
const PING_DEADLINE: Duration = Duration::from_secs(12);

/// Outer bound on one HTTP GET, body included.
const HTTP_DEADLINE: Duration = Duration::from_secs(10);

/// Outer bound on connect plus handshake for the certificate probe.
const TLS_DEADLINE: Duration = Duration::from_secs(25);

/// The probe implementations a run dispatches to.
#[derive(Clone)]
pub struct Probers {
    pub icmp: Arc<dyn IcmpProber>,
    pub http: Arc<dyn HttpProber>,
    pub tls: Arc<dyn CertificateProber>,
    pub synthetic: SyntheticRunner,
}

/// Turns a registry into a report, one run at a time.
pub struct Aggregator {
    registry: Arc<Registry>,
    probers: Probers,
    concurrency: usize,
}

impl Aggregator {
    pub fn new(registry: Registry, probers: Probers, concurrency: usize) -> Self {
        Self {
            registry: Arc::new(registry),
            probers,
            concurrency: concurrency.max(1),
        }
    }

    /// Probe every target once.
    ///
    /// Groups run side by side and targets within a group run on a bounded
    /// pool. History is folded in afterwards, sequentially, so `history` has
    /// exactly one writer. A failing target never affects the others.
    pub async fn run(&self, history: &mut HistoryStore) -> Report {
        tracing::info!("Sentinel scan started ({} targets)", self.registry.len());

        let (pings, services, synthetic) = tokio::join!(
            self.probe_network(),
            self.probe_services(),
            self.probe_synthetic(),
        );

        let network = self
            .registry
            .network
            .iter()
            .zip(pings)
            .map(|(target, outcome)| network_result(target, outcome, history))
            .collect();

        Report {
            network,
            services,
            synthetic,
            updated: Utc::now(),
        }
    }

    async fn probe_network(&self) -> Vec<Result<EchoStats, ProbeError>> {
        let icmp = self.probers.icmp.clone();
        self.fan_out(&self.registry.network, move |target: NetworkTarget| {
            let icmp = icmp.clone();
            async move { with_deadline(PING_DEADLINE, icmp.ping(&target.address)).await }
        })
        .await
        .into_iter()
        .map(|r| r.and_then(|inner| inner))
        .collect()
    }

    async fn probe_services(&self) -> Vec<ServiceResult> {
        let http = self.probers.http.clone();
        let tls = self.probers.tls.clone();
        let outcomes = self
            .fan_out(&self.registry.services, move |target: ServiceTarget| {
                let http = http.clone();
                let tls = tls.clone();
                async move {
                    let response = with_deadline(HTTP_DEADLINE, http.get(&target.url)).await;
                    let days = with_deadline(TLS_DEADLINE, tls.days_remaining(&target.url)).await;
                    (response, days)
                }
            })
            .await;

        self.registry
            .services
            .iter()
            .zip(outcomes)
            .map(|(target, outcome)| {
                let (response, days) = match outcome {
                    Ok(pair) => pair,
                    Err(e) => (Err(ProbeError::Task(e.to_string())), Err(e)),
                };
                service_result(target, response, days)
            })
            .collect()
    }

    async fn probe_synthetic(&self) -> Vec<SyntheticResult> {
        let runner = self.probers.synthetic.clone();
        let outcomes = self
            .fan_out(&self.registry.synthetic, move |target: SyntheticTarget| {
                let runner = runner.clone();
                async move { runner.run(&target).await }
            })
            .await;

        self.registry
            .synthetic
            .iter()
            .zip(outcomes)
            .map(|(target, outcome)| synthetic_result(target, outcome.and_then(|inner| inner)))
            .collect()
    }

    /// Run `probe` for each target on at most `concurrency` tasks at a time.
    ///
    /// Results come back in target order. A task that panics yields a
    /// [`ProbeError::Task`] in its slot.
    async fn fan_out<T, R, F, Fut>(&self, targets: &[T], probe: F) -> Vec<Result<R, ProbeError>>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let handles: Vec<_> = targets
            .iter()
            .cloned()
            .map(|target| {
                let semaphore = semaphore.clone();
                let fut = probe(target);
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await; // Hold permit until done
                    fut.await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.map_err(|e| {
                tracing::error!("Probe task failed: {}", e);
                ProbeError::Task(e.to_string())
            }));
        }
        results
    }
}

fn network_result(
    target: &NetworkTarget,
    outcome: Result<EchoStats, ProbeError>,
    history: &mut HistoryStore,
) -> NetworkResult {
    let (latency, status) = match outcome {
        Ok(stats) => {
            tracing::debug!(
                "{}: {}/{} echo replies",
                target.name,
                stats.received,
                stats.transmitted
            );
            (stats.avg_rtt_ms, NetworkStatus::Online)
        }
        Err(e) => {
            tracing::debug!("Ping failed for {}: {}", target.name, e);
            (0.0, NetworkStatus::Offline)
        }
    };

    let window = history.record(&target.name, latency);
    let jitter = jitter(window);
    let window = window.to_vec();

    tracing::info!("NET: {:<15} | {} | {}ms", target.name, status, latency);

    NetworkResult {
        kind: NetTag::Net,
        name: target.name.clone(),
        origin: target.origin,
        dest: target.dest,
        status,
        latency,
        jitter,
        history: window,
        ip: target.address.clone(),
    }
}

fn service_result(
    target: &ServiceTarget,
    response: Result<HttpOutcome, ProbeError>,
    days: Result<i64, ProbeError>,
) -> ServiceResult {
    let (code, latency) = match response {
        Ok(outcome) => (outcome.status, outcome.latency_ms),
        Err(e) => {
            tracing::warn!("HTTP probe failed for {}: {}", target.name, e);
            (0, 0)
        }
    };

    let (ssl, ssl_valid) = match days {
        Ok(days) => (days, true),
        Err(e) => {
            tracing::warn!("Certificate probe failed for {}: {}", target.name, e);
            (0, false)
        }
    };

    let status = ServiceStatus::from_code(code);
    tracing::info!("SVC: {:<15} | HTTP {} | {}", target.name, code, status);

    ServiceResult {
        kind: SvcTag::Svc,
        name: target.name.clone(),
        url: target.url.clone(),
        status,
        code,
        latency,
        ssl,
        ssl_valid,
    }
}

fn synthetic_result(
    target: &SyntheticTarget,
    outcome: Result<Transaction, ProbeError>,
) -> SyntheticResult {
    let (status, latency, error) = match outcome {
        Ok(t) if t.passed => (SyntheticStatus::Pass, t.elapsed_ms, None),
        Ok(t) => (SyntheticStatus::Fail, t.elapsed_ms, None),
        Err(e) => {
            tracing::warn!("Synthetic check failed for {}: {}", target.name, e);
            (SyntheticStatus::Error, 0, Some(e.to_string()))
        }
    };

    tracing::info!("SYN: {:<15} | {} | {}ms", target.name, status, latency);

    SyntheticResult {
        name: target.name.clone(),
        status,
        latency,
        url: target.url.clone(),
        error,
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! Scripted probers for aggregator tests.

    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Pings answer from a table; unknown addresses are unreachable.
    /// An address mapped to `None` panics, to exercise task isolation.
    #[derive(Default)]
    pub struct ScriptedPinger(pub HashMap<String, Option<f64>>);

    #[async_trait]
    impl IcmpProber for ScriptedPinger {
        async fn ping(&self, address: &str) -> Result<EchoStats, ProbeError> {
            match self.0.get(address) {
                Some(Some(ms)) => Ok(EchoStats {
                    transmitted: 3,
                    received: 3,
                    avg_rtt_ms: *ms,
                }),
                Some(None) => panic!("pinger blew up on {address}"),
                None => Err(ProbeError::Timeout(Duration::from_secs(2))),
            }
        }
    }

    /// HTTP status per URL; unknown URLs fail to connect.
    #[derive(Default)]
    pub struct ScriptedHttp(pub HashMap<String, u16>);

    #[async_trait]
    impl HttpProber for ScriptedHttp {
        async fn get(&self, url: &str) -> Result<HttpOutcome, ProbeError> {
            self.0
                .get(url)
                .map(|&status| HttpOutcome {
                    status,
                    latency_ms: 42,
                })
                .ok_or_else(|| ProbeError::Network("connection refused".to_string()))
        }
    }

    /// Days per URL; unknown URLs fail the handshake.
    #[derive(Default)]
    pub struct ScriptedCerts(pub HashMap<String, i64>);

    #[async_trait]
    impl CertificateProber for ScriptedCerts {
        async fn days_remaining(&self, url: &str) -> Result<i64, ProbeError> {
            self.0
                .get(url)
                .copied()
                .ok_or_else(|| ProbeError::Tls("handshake failed".to_string()))
        }
    }
}
