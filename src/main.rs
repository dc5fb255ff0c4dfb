//! NetSentinel - network and service health probing agent.
//!
//! Pings network endpoints, checks HTTP services and their certificates,
//! drives synthetic browser checks, and writes one JSON health snapshot.

mod config;
mod history;
mod probe;
mod registry;
mod report;

use config::AgentConfig;
use probe::{
    NativePinger, PingConfig, ReqwestProber, RustlsCertProber, SyntheticRunner, WebDriverBrowser, HTTP_TIMEOUT,
    PAGE_LOAD_TIMEOUT, TLS_TIMEOUT,
};
use registry::Registry;
use report::{Aggregator, Probers};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("netsentinel=info".parse()?))
        .init();

    // Load configuration
    let cfg = AgentConfig::load();
    tracing::info!("Writing report to {}", cfg.output_path.display());
    tracing::info!("Using history at {}", cfg.history_path.display());

    let registry = match &cfg.targets_path {
        Some(path) => {
            tracing::info!("Loading targets from {}", path.display());
            Registry::from_file(path)?
        }
        None => Registry::default(),
    };

    let probers = build_probers(&cfg)?;
    let aggregator = Aggregator::new(registry, probers, cfg.concurrency);

    let Some(period) = cfg.interval else {
        report::run_once(&aggregator, &cfg.history_path, &cfg.output_path).await?;
        return Ok(());
    };

    tracing::info!("Running every {:?}, Ctrl-C to stop", period);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            _ = interval.tick() => {
                // The run completes before Ctrl-C is polled again
                if let Err(e) = report::run_once(&aggregator, &cfg.history_path, &cfg.output_path).await {
                    tracing::error!("Run failed: {}", e);
                }
            }
        }
    }

    Ok(())
}

fn build_probers(cfg: &AgentConfig) -> Result<Probers, probe::ProbeError> {
    let browser = WebDriverBrowser::new(&cfg.webdriver_url, cfg.browser, PAGE_LOAD_TIMEOUT)?;

    Ok(Probers {
        icmp: Arc::new(NativePinger::new(PingConfig::default())),
        http: Arc::new(ReqwestProber::new(HTTP_TIMEOUT)?),
        tls: Arc::new(RustlsCertProber::new(TLS_TIMEOUT)?),
        synthetic: SyntheticRunner::new(Arc::new(browser), PAGE_LOAD_TIMEOUT),
    })
}
