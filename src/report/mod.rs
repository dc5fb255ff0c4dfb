//! Report module.
//!
//! Aggregates probe results into a [`Report`] and writes it out.

mod aggregator;
mod models;
mod writer;

pub use aggregator::*;
pub use models::*;
pub use writer::*;

use std::path::Path;

use crate::history::HistoryStore;

/// One full agent run: load history, probe everything, persist both files.
///
/// A failed history save is logged and the run continues; only a report
/// that cannot be written is returned as an error.
pub async fn run_once(
    aggregator: &Aggregator,
    history_path: &Path,
    output_path: &Path,
) -> Result<Report, ReportError> {
    let mut history = HistoryStore::load(history_path);

    let report = aggregator.run(&mut history).await;

    if let Err(e) = history.save() {
        tracing::error!("Failed to save history to {}: {}", history_path.display(), e);
    }

    write_report(output_path, &report)?;

    let online = report
        .network
        .iter()
        .filter(|r| r.status == NetworkStatus::Online)
        .count();
    tracing::info!(
        "Report written to {}: {}/{} network online, {} services, {} synthetic",
        output_path.display(),
        online,
        report.network.len(),
        report.services.len(),
        report.synthetic.len()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::aggregator::fakes::*;
    use super::*;
    use crate::probe::fake::FakeBrowser;
    use crate::probe::{SyntheticRunner, PAGE_LOAD_TIMEOUT};
    use crate::registry::{NetworkTarget, Registry};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn aggregator() -> Aggregator {
        let target = |name: &str, ip: &str| NetworkTarget {
            name: name.to_string(),
            address: ip.to_string(),
            origin: [0.0, 0.0],
            dest: [1.0, 1.0],
        };
        let registry = Registry::new(
            vec![target("core", "10.0.0.1"), target("edge", "10.0.0.2")],
            vec![],
            vec![],
        )
        .unwrap();

        let probers = Probers {
            icmp: Arc::new(ScriptedPinger(HashMap::from([("10.0.0.1".to_string(), Some(15.0))]))),
            http: Arc::new(ScriptedHttp::default()),
            tls: Arc::new(ScriptedCerts::default()),
            synthetic: SyntheticRunner::new(Arc::new(FakeBrowser::default()), PAGE_LOAD_TIMEOUT),
        };

        Aggregator::new(registry, probers, 4)
    }

    #[tokio::test]
    async fn test_run_once_persists_history_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("latency_history.json");
        let output_path = dir.path().join("network_health.json");

        let prior: Vec<f64> = (0..9).map(|i| 10.0 + i as f64).collect();
        std::fs::write(&history_path, serde_json::to_vec(&HashMap::from([("core", prior.clone())])).unwrap()).unwrap();

        let report = assert_ok!(run_once(&aggregator(), &history_path, &output_path).await);
        assert_eq!(report.network[0].history.len(), 10);

        let saved: HashMap<String, Vec<f64>> =
            serde_json::from_slice(&std::fs::read(&history_path).unwrap()).unwrap();
        let mut expected = prior;
        expected.push(15.0);
        assert_eq!(saved["core"], expected);
        assert_eq!(saved["edge"], vec![0.0]);

        // One more run drops the oldest original sample
        assert_ok!(run_once(&aggregator(), &history_path, &output_path).await);
        let saved: HashMap<String, Vec<f64>> =
            serde_json::from_slice(&std::fs::read(&history_path).unwrap()).unwrap();
        assert_eq!(saved["core"].len(), 10);
        assert_eq!(saved["core"][0], 11.0);

        let written: Report = serde_json::from_slice(&std::fs::read(&output_path).unwrap()).unwrap();
        assert_eq!(written.network.len(), 2);
        assert_eq!(written.network[1].status, NetworkStatus::Offline);
    }

    #[tokio::test]
    async fn test_run_once_survives_corrupt_history() {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("latency_history.json");
        let output_path = dir.path().join("network_health.json");
        std::fs::write(&history_path, b"[garbage").unwrap();

        let report = assert_ok!(run_once(&aggregator(), &history_path, &output_path).await);
        assert_eq!(report.network[0].history, vec![15.0]);
    }

    #[tokio::test]
    async fn test_unwritable_report_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("latency_history.json");
        let output_path = dir.path().join("missing").join("network_health.json");

        let err = assert_err!(run_once(&aggregator(), &history_path, &output_path).await);
        assert!(matches!(err, ReportError::Io(_)));
        // History still saved even though the report was not
        assert!(history_path.exists());
    }
}
