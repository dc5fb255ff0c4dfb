//! Report model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::registry::Coordinates;

/// Reachability of a network target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkStatus {
    Online,
    Offline,
}

/// Health of an HTTP service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    Online,
    Critical,
}

impl ServiceStatus {
    /// Exactly 200 is healthy; anything else, including 0 for no response, is not.
    pub fn from_code(code: u16) -> Self {
        if code == 200 {
            Self::Online
        } else {
            Self::Critical
        }
    }
}

/// Outcome of a synthetic transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyntheticStatus {
    /// Page loaded and the assertion held
    Pass,
    /// Page loaded and the assertion did not hold
    Fail,
    /// The browser session itself failed
    Error,
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
        })
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Online => "ONLINE",
            Self::Critical => "CRITICAL",
        })
    }
}

impl fmt::Display for SyntheticStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
        })
    }
}

/// Tag carried by network entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetTag {
    #[serde(rename = "NET")]
    Net,
}

/// Tag carried by service entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SvcTag {
    #[serde(rename = "SVC")]
    Svc,
}

/// One network target's line in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkResult {
    #[serde(rename = "type")]
    pub kind: NetTag,
    pub name: String,
    pub origin: Coordinates,
    pub dest: Coordinates,
    pub status: NetworkStatus,
    /// Average round trip in ms, 0 when offline
    pub latency: f64,
    pub jitter: f64,
    /// Trimmed latency window, oldest first
    pub history: Vec<f64>,
    pub ip: String,
}

/// One service target's line in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResult {
    #[serde(rename = "type")]
    pub kind: SvcTag,
    pub name: String,
    pub url: String,
    pub status: ServiceStatus,
    /// HTTP status, 0 when no response arrived
    pub code: u16,
    pub latency: u64,
    /// Days until certificate expiry, 0 when the TLS probe failed
    pub ssl: i64,
    /// Whether `ssl` came from a certificate at all
    pub ssl_valid: bool,
}

/// One synthetic target's line in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticResult {
    pub name: String,
    pub status: SyntheticStatus,
    /// Elapsed ms, 0 on error
    pub latency: u64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point-in-time health snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub network: Vec<NetworkResult>,
    pub services: Vec<ServiceResult>,
    pub synthetic: Vec<SyntheticResult>,
    pub updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_service_status_from_code() {
        assert_eq!(ServiceStatus::from_code(200), ServiceStatus::Online);
        assert_eq!(ServiceStatus::from_code(0), ServiceStatus::Critical);
        assert_eq!(ServiceStatus::from_code(204), ServiceStatus::Critical);
        assert_eq!(ServiceStatus::from_code(301), ServiceStatus::Critical);
        assert_eq!(ServiceStatus::from_code(503), ServiceStatus::Critical);
    }

    #[test]
    fn test_status_display_matches_wire() {
        for status in [NetworkStatus::Online, NetworkStatus::Offline] {
            assert_eq!(serde_json::to_value(status).unwrap(), json!(status.to_string()));
        }
        for status in [SyntheticStatus::Pass, SyntheticStatus::Fail, SyntheticStatus::Error] {
            assert_eq!(serde_json::to_value(status).unwrap(), json!(status.to_string()));
        }
        assert_eq!(ServiceStatus::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn test_report_shape() {
        let report = Report {
            network: vec![NetworkResult {
                kind: NetTag::Net,
                name: "Google DNS (US)".to_string(),
                origin: [31.3113, -92.4451],
                dest: [37.40, -122.07],
                status: NetworkStatus::Online,
                latency: 12.5,
                jitter: 1.25,
                history: vec![11.0, 12.5],
                ip: "8.8.8.8".to_string(),
            }],
            services: vec![ServiceResult {
                kind: SvcTag::Svc,
                name: "GITHUB API".to_string(),
                url: "https://api.github.com".to_string(),
                status: ServiceStatus::Online,
                code: 200,
                latency: 87,
                ssl: 45,
                ssl_valid: true,
            }],
            synthetic: vec![SyntheticResult {
                name: "GITHUB HOME".to_string(),
                status: SyntheticStatus::Pass,
                latency: 1500,
                url: "https://github.com".to_string(),
                error: None,
            }],
            updated: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["network"][0]["type"], "NET");
        assert_eq!(value["network"][0]["status"], "ONLINE");
        assert_eq!(value["network"][0]["origin"], json!([31.3113, -92.4451]));
        assert_eq!(value["network"][0]["ip"], "8.8.8.8");
        assert_eq!(value["services"][0]["type"], "SVC");
        assert_eq!(value["services"][0]["ssl"], 45);
        assert_eq!(value["synthetic"][0]["status"], "PASS");
        assert!(value["synthetic"][0].get("error").is_none());
        assert_eq!(value["updated"], "2024-05-01T08:30:00Z");

        let back: Report = serde_json::from_value(value).unwrap();
        assert_eq!(back, report);
    }
}
