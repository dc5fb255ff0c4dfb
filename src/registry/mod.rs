//! Target registry.
//!
//! Holds the fixed set of network, service and synthetic targets for a run,
//! either the built-in list or one read from a JSON file.

mod models;

pub use models::*;

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Where the agent itself sits on the map.
pub const DEFAULT_ORIGIN: Coordinates = [31.3113, -92.4451];

/// Registry error types.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read registry: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid registry JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("target with empty name in {0} group")]
    EmptyName(&'static str),
    #[error("duplicate target name {name:?} in {group} group")]
    DuplicateName { group: &'static str, name: String },
}

/// Immutable set of targets handed to the aggregator.
#[derive(Debug, Clone)]
pub struct Registry {
    pub network: Vec<NetworkTarget>,
    pub services: Vec<ServiceTarget>,
    pub synthetic: Vec<SyntheticTarget>,
}

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    origin: Option<Coordinates>,
    #[serde(default)]
    network: Vec<NetworkEntry>,
    #[serde(default)]
    services: Vec<ServiceTarget>,
    #[serde(default)]
    synthetic: Vec<SyntheticTarget>,
}

/// A network target as written in a registry file; `origin` may be omitted.
#[derive(Deserialize)]
struct NetworkEntry {
    name: String,
    ip: String,
    origin: Option<Coordinates>,
    coords: Coordinates,
}

impl NetworkEntry {
    fn resolve(self, fallback: Coordinates) -> NetworkTarget {
        NetworkTarget {
            name: self.name,
            address: self.ip,
            origin: self.origin.unwrap_or(fallback),
            dest: self.coords,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        let net = |name: &str, ip: &str, dest: Coordinates| NetworkTarget {
            name: name.to_string(),
            address: ip.to_string(),
            origin: DEFAULT_ORIGIN,
            dest,
        };
        let svc = |name: &str, url: &str| ServiceTarget {
            name: name.to_string(),
            url: url.to_string(),
        };

        Self {
            network: vec![
                net("Google DNS (US)", "8.8.8.8", [37.40, -122.07]),
                net("AWS Virginia", "52.94.76.1", [38.03, -78.50]),
                net("Azure East", "13.107.21.200", [36.66, -78.39]),
                net("London Core", "151.101.192.81", [51.50, -0.12]),
                net("Tokyo Core", "172.217.25.14", [35.67, 139.76]),
            ],
            services: vec![
                svc("MY DASHBOARD", "https://beechem.site"),
                svc("GITHUB API", "https://api.github.com"),
            ],
            synthetic: vec![SyntheticTarget {
                name: "GITHUB HOME".to_string(),
                url: "https://github.com".to_string(),
                assertion: Assertion::Title,
                expected: "GitHub".to_string(),
            }],
        }
    }
}

impl Registry {
    /// Build a registry and check that names are usable as identities.
    pub fn new(
        network: Vec<NetworkTarget>,
        services: Vec<ServiceTarget>,
        synthetic: Vec<SyntheticTarget>,
    ) -> Result<Self, RegistryError> {
        check_names("network", network.iter().map(|t| t.name.as_str()))?;
        check_names("services", services.iter().map(|t| t.name.as_str()))?;
        check_names("synthetic", synthetic.iter().map(|t| t.name.as_str()))?;

        Ok(Self {
            network,
            services,
            synthetic,
        })
    }

    /// Load a registry from a JSON file.
    ///
    /// Network targets without an explicit `origin` get the file's top-level
    /// `origin`, or [`DEFAULT_ORIGIN`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    fn from_json(data: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_json::from_str(data)?;
        let origin = file.origin.unwrap_or(DEFAULT_ORIGIN);

        let network = file
            .network
            .into_iter()
            .map(|entry| entry.resolve(origin))
            .collect();

        Self::new(network, file.services, file.synthetic)
    }

    pub fn len(&self) -> usize {
        self.network.len() + self.services.len() + self.synthetic.len()
    }
}

fn check_names<'a>(
    group: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName(group));
        }
        if !seen.insert(name) {
            return Err(RegistryError::DuplicateName {
                group,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let reg = Registry::default();
        assert_eq!(reg.network.len(), 5);
        assert_eq!(reg.services.len(), 2);
        assert_eq!(reg.synthetic.len(), 1);
        assert_eq!(reg.len(), 8);
        assert!(reg.network.iter().all(|t| t.origin == DEFAULT_ORIGIN));

        // Built-in list must pass its own validation
        assert!(Registry::new(reg.network, reg.services, reg.synthetic).is_ok());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "origin": [1.0, 2.0],
            "network": [
                {"name": "dns", "ip": "1.1.1.1", "coords": [10.0, 20.0]},
                {"name": "edge", "ip": "9.9.9.9", "coords": [0.5, 0.5], "origin": [3.0, 4.0]}
            ],
            "services": [{"name": "api", "url": "https://api.example.com"}],
            "synthetic": [
                {"name": "home", "url": "https://example.com", "assert": "body-text", "expect": "Welcome"}
            ]
        }"#;

        let reg = Registry::from_json(json).unwrap();
        assert_eq!(reg.network[0].address, "1.1.1.1");
        assert_eq!(reg.network[0].origin, [1.0, 2.0]);
        assert_eq!(reg.network[0].dest, [10.0, 20.0]);
        assert_eq!(reg.network[1].origin, [3.0, 4.0]);
        assert_eq!(reg.services[0].name, "api");
        assert_eq!(reg.synthetic[0].assertion, Assertion::BodyText);
        assert_eq!(reg.synthetic[0].expected, "Welcome");
    }

    #[test]
    fn test_explicit_zero_origin_is_kept() {
        let json = r#"{
            "origin": [1.0, 2.0],
            "network": [{"name": "gulf", "ip": "1.1.1.1", "coords": [5.0, 5.0], "origin": [0.0, 0.0]}]
        }"#;

        let reg = Registry::from_json(json).unwrap();
        assert_eq!(reg.network[0].origin, [0.0, 0.0]);
    }

    #[test]
    fn test_missing_groups_are_empty() {
        let reg = Registry::from_json(r#"{"services": [{"name": "a", "url": "https://a"}]}"#).unwrap();
        assert!(reg.network.is_empty());
        assert!(reg.synthetic.is_empty());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let json = r#"{"network": [
            {"name": "dns", "ip": "1.1.1.1", "coords": [0, 0]},
            {"name": "dns", "ip": "8.8.8.8", "coords": [0, 0]}
        ]}"#;
        match Registry::from_json(json) {
            Err(RegistryError::DuplicateName { group, name }) => {
                assert_eq!(group, "network");
                assert_eq!(name, "dns");
            }
            other => panic!("expected duplicate name error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        let json = r#"{"services": [{"name": " ", "url": "https://a"}]}"#;
        assert!(matches!(
            Registry::from_json(json),
            Err(RegistryError::EmptyName("services"))
        ));
    }

    #[test]
    fn test_same_name_across_groups_allowed() {
        let json = r#"{
            "network": [{"name": "site", "ip": "1.1.1.1", "coords": [0, 0]}],
            "services": [{"name": "site", "url": "https://site"}]
        }"#;
        assert!(Registry::from_json(json).is_ok());
    }

    #[test]
    fn test_from_file_missing() {
        let err = Registry::from_file("/nonexistent/targets.json").unwrap_err();
        assert!(matches!(err, RegistryError::Io(_)));
    }
}
