//! Monitoring target types.

use serde::{Deserialize, Serialize};

/// Geographic coordinates as `[lat, lon]`.
pub type Coordinates = [f64; 2];

/// An endpoint probed with ICMP echo requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkTarget {
    pub name: String,
    /// IP address or hostname
    #[serde(rename = "ip")]
    pub address: String,
    /// Where the probe is sent from, filled from the registry origin
    #[serde(default)]
    pub origin: Coordinates,
    #[serde(rename = "coords")]
    pub dest: Coordinates,
}

/// An HTTP(S) service checked for status code, latency and certificate expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceTarget {
    pub name: String,
    pub url: String,
}

/// What a synthetic transaction checks once the page has loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Assertion {
    /// The expected text must occur in the page title.
    Title,
    /// The expected text must occur anywhere in the rendered page source.
    BodyText,
}

/// A browser-driven page load with a content assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticTarget {
    pub name: String,
    pub url: String,
    #[serde(rename = "assert")]
    pub assertion: Assertion,
    #[serde(rename = "expect")]
    pub expected: String,
}

impl SyntheticTarget {
    /// Check the assertion against a loaded page.
    pub fn holds(&self, title: &str, source: &str) -> bool {
        match self.assertion {
            Assertion::Title => title.contains(&self.expected),
            Assertion::BodyText => source.contains(&self.expected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(assertion: Assertion, expected: &str) -> SyntheticTarget {
        SyntheticTarget {
            name: "home".to_string(),
            url: "https://example.com".to_string(),
            assertion,
            expected: expected.to_string(),
        }
    }

    #[test]
    fn test_title_assertion() {
        let t = synthetic(Assertion::Title, "GitHub");
        assert!(t.holds("GitHub: Let's build from here", ""));
        assert!(!t.holds("Sign in", "<h1>GitHub</h1>"));
    }

    #[test]
    fn test_body_text_assertion() {
        let t = synthetic(Assertion::BodyText, "All systems operational");
        assert!(t.holds("", "<p>All systems operational</p>"));
        assert!(!t.holds("All systems operational", "<p>Degraded</p>"));
    }

    #[test]
    fn test_assertion_serde_names() {
        assert_eq!(serde_json::to_string(&Assertion::BodyText).unwrap(), "\"body-text\"");
        let a: Assertion = serde_json::from_str("\"title\"").unwrap();
        assert_eq!(a, Assertion::Title);
    }
}
