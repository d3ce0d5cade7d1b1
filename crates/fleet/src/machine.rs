//! Machine record types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A networked machine tracked by hostname
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Machine {
    /// Unique identity of the machine
    #[serde(default)]
    pub hostname: String,

    /// Liveness flag, written by the health check engine
    #[serde(default)]
    pub active: bool,

    /// IPv4 address (descriptive only)
    #[serde(default)]
    pub ipv4: String,

    /// IPv6 address (descriptive only)
    #[serde(default)]
    pub ipv6: String,

    /// Free-form labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Machine {
    /// Create an inactive machine with no metadata
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Default::default()
        }
    }

    /// Set the liveness flag
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Check whether `field` of this machine equals `value`.
    ///
    /// `hostname`, `ipv4` and `ipv6` compare as strings, `active` parses
    /// `value` as a boolean (anything unparseable counts as `false`), and
    /// any other field name is looked up in the labels.
    pub fn matches(&self, field: &str, value: &str) -> bool {
        match field {
            "hostname" => self.hostname == value,
            "active" => self.active == value.parse::<bool>().unwrap_or(false),
            "ipv4" => self.ipv4 == value,
            "ipv6" => self.ipv6 == value,
            label => self.labels.get(label).is_some_and(|v| v == value),
        }
    }
}
