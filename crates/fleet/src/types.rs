//! Health check settings and outcome types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Scheme used to reach a machine's health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckProtocol {
    #[default]
    Http,
    Https,
}

impl fmt::Display for CheckProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckProtocol::Http => write!(f, "http"),
            CheckProtocol::Https => write!(f, "https"),
        }
    }
}

/// Settings of the health check engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSettings {
    /// Scheme of the probe URL
    pub protocol: CheckProtocol,

    /// Path appended to each hostname
    pub path: String,

    /// Period between ticks
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Failures tolerated before alerting; alerting happens once the
    /// counter is strictly greater than this value
    pub retries: u32,

    /// URL receiving a GET when a machine crosses the threshold
    pub alert_endpoint: String,

    /// Never write liveness flags back to the store
    pub readonly: bool,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            protocol: CheckProtocol::Http,
            path: "/health".to_string(),
            interval: Duration::from_secs(30),
            retries: 3,
            alert_endpoint: String::new(),
            readonly: false,
        }
    }
}

/// Outcome of probing one machine during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Machine answered with 200
    Healthy,
    /// Probe failed, threshold not crossed
    Failed,
    /// Probe failed and the threshold was crossed
    Alerted,
    /// Probe URL could not be built; nothing was touched
    Skipped,
}

/// Summary of a single tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Machines in the snapshot
    pub probed: usize,
    /// Probes that returned 200
    pub succeeded: usize,
    /// Failed probes, including those that alerted
    pub failed: usize,
    /// Threshold crossings
    pub alerts: usize,
    /// Probes aborted before any request
    pub skipped: usize,
}

impl TickReport {
    pub(crate) fn record(&mut self, outcome: ProbeOutcome) {
        match outcome {
            ProbeOutcome::Healthy => self.succeeded += 1,
            ProbeOutcome::Failed => self.failed += 1,
            ProbeOutcome::Alerted => {
                self.failed += 1;
                self.alerts += 1;
            }
            ProbeOutcome::Skipped => self.skipped += 1,
        }
    }
}
