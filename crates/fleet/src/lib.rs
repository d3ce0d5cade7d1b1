//! Machine registry and periodic liveness checking.
//!
//! This crate keeps an in-memory registry of machines keyed by hostname and
//! drives a health check engine over it:
//! - every tick, each machine's health endpoint is probed concurrently
//! - consecutive failures are counted per hostname
//! - once a counter exceeds the threshold the machine is marked inactive and
//!   an alert endpoint is called
//!
//! # Example
//!
//! ```no_run
//! use fleet::{CheckSettings, HealthCheckEngine, HttpProber, Machine, MachineRegistry};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(MachineRegistry::from_machines([
//!     Machine::new("web1.example.com"),
//! ]));
//! let prober = Arc::new(HttpProber::new(Duration::from_secs(5))?);
//!
//! let settings = CheckSettings {
//!     alert_endpoint: "https://alerts.example.com/notify".to_string(),
//!     ..Default::default()
//! };
//!
//! let stop = CancellationToken::new();
//! let handle = HealthCheckEngine::new(registry.clone(), prober, settings).start(stop.clone());
//!
//! // Later: stop and wait for the running tick to drain
//! stop.cancel();
//! handle.await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod machine;
pub mod metrics;
pub mod prober;
pub mod registry;
pub mod types;

pub use engine::HealthCheckEngine;
pub use machine::Machine;
pub use metrics::EngineMetrics;
pub use prober::{DEFAULT_PROBE_TIMEOUT, HttpProber, ProbeError, Prober, probe_url};
pub use registry::{MachineRegistry, MachineStore};
pub use types::{CheckProtocol, CheckSettings, ProbeOutcome, TickReport};
