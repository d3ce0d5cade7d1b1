//! Fleet server
//!
//! Serves the machine registry over HTTP and keeps its liveness flags up to
//! date with the health check engine from the `fleet` crate.
//!
//! # Components
//!
//! - **Config**: YAML configuration loading and validation
//! - **HTTP server**: machine API, status, health and Prometheus metrics
//! - **Dump job**: periodic snapshot of the registry to disk
//! - **Telemetry**: tracing subscriber with optional OpenTelemetry export

pub mod config;
pub mod dump;
pub mod http_server;
pub mod server;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use dump::DumpJob;
pub use http_server::{ApiServer, AppState, StatusResponse, router};
pub use server::FleetServer;
pub use telemetry::{TelemetryGuard, setup_tracing};
