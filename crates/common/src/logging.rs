//! Logging utilities for fleet components.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Build the env filter, preferring `RUST_LOG` over the given default.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize tracing with plain text output.
///
/// Uses the RUST_LOG environment variable to control log levels,
/// falling back to `default_level`.
pub fn init(default_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter(default_level))
        .init();
}

/// Initialize tracing with JSON formatting (useful for structured logging).
pub fn init_json(default_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(env_filter(default_level))
        .init();
}
