//! Configuration loading and validation for the fleet server

use fleet::{CheckProtocol, CheckSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Invalid configuration: {0}")]
    Combination(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub machines: MachinesSettings,

    #[serde(default)]
    pub activity_check: ActivityCheckSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.api.validate()?;
        self.machines.validate()?;
        self.activity_check.validate()?;
        Ok(())
    }
}

/// REST API settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,

    #[validate(range(min = 1))]
    pub port: u16,

    pub auth: bool,

    pub bearer_token: String,
}

/// Machine store settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MachinesSettings {
    /// Never mutate machines, neither from checks nor from the API
    pub readonly: bool,

    /// YAML snapshot the registry is loaded from and dumped to
    #[validate(custom = "validate_file")]
    pub file: PathBuf,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_interval")]
    pub dump_interval: Option<Duration>,
}

/// Periodic activity check settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ActivityCheckSettings {
    pub check: bool,

    pub check_path: String,

    pub check_protocol: CheckProtocol,

    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,

    pub retries: u32,

    #[validate(custom = "validate_alert_endpoint")]
    pub alert_endpoint: String,

    /// Transport timeout of probes and alerts
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_interval")]
    pub timeout: Duration,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<LogFormat>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// OpenTelemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,
}

// Default implementations

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            auth: false,
            bearer_token: String::new(),
        }
    }
}

impl Default for MachinesSettings {
    fn default() -> Self {
        Self {
            readonly: false,
            file: PathBuf::from("machines.yaml"),
            dump_interval: None,
        }
    }
}

impl Default for ActivityCheckSettings {
    fn default() -> Self {
        Self {
            check: false,
            check_path: String::new(),
            check_protocol: CheckProtocol::Http,
            check_interval: Duration::ZERO,
            retries: 0,
            alert_endpoint: String::new(),
            timeout: fleet::DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "fleet-server".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
        }
    }
}

// Custom validators

fn validate_interval(interval: &Duration) -> Result<(), ValidationError> {
    if interval.is_zero() {
        return Err(ValidationError::new("interval_zero"));
    }
    Ok(())
}

fn validate_file(path: &Path) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        return Err(ValidationError::new("file_empty"));
    }
    Ok(())
}

fn validate_alert_endpoint(endpoint: &str) -> Result<(), ValidationError> {
    if endpoint.is_empty() {
        return Ok(());
    }

    match reqwest::Url::parse(endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ValidationError::new("alert_endpoint_invalid_url")),
    }
}

// Configuration loading implementation

impl Config {
    /// Load and validate configuration from a file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.check()?;
        Ok(config)
    }

    /// Validate field values and allowed combinations
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if self.api.auth && self.api.bearer_token.is_empty() {
            return Err(ConfigError::Combination(
                "bearer token needs to be set for auth to be turned on".to_string(),
            ));
        }

        let check = &self.activity_check;
        if check.check
            && (check.check_path.is_empty()
                || check.alert_endpoint.is_empty()
                || check.check_interval.is_zero())
        {
            return Err(ConfigError::Combination(
                "no setting found for checking but yet enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Settings that are valid but partly ignored in readonly mode
    pub fn readonly_warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if !self.machines.readonly {
            return warnings;
        }
        if self.activity_check.check {
            warnings.push(
                "Checks are enabled but machines are readonly, will only call endpoints and not update state",
            );
        }
        if self.machines.dump_interval.is_some() {
            warnings.push("Dump interval is set but machines are readonly, ignoring the dump interval");
        }
        warnings
    }

    /// Log the readonly warnings. Call once tracing is initialized.
    pub fn warn_readonly(&self) {
        for warning in self.readonly_warnings() {
            tracing::warn!("{warning}");
        }
    }

    /// Settings for the health check engine
    pub fn check_settings(&self) -> CheckSettings {
        let check = &self.activity_check;
        CheckSettings {
            protocol: check.check_protocol,
            path: check.check_path.clone(),
            interval: check.check_interval,
            retries: check.retries,
            alert_endpoint: check.alert_endpoint.clone(),
            readonly: self.machines.readonly,
        }
    }

    /// Interval of the dump job, if it should run at all
    pub fn dump_interval(&self) -> Option<Duration> {
        if self.machines.readonly {
            return None;
        }
        self.machines.dump_interval
    }

    /// Address the API listens on
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
