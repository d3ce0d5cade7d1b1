//! Tracing setup with optional OpenTelemetry export
//!
//! Without telemetry the subscriber is the plain `common::logging` one.
//! With telemetry enabled an OTLP span exporter is layered on top of the
//! formatted output.

use crate::config::{LogFormat, LoggingSettings, TelemetrySettings};
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// OpenTelemetry tracer guard
///
/// When dropped, flushes all pending spans and shuts down the tracer
pub struct TelemetryGuard;

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Resolve the default log level from settings and the debug flag
pub fn log_level(logging: &LoggingSettings, debug: bool) -> String {
    if debug {
        return "debug".to_string();
    }
    logging.level.clone().unwrap_or_else(|| "info".to_string())
}

/// Build the OTLP tracer provider
fn init_provider(settings: &TelemetrySettings) -> Result<TracerProvider, Box<dyn std::error::Error>> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&settings.otlp_endpoint)
        .build()?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", settings.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider)
}

/// Install the global tracing subscriber.
///
/// Must be called from within a tokio runtime when telemetry is enabled.
pub fn setup_tracing(
    logging: &LoggingSettings,
    telemetry: &TelemetrySettings,
    debug: bool,
) -> Result<Option<TelemetryGuard>, Box<dyn std::error::Error>> {
    let level = log_level(logging, debug);
    let format = logging.format.unwrap_or_default();

    if !telemetry.enabled {
        match format {
            LogFormat::Text => common::logging::init(&level),
            LogFormat::Json => common::logging::init_json(&level),
        }
        tracing::info!("Tracing initialized without OpenTelemetry");
        return Ok(None);
    }

    let provider = init_provider(telemetry)?;
    let tracer = provider.tracer("fleet-server");

    let fmt_layer = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(common::logging::env_filter(&level))
        .try_init()?;

    tracing::info!(
        service_name = %telemetry.service_name,
        otlp_endpoint = %telemetry.otlp_endpoint,
        "Tracing initialized with OpenTelemetry integration"
    );

    Ok(Some(TelemetryGuard))
}
