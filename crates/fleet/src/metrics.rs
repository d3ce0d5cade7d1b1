//! Prometheus metrics for the health check engine.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// Labels for result-partitioned counters
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResultLabels {
    /// Result (success, failure)
    pub result: String,
}

impl ResultLabels {
    fn new(success: bool) -> Self {
        Self {
            result: if success { "success" } else { "failure" }.to_string(),
        }
    }
}

/// Engine metrics and the registry they are encoded from
pub struct EngineMetrics {
    /// Prometheus registry
    pub registry: Registry,

    /// Probes by result
    probes_total: Family<ResultLabels, Counter>,
    /// Probe duration
    probe_duration_seconds: Histogram,
    /// Alert calls by result
    alerts_total: Family<ResultLabels, Counter>,
    /// Machines flipped to inactive
    marked_inactive_total: Counter,
    /// Completed ticks
    ticks_total: Counter,
    /// Tick duration including the drain
    tick_duration_seconds: Histogram,
    /// Machines in the last snapshot
    machines_probed: Gauge,
}

impl EngineMetrics {
    /// Create and register all engine metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let probes_total = Family::<ResultLabels, Counter>::default();
        registry.register(
            "fleet_probes",
            "Total machine probes performed",
            probes_total.clone(),
        );

        // 1ms to ~16s
        let probe_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 15));
        registry.register(
            "fleet_probe_duration_seconds",
            "Machine probe duration in seconds",
            probe_duration_seconds.clone(),
        );

        let alerts_total = Family::<ResultLabels, Counter>::default();
        registry.register(
            "fleet_alerts",
            "Total alert calls attempted",
            alerts_total.clone(),
        );

        let marked_inactive_total = Counter::default();
        registry.register(
            "fleet_machines_marked_inactive",
            "Machines marked inactive after crossing the retry threshold",
            marked_inactive_total.clone(),
        );

        let ticks_total = Counter::default();
        registry.register(
            "fleet_ticks",
            "Total health check ticks completed",
            ticks_total.clone(),
        );

        let tick_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 16));
        registry.register(
            "fleet_tick_duration_seconds",
            "Health check tick duration in seconds",
            tick_duration_seconds.clone(),
        );

        let machines_probed = Gauge::default();
        registry.register(
            "fleet_machines_probed",
            "Machines probed in the last tick",
            machines_probed.clone(),
        );

        Self {
            registry,
            probes_total,
            probe_duration_seconds,
            alerts_total,
            marked_inactive_total,
            ticks_total,
            tick_duration_seconds,
            machines_probed,
        }
    }

    /// Record a probe result
    pub fn record_probe(&self, success: bool, duration: Duration) {
        self.probes_total
            .get_or_create(&ResultLabels::new(success))
            .inc();
        self.probe_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Record an alert call
    pub fn record_alert(&self, delivered: bool) {
        self.alerts_total
            .get_or_create(&ResultLabels::new(delivered))
            .inc();
    }

    /// Record a machine being marked inactive
    pub fn record_marked_inactive(&self) {
        self.marked_inactive_total.inc();
    }

    /// Record a completed tick
    pub fn record_tick(&self, machines: usize, duration: Duration) {
        self.ticks_total.inc();
        self.machines_probed.set(machines as i64);
        self.tick_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Probes recorded with the given result
    pub fn probes(&self, success: bool) -> u64 {
        self.probes_total
            .get_or_create(&ResultLabels::new(success))
            .get()
    }

    /// Alerts recorded with the given result
    pub fn alerts(&self, delivered: bool) -> u64 {
        self.alerts_total
            .get_or_create(&ResultLabels::new(delivered))
            .get()
    }

    /// Completed ticks
    pub fn ticks(&self) -> u64 {
        self.ticks_total.get()
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
