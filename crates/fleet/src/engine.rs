//! Periodic health check engine.
//!
//! Every tick the engine snapshots the machine store, probes every machine
//! concurrently and waits for all probes before the next tick may start.
//! A failed probe bumps the machine's retry counter; once the counter is
//! strictly greater than the configured threshold the machine is marked
//! inactive, the alert endpoint is called and the counter starts over.

use crate::metrics::EngineMetrics;
use crate::prober::{Prober, probe_url};
use crate::registry::MachineStore;
use crate::types::{CheckSettings, ProbeOutcome, TickReport};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything a single probe task needs, cheap to clone into each task
#[derive(Clone)]
struct ProbeContext {
    store: Arc<dyn MachineStore>,
    prober: Arc<dyn Prober>,
    settings: Arc<CheckSettings>,
    metrics: Option<Arc<EngineMetrics>>,
}

/// Health check engine
pub struct HealthCheckEngine {
    ctx: ProbeContext,
    /// Consecutive failures per hostname; absent means zero.
    retries: HashMap<String, u32>,
}

impl HealthCheckEngine {
    /// Create a new engine
    pub fn new(
        store: Arc<dyn MachineStore>,
        prober: Arc<dyn Prober>,
        settings: CheckSettings,
    ) -> Self {
        Self {
            ctx: ProbeContext {
                store,
                prober,
                settings: Arc::new(settings),
                metrics: None,
            },
            retries: HashMap::new(),
        }
    }

    /// Record engine metrics into `metrics`
    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.ctx.metrics = Some(metrics);
        self
    }

    /// Current retry counter of `hostname`
    pub fn retry_count(&self, hostname: &str) -> u32 {
        self.retries.get(hostname).copied().unwrap_or(0)
    }

    /// Run one tick: snapshot, probe every machine concurrently, drain.
    pub async fn tick(&mut self) -> TickReport {
        let start = Instant::now();
        let machines = self.ctx.store.snapshot().await;
        let mut report = TickReport {
            probed: machines.len(),
            ..Default::default()
        };

        let mut tasks = JoinSet::new();
        for machine in &machines {
            let ctx = self.ctx.clone();
            let hostname = machine.hostname.clone();
            let retries = self.retry_count(&hostname);
            tasks.spawn(async move {
                let (outcome, retries) = ctx.check(&hostname, retries).await;
                (hostname, outcome, retries)
            });
        }
        debug!(count = machines.len(), "Dispatched machine checks");

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((hostname, outcome, retries)) => {
                    report.record(outcome);
                    if retries == 0 {
                        self.retries.remove(&hostname);
                    } else {
                        self.retries.insert(hostname, retries);
                    }
                }
                Err(e) => error!(error = %e, "Machine check task failed"),
            }
        }

        let present: HashSet<&str> = machines.iter().map(|m| m.hostname.as_str()).collect();
        self.retries.retain(|hostname, _| present.contains(hostname.as_str()));

        if let Some(ref m) = self.ctx.metrics {
            m.record_tick(report.probed, start.elapsed());
        }
        debug!(
            probed = report.probed,
            succeeded = report.succeeded,
            failed = report.failed,
            alerts = report.alerts,
            duration_ms = start.elapsed().as_millis(),
            "Finished the machine checks"
        );

        report
    }

    /// Start ticking in a background task until `stop` is cancelled.
    ///
    /// The first tick fires one interval after start. Cancellation is only
    /// observed between ticks, so awaiting the returned handle after
    /// cancelling waits for the running tick to drain.
    pub fn start(mut self, stop: CancellationToken) -> JoinHandle<()> {
        // interval() panics on a zero period
        let period = self.ctx.settings.interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await; // Skip first immediate tick

            info!(
                interval_ms = period.as_millis(),
                retries = self.ctx.settings.retries,
                readonly = self.ctx.settings.readonly,
                "Health check engine started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    _ = stop.cancelled() => {
                        info!("Stopping the checking");
                        break;
                    }
                }
            }
        })
    }
}

impl ProbeContext {
    /// Probe one machine given its current retry counter.
    ///
    /// Returns the outcome and the counter to store for the next tick.
    async fn check(&self, hostname: &str, retries: u32) -> (ProbeOutcome, u32) {
        let settings = &self.settings;
        let url = match probe_url(settings.protocol, hostname, &settings.path) {
            Ok(url) => url,
            Err(e) => {
                error!(hostname, error = %e, "Failed to compose endpoint URL");
                return (ProbeOutcome::Skipped, retries);
            }
        };

        let start = Instant::now();
        let result = self.prober.get(url.as_str()).await;
        if let Some(ref m) = self.metrics {
            m.record_probe(result.is_ok(), start.elapsed());
        }

        // A success leaves the counter untouched.
        let retries = match result {
            Ok(()) => {
                debug!(hostname, "Machine check passed");
                self.mark(hostname, true).await;
                return (ProbeOutcome::Healthy, retries);
            }
            Err(e) => {
                let retries = retries.saturating_add(1);
                warn!(hostname, url = %url, error = %e, retries, "Failed machine check");
                retries
            }
        };

        if retries <= settings.retries {
            return (ProbeOutcome::Failed, retries);
        }

        warn!(
            hostname,
            retries,
            threshold = settings.retries,
            "Machine crossed the retry threshold"
        );
        self.mark(hostname, false).await;

        let delivered = match self.prober.get(&settings.alert_endpoint).await {
            Ok(()) => true,
            Err(e) => {
                error!(hostname, error = %e, "Failed to report machine status");
                false
            }
        };
        if let Some(ref m) = self.metrics {
            m.record_alert(delivered);
        }

        (ProbeOutcome::Alerted, 0)
    }

    /// Write the liveness flag unless the store is readonly
    async fn mark(&self, hostname: &str, active: bool) {
        if self.settings.readonly {
            return;
        }

        self.store.set_active(hostname, active).await;
        if !active {
            if let Some(ref m) = self.metrics {
                m.record_marked_inactive();
            }
        }
    }
}
