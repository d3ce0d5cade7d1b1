//! Main fleet server implementation.

use crate::config::Config;
use crate::dump::DumpJob;
use crate::http_server::{ApiServer, AppState};
use fleet::{EngineMetrics, HealthCheckEngine, HttpProber, MachineRegistry};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fleet server: machine API, health check engine and dump job
pub struct FleetServer {
    config: Config,
    registry: Arc<MachineRegistry>,
    metrics: Arc<EngineMetrics>,
}

impl FleetServer {
    /// Load the registry named by the configuration and create the server
    pub async fn load(config: Config) -> common::Result<Self> {
        let registry = MachineRegistry::load_from_file(&config.machines.file).await?;
        info!(
            path = %config.machines.file.display(),
            machines = registry.len().await,
            "Machines loaded"
        );
        Ok(Self::new(config, Arc::new(registry)))
    }

    /// Create a server around an existing registry
    pub fn new(config: Config, registry: Arc<MachineRegistry>) -> Self {
        Self {
            config,
            registry,
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    /// Shared machine registry
    pub fn registry(&self) -> Arc<MachineRegistry> {
        self.registry.clone()
    }

    /// Start the periodic jobs enabled by the configuration
    pub fn start_jobs(&self, stop: &CancellationToken) -> common::Result<Vec<JoinHandle<()>>> {
        let mut jobs = Vec::new();

        if self.config.activity_check.check {
            let prober = Arc::new(HttpProber::new(self.config.activity_check.timeout)?);
            let engine = HealthCheckEngine::new(
                self.registry.clone(),
                prober,
                self.config.check_settings(),
            )
            .with_metrics(self.metrics.clone());
            jobs.push(engine.start(stop.clone()));
        } else {
            info!("Activity checks disabled");
        }

        if let Some(interval) = self.config.dump_interval() {
            let job = DumpJob::new(
                self.registry.clone(),
                self.config.machines.file.clone(),
                interval,
            );
            jobs.push(job.start(stop.clone()));
        }

        Ok(jobs)
    }

    /// Run until `shutdown` is cancelled, then wait for the jobs to drain
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
        info!("Starting fleet server");

        let jobs = self.start_jobs(&shutdown)?;

        let state = AppState {
            registry: self.registry.clone(),
            metrics: self.metrics.clone(),
            bearer_token: self
                .config
                .api
                .auth
                .then(|| self.config.api.bearer_token.clone()),
            readonly: self.config.machines.readonly,
        };
        let api = ApiServer::new(state, self.config.listen_addr());

        let result = api.run(shutdown.clone()).await;
        // The API may also stop on its own, e.g. when binding fails.
        shutdown.cancel();

        for job in jobs {
            if let Err(e) = job.await {
                warn!(error = %e, "Periodic job failed");
            }
        }

        info!("Fleet server stopped");
        result.map_err(Into::into)
    }
}
