//! Periodic dump of the machine registry to its snapshot file.

use fleet::MachineRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Writes the registry to disk on a fixed interval
pub struct DumpJob {
    registry: Arc<MachineRegistry>,
    path: PathBuf,
    interval: Duration,
}

impl DumpJob {
    /// Create a new dump job
    pub fn new(registry: Arc<MachineRegistry>, path: PathBuf, interval: Duration) -> Self {
        Self {
            registry,
            path,
            interval,
        }
    }

    /// Dump once, logging any failure
    pub async fn dump(&self) -> bool {
        match self.registry.dump_to_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Finished machines dump");
                true
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to dump machines to file");
                false
            }
        }
    }

    /// Dump on every interval until `stop` is cancelled, then dump once more
    pub fn start(self, stop: CancellationToken) -> JoinHandle<()> {
        let period = self.interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await; // Skip first immediate tick

            info!(path = %self.path.display(), interval_ms = period.as_millis(), "Dump job started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.dump().await;
                    }
                    _ = stop.cancelled() => {
                        info!("Stopping the dumping");
                        self.dump().await;
                        break;
                    }
                }
            }
        })
    }
}
