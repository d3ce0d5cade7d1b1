//! In-memory machine registry.

use crate::machine::Machine;
use async_trait::async_trait;
use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Keyed machine storage as seen by the health check engine.
///
/// Implementations must allow concurrent snapshots and keep every write
/// short; no lock may be held across a network call.
#[async_trait]
pub trait MachineStore: Send + Sync {
    /// Copy of every machine currently stored
    async fn snapshot(&self) -> Vec<Machine>;

    /// Set the liveness flag of `hostname`. Unknown hostnames are ignored.
    async fn set_active(&self, hostname: &str, active: bool);
}

/// Machine registry keyed by hostname and guarded by a single reader/writer lock
#[derive(Debug, Default)]
pub struct MachineRegistry {
    machines: RwLock<HashMap<String, Machine>>,
}

/// On-disk layout of the registry snapshot
#[derive(Debug, Default, Serialize, Deserialize)]
struct MachineFile {
    #[serde(default)]
    machines: BTreeMap<String, Machine>,
}

impl MachineRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding `machines`; later duplicates replace earlier ones
    pub fn from_machines(machines: impl IntoIterator<Item = Machine>) -> Self {
        let machines = machines
            .into_iter()
            .map(|m| (m.hostname.clone(), m))
            .collect();
        Self {
            machines: RwLock::new(machines),
        }
    }

    /// Load a registry from a YAML snapshot file
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        let file: MachineFile = serde_yaml::from_str(&contents)?;

        let mut machines = HashMap::with_capacity(file.machines.len());
        for (key, mut machine) in file.machines {
            if machine.hostname.is_empty() {
                if key.is_empty() {
                    return Err(Error::registry("machine entry without hostname"));
                }
                machine.hostname = key;
            }
            machines.insert(machine.hostname.clone(), machine);
        }

        debug!(path = %path.as_ref().display(), count = machines.len(), "Loaded machines");
        Ok(Self {
            machines: RwLock::new(machines),
        })
    }

    /// Write the registry to a YAML snapshot file.
    ///
    /// The content is copied under the read lock and written after it is
    /// released. The file is replaced atomically.
    pub async fn dump_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = {
            let machines = self.machines.read().await;
            MachineFile {
                machines: machines
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            }
        };

        let yaml = serde_yaml::to_string(&file)?;
        let path = path.as_ref();
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, yaml).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Get a copy of a single machine
    pub async fn get(&self, hostname: &str) -> Option<Machine> {
        self.machines.read().await.get(hostname).cloned()
    }

    /// Insert or replace a machine keyed by its hostname
    pub async fn upsert(&self, machine: Machine) {
        self.machines
            .write()
            .await
            .insert(machine.hostname.clone(), machine);
    }

    /// Remove a machine, returning whether it existed
    pub async fn remove(&self, hostname: &str) -> bool {
        self.machines.write().await.remove(hostname).is_some()
    }

    /// Machines whose `field` equals `value`, see [`Machine::matches`]
    pub async fn filter(&self, field: &str, value: &str) -> Vec<Machine> {
        self.machines
            .read()
            .await
            .values()
            .filter(|m| m.matches(field, value))
            .cloned()
            .collect()
    }

    /// Number of machines
    pub async fn len(&self) -> usize {
        self.machines.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.machines.read().await.is_empty()
    }
}

#[async_trait]
impl MachineStore for MachineRegistry {
    async fn snapshot(&self) -> Vec<Machine> {
        self.machines.read().await.values().cloned().collect()
    }

    async fn set_active(&self, hostname: &str, active: bool) {
        if let Some(machine) = self.machines.write().await.get_mut(hostname) {
            machine.active = active;
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
