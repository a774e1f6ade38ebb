//! Device registry, baselines and deployment locks.
//!
//! The baseline of a device changes only when a deployment attempt
//! completes. Readers take an `Arc` to the baseline current at the time they
//! ask and keep using it, so a later completion does not change what an
//! in-flight drift run compares against.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use intent_core::{IntentSnapshot, Scope};
use serde::{Deserialize, Serialize};

use crate::config::ConfigLoadError;
use crate::store::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    pub id: String,
    pub group: String,
    pub environment: String,
    #[serde(default)]
    pub production: bool,
    #[serde(default)]
    pub ha_peer: Option<String>,
}

impl DeviceRef {
    pub fn scope(&self) -> Scope {
        Scope::new(&self.environment, &self.group)
    }
}

/// Manual-intervention flag left by a rollback that could not be confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLock {
    pub device: String,
    pub attempt_id: String,
    pub reason: String,
    pub locked_at: DateTime<Utc>,
}

impl Record for DeviceLock {
    const COLLECTION: &'static str = "locks";

    fn record_id(&self) -> String {
        self.device.clone()
    }

    fn is_terminal(&self) -> bool {
        false
    }
}

/// Persisted baseline of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub device: String,
    pub snapshot: IntentSnapshot,
    pub attempt_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl Record for BaselineRecord {
    const COLLECTION: &'static str = "baselines";

    fn record_id(&self) -> String {
        self.device.clone()
    }

    fn is_terminal(&self) -> bool {
        false
    }
}

#[derive(Debug, Deserialize)]
struct FleetFile {
    #[serde(default, rename = "device")]
    devices: Vec<DeviceRef>,
}

#[derive(Debug, Default)]
pub struct Fleet {
    devices: BTreeMap<String, DeviceRef>,
    baselines: RwLock<BTreeMap<String, Arc<IntentSnapshot>>>,
    locks: RwLock<BTreeMap<String, DeviceLock>>,
}

impl Fleet {
    pub fn new(devices: impl IntoIterator<Item = DeviceRef>) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|device| (device.id.clone(), device))
                .collect(),
            ..Self::default()
        }
    }

    pub fn device(&self, id: &str) -> Option<&DeviceRef> {
        self.devices.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRef> {
        self.devices.values()
    }

    /// Devices of one environment and device-group.
    pub fn members(&self, scope: &Scope) -> Vec<&DeviceRef> {
        self.devices
            .values()
            .filter(|d| d.environment == scope.environment && d.group == scope.device_group)
            .collect()
    }

    pub fn baseline(&self, id: &str) -> Option<Arc<IntentSnapshot>> {
        self.baselines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Install a baseline recorded earlier (for example loaded from the store).
    pub fn seed_baseline(&self, id: &str, snapshot: IntentSnapshot) {
        self.baselines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), Arc::new(snapshot));
    }

    pub(crate) fn record_completed(&self, id: &str, snapshot: IntentSnapshot) -> Arc<IntentSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.baselines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), Arc::clone(&snapshot));
        snapshot
    }

    /// One baseline per other device-group of the same environment.
    pub fn peer_baselines(&self, scope: &Scope) -> Vec<IntentSnapshot> {
        let baselines = self.baselines.read().unwrap_or_else(PoisonError::into_inner);
        let mut by_group: BTreeMap<&str, IntentSnapshot> = BTreeMap::new();
        for device in self.devices.values() {
            if device.environment != scope.environment || device.group == scope.device_group {
                continue;
            }
            if let Some(snapshot) = baselines.get(&device.id) {
                by_group
                    .entry(device.group.as_str())
                    .or_insert_with(|| snapshot.as_ref().clone());
            }
        }
        by_group.into_values().collect()
    }

    pub fn lock(&self, lock: DeviceLock) {
        self.locks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(lock.device.clone(), lock);
    }

    pub fn lock_state(&self, id: &str) -> Option<DeviceLock> {
        self.locks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Re-enable automation on a deployment-locked device.
    pub fn clear_lock(&self, id: &str) -> Option<DeviceLock> {
        self.locks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }
}

pub fn load_fleet(path: &Path) -> Result<Fleet, ConfigLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let file: FleetFile = toml::from_str(&raw).map_err(|source| ConfigLoadError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Fleet::new(file.devices))
}
