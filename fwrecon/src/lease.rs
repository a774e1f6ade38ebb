//! Per-device single-holder leases.
//!
//! Deployment attempts wait for a device's lease; drift runs, backups and
//! restore drills only try it and refuse when it is held. The holder table is
//! informational and is cleared before the lease is released.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "holder", content = "id", rename_all = "snake_case")]
pub enum LeaseHolder {
    Deployment(String),
    Drift(String),
    Backup(String),
    RestoreDrill(String),
}

impl Display for LeaseHolder {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LeaseHolder::Deployment(id) => write!(f, "deployment {id}"),
            LeaseHolder::Drift(id) => write!(f, "drift run {id}"),
            LeaseHolder::Backup(id) => write!(f, "backup {id}"),
            LeaseHolder::RestoreDrill(id) => write!(f, "restore drill {id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseError {
    #[error("device {device} lease is held by {holder}")]
    Held { device: String, holder: String },
}

type HolderMap = Arc<Mutex<BTreeMap<String, LeaseHolder>>>;

#[derive(Debug, Default)]
pub struct LeaseTable {
    slots: Mutex<BTreeMap<String, Arc<AsyncMutex<()>>>>,
    holders: HolderMap,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, device: &str) -> Arc<AsyncMutex<()>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(device.to_string())
            .or_default()
            .clone()
    }

    fn holders(&self) -> MutexGuard<'_, BTreeMap<String, LeaseHolder>> {
        self.holders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until the device is free, then hold it.
    pub async fn acquire(&self, device: &str, holder: LeaseHolder) -> DeviceLease {
        let guard = self.slot(device).lock_owned().await;
        self.grant(device, holder, guard)
    }

    /// Hold the device only if nobody does.
    pub fn try_acquire(&self, device: &str, holder: LeaseHolder) -> Result<DeviceLease, LeaseError> {
        match self.slot(device).try_lock_owned() {
            Ok(guard) => Ok(self.grant(device, holder, guard)),
            Err(_) => Err(LeaseError::Held {
                device: device.to_string(),
                holder: self
                    .holder(device)
                    .map(|holder| holder.to_string())
                    .unwrap_or_else(|| "another operation".to_string()),
            }),
        }
    }

    pub fn holder(&self, device: &str) -> Option<LeaseHolder> {
        self.holders().get(device).cloned()
    }

    fn grant(&self, device: &str, holder: LeaseHolder, guard: OwnedMutexGuard<()>) -> DeviceLease {
        tracing::debug!(device, holder = %holder, "lease acquired");
        self.holders().insert(device.to_string(), holder.clone());
        DeviceLease {
            device: device.to_string(),
            holder,
            holders: Arc::clone(&self.holders),
            _guard: guard,
        }
    }
}

/// Exclusive hold on one device, released on drop.
#[derive(Debug)]
pub struct DeviceLease {
    device: String,
    holder: LeaseHolder,
    holders: HolderMap,
    _guard: OwnedMutexGuard<()>,
}

impl DeviceLease {
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn holder(&self) -> &LeaseHolder {
        &self.holder
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.holders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.device);
        tracing::debug!(device = %self.device, holder = %self.holder, "lease released");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::{LeaseError, LeaseHolder, LeaseTable};

    #[tokio::test]
    async fn held_lease_refuses_try_acquire() {
        let table = LeaseTable::new();
        let lease = table
            .acquire("fw1", LeaseHolder::Deployment("a1".to_string()))
            .await;
        let err = table
            .try_acquire("fw1", LeaseHolder::Drift("d1".to_string()))
            .expect_err("held");
        assert_eq!(
            err,
            LeaseError::Held {
                device: "fw1".to_string(),
                holder: "deployment a1".to_string()
            }
        );
        assert!(table.try_acquire("fw2", LeaseHolder::Drift("d2".to_string())).is_ok());

        drop(lease);
        assert_eq!(table.holder("fw1"), None);
        assert!(table.try_acquire("fw1", LeaseHolder::Drift("d3".to_string())).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn at_most_one_holder_at_a_time() {
        let table = Arc::new(LeaseTable::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let table = Arc::clone(&table);
            let inside = Arc::clone(&inside);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let _lease = table
                    .acquire("fw1", LeaseHolder::Deployment(format!("a{i}")))
                    .await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.expect("task");
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
