//! Post-commit validation runners.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::json;

use super::{AdapterError, CheckOutcome, DeviceAdapter, HaStatus, ValidationRunner};

/// Health checks answered through the device adapter.
///
/// - `control_plane`: live configuration can be fetched and parsed
/// - `ha_state`: HA status is not degraded
///
/// Any other check name fails as unknown.
pub struct HealthCheckRunner {
    adapter: Arc<dyn DeviceAdapter>,
}

impl HealthCheckRunner {
    pub fn new(adapter: Arc<dyn DeviceAdapter>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl ValidationRunner for HealthCheckRunner {
    async fn run_checks(&self, device: &str, checks: &[String]) -> Result<CheckOutcome, AdapterError> {
        let mut results = Vec::with_capacity(checks.len());
        for check in checks {
            let (passed, detail) = match check.as_str() {
                "control_plane" => {
                    let payload = self.adapter.fetch_live_config(device).await?;
                    match payload.parse() {
                        Ok(snapshot) => (true, format!("{} objects", snapshot.len())),
                        Err(err) => (false, err.to_string()),
                    }
                }
                "ha_state" => {
                    let status = self.adapter.fetch_ha_status(device).await?;
                    (status != HaStatus::Degraded, status.to_string())
                }
                other => (false, format!("unknown check '{other}'")),
            };
            results.push(json!({ "name": check, "passed": passed, "detail": detail }));
        }
        let passed = results
            .iter()
            .all(|result| result["passed"].as_bool().unwrap_or(false));
        Ok(CheckOutcome {
            passed,
            report: json!({ "device": device, "checks": results }),
        })
    }
}

/// Pass or fail by device, for tests and dry runs.
#[derive(Debug, Default)]
pub struct ScriptedChecks {
    failing: Mutex<BTreeSet<String>>,
    runs: Mutex<BTreeMap<String, u32>>,
}

impl ScriptedChecks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, device: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.to_string());
    }

    pub fn pass(&self, device: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(device);
    }

    pub fn runs(&self, device: &str) -> u32 {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ValidationRunner for ScriptedChecks {
    async fn run_checks(&self, device: &str, checks: &[String]) -> Result<CheckOutcome, AdapterError> {
        *self
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(device.to_string())
            .or_default() += 1;
        let passed = !self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(device);
        Ok(CheckOutcome {
            passed,
            report: json!({ "device": device, "checks": checks, "scripted": true, "passed": passed }),
        })
    }
}
