//! In-memory simulated devices with fault injection.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use intent_core::{apply_diff, render_snapshot, DiffRecord, IntentSnapshot};

use super::{
    AdapterError, AdapterOp, CandidateHandle, CommitResult, ConfigPayload, DeviceAdapter, HaStatus,
    ValidationResult,
};

/// How an injected fault fails the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    Transient,
    Permanent,
    /// Validation answers "not accepted"; other operations fail permanently.
    Reject,
    /// The call sleeps before proceeding normally.
    Delay(Duration),
    /// Fetch serves an empty payload; other operations fail permanently.
    Empty,
}

/// A fault armed for one device operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub device: String,
    pub op: AdapterOp,
    pub mode: FaultMode,
    /// Matching calls that pass before the fault first fires.
    pub after: u32,
    /// How many times it fires; `None` for every later call.
    pub times: Option<u32>,
}

impl Fault {
    pub fn new(device: impl Into<String>, op: AdapterOp, mode: FaultMode) -> Self {
        Self {
            device: device.into(),
            op,
            mode,
            after: 0,
            times: None,
        }
    }

    pub fn after(mut self, calls: u32) -> Self {
        self.after = calls;
        self
    }

    pub fn times(mut self, times: u32) -> Self {
        self.times = Some(times);
        self
    }
}

/// One successful commit, in global commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitLogEntry {
    pub device: String,
    pub revision: u64,
    pub comment: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone)]
struct SimDevice {
    live: IntentSnapshot,
    raw_override: Option<Vec<u8>>,
    candidate: Option<(CandidateHandle, IntentSnapshot)>,
    ha: HaStatus,
    revision: u64,
}

#[derive(Debug)]
struct ArmedFault {
    fault: Fault,
    seen: u32,
    fired: u32,
}

#[derive(Debug, Default)]
struct SimState {
    devices: BTreeMap<String, SimDevice>,
    faults: Vec<ArmedFault>,
    calls: BTreeMap<(String, AdapterOp), u32>,
    commits: Vec<CommitLogEntry>,
    next_candidate: u64,
}

/// Devices held in memory. Live configuration is an [`IntentSnapshot`] and
/// a pushed diff is applied to it to form the candidate.
#[derive(Debug, Default)]
pub struct MemoryDeviceAdapter {
    state: Mutex<SimState>,
}

impl MemoryDeviceAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, device: impl Into<String>, live: IntentSnapshot, ha: HaStatus) {
        self.lock().devices.insert(
            device.into(),
            SimDevice {
                live,
                raw_override: None,
                candidate: None,
                ha,
                revision: 0,
            },
        );
    }

    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push(ArmedFault {
            fault,
            seen: 0,
            fired: 0,
        });
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Serve `bytes` from `fetch_live_config` instead of the rendered live
    /// snapshot.
    pub fn set_raw_payload(&self, device: &str, bytes: Vec<u8>) {
        if let Some(sim) = self.lock().devices.get_mut(device) {
            sim.raw_override = Some(bytes);
        }
    }

    pub fn set_ha_status(&self, device: &str, ha: HaStatus) {
        if let Some(sim) = self.lock().devices.get_mut(device) {
            sim.ha = ha;
        }
    }

    /// Replace live configuration out of band, as a manual change would.
    pub fn set_live(&self, device: &str, live: IntentSnapshot) {
        if let Some(sim) = self.lock().devices.get_mut(device) {
            sim.live = live;
        }
    }

    pub fn live_snapshot(&self, device: &str) -> Option<IntentSnapshot> {
        self.lock().devices.get(device).map(|sim| sim.live.clone())
    }

    pub fn has_candidate(&self, device: &str) -> bool {
        self.lock()
            .devices
            .get(device)
            .is_some_and(|sim| sim.candidate.is_some())
    }

    pub fn call_count(&self, device: &str, op: AdapterOp) -> u32 {
        self.lock()
            .calls
            .get(&(device.to_string(), op))
            .copied()
            .unwrap_or(0)
    }

    pub fn commit_log(&self) -> Vec<CommitLogEntry> {
        self.lock().commits.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and return the fault that fires on it, if any.
    fn enter(&self, device: &str, op: AdapterOp) -> Result<Option<FaultMode>, AdapterError> {
        let mut state = self.lock();
        if !state.devices.contains_key(device) {
            return Err(AdapterError::permanent(device, op, "unknown device"));
        }
        *state.calls.entry((device.to_string(), op)).or_default() += 1;
        for armed in &mut state.faults {
            if armed.fault.device != device || armed.fault.op != op {
                continue;
            }
            armed.seen += 1;
            if armed.seen <= armed.fault.after {
                continue;
            }
            if armed.fault.times.is_some_and(|times| armed.fired >= times) {
                continue;
            }
            armed.fired += 1;
            return Ok(Some(armed.fault.mode));
        }
        Ok(None)
    }

    /// Apply fault semantics. Returns the fault whose effect the operation
    /// carries out itself: a validation reject or an empty fetch.
    async fn gate(&self, device: &str, op: AdapterOp) -> Result<Option<FaultMode>, AdapterError> {
        match self.enter(device, op)? {
            None => Ok(None),
            Some(FaultMode::Delay(wait)) => {
                tokio::time::sleep(wait).await;
                Ok(None)
            }
            Some(FaultMode::Transient) => {
                Err(AdapterError::transient(device, op, "injected transient fault"))
            }
            Some(FaultMode::Permanent) => {
                Err(AdapterError::permanent(device, op, "injected permanent fault"))
            }
            Some(FaultMode::Reject) if op == AdapterOp::Validate => Ok(Some(FaultMode::Reject)),
            Some(FaultMode::Empty) if op == AdapterOp::Fetch => Ok(Some(FaultMode::Empty)),
            Some(FaultMode::Reject | FaultMode::Empty) => {
                Err(AdapterError::permanent(device, op, "rejected"))
            }
        }
    }

    fn with_device<T>(
        &self,
        device: &str,
        op: AdapterOp,
        f: impl FnOnce(&mut SimDevice, &mut SimState) -> Result<T, AdapterError>,
    ) -> Result<T, AdapterError> {
        let mut state = self.lock();
        let mut sim = state
            .devices
            .remove(device)
            .ok_or_else(|| AdapterError::permanent(device, op, "unknown device"))?;
        let result = f(&mut sim, &mut state);
        state.devices.insert(device.to_string(), sim);
        result
    }
}

fn check_candidate(
    sim: &SimDevice,
    device: &str,
    op: AdapterOp,
    candidate: &CandidateHandle,
) -> Result<IntentSnapshot, AdapterError> {
    match &sim.candidate {
        Some((handle, snapshot)) if handle.id == candidate.id => Ok(snapshot.clone()),
        _ => Err(AdapterError::permanent(
            device,
            op,
            format!("no staged candidate {}", candidate.id),
        )),
    }
}

#[async_trait]
impl DeviceAdapter for MemoryDeviceAdapter {
    async fn fetch_live_config(&self, device: &str) -> Result<ConfigPayload, AdapterError> {
        let empty = self.gate(device, AdapterOp::Fetch).await? == Some(FaultMode::Empty);
        self.with_device(device, AdapterOp::Fetch, |sim, _| {
            if empty {
                return Ok(ConfigPayload(Vec::new()));
            }
            if let Some(raw) = &sim.raw_override {
                return Ok(ConfigPayload(raw.clone()));
            }
            render_snapshot(&sim.live)
                .map(ConfigPayload)
                .map_err(|err| AdapterError::permanent(device, AdapterOp::Fetch, err.to_string()))
        })
    }

    async fn push_candidate(
        &self,
        device: &str,
        diff: &DiffRecord,
    ) -> Result<CandidateHandle, AdapterError> {
        self.gate(device, AdapterOp::Push).await?;
        self.with_device(device, AdapterOp::Push, |sim, state| {
            let staged = apply_diff(&sim.live, diff)
                .map_err(|err| AdapterError::permanent(device, AdapterOp::Push, err.to_string()))?;
            state.next_candidate += 1;
            let handle = CandidateHandle {
                id: format!("cand-{}", state.next_candidate),
                device: device.to_string(),
                diff_id: diff.id.clone(),
            };
            sim.candidate = Some((handle.clone(), staged));
            Ok(handle)
        })
    }

    async fn validate_candidate(
        &self,
        device: &str,
        candidate: &CandidateHandle,
    ) -> Result<ValidationResult, AdapterError> {
        let rejected = self.gate(device, AdapterOp::Validate).await? == Some(FaultMode::Reject);
        self.with_device(device, AdapterOp::Validate, |sim, _| {
            check_candidate(sim, device, AdapterOp::Validate, candidate)?;
            Ok(if rejected {
                ValidationResult::rejected("candidate rejected by commit-check")
            } else {
                ValidationResult::accepted()
            })
        })
    }

    async fn commit(
        &self,
        device: &str,
        candidate: &CandidateHandle,
        comment: &str,
    ) -> Result<CommitResult, AdapterError> {
        self.gate(device, AdapterOp::Commit).await?;
        self.with_device(device, AdapterOp::Commit, |sim, state| {
            let staged = check_candidate(sim, device, AdapterOp::Commit, candidate)?;
            sim.live = staged;
            sim.candidate = None;
            sim.raw_override = None;
            sim.revision += 1;
            state.commits.push(CommitLogEntry {
                device: device.to_string(),
                revision: sim.revision,
                comment: comment.to_string(),
                fingerprint: sim.live.fingerprint(),
            });
            Ok(CommitResult {
                revision: sim.revision,
            })
        })
    }

    async fn fetch_ha_status(&self, device: &str) -> Result<HaStatus, AdapterError> {
        self.gate(device, AdapterOp::HaStatus).await?;
        self.with_device(device, AdapterOp::HaStatus, |sim, _| Ok(sim.ha))
    }

    async fn discard_candidate(
        &self,
        device: &str,
        _candidate: &CandidateHandle,
    ) -> Result<(), AdapterError> {
        self.gate(device, AdapterOp::Discard).await?;
        self.with_device(device, AdapterOp::Discard, |sim, _| {
            sim.candidate = None;
            Ok(())
        })
    }
}
