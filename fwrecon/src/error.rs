//! Error taxonomy of the reconciliation engine.

use intent_core::{ApplyError, ParseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapter::AdapterError;
use crate::audit::AuditError;
use crate::deploy::AttemptState;
use crate::lease::LeaseError;
use crate::store::StoreError;

/// Backup checksum or structure failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("backup export for {device} is empty")]
    Empty { device: String },
    #[error("backup export for {device} is not parseable: {reason}")]
    Unparseable { device: String, reason: String },
    #[error("backup {id} checksum mismatch: expected {expected}, found {actual}")]
    ChecksumMismatch {
        id: String,
        expected: String,
        actual: String,
    },
}

/// Every failure the engine can surface.
///
/// The first six variants are the operational taxonomy reported in attempt
/// outcomes; the rest are preconditions and plumbing failures.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("guardrails blocked the change: {summary}")]
    GuardrailBlocked { violations: usize, summary: String },
    #[error("{stage} validation failed on {device}: {detail}")]
    ValidationFailed {
        device: String,
        stage: String,
        detail: String,
    },
    #[error("rollback on {device} could not be confirmed: {detail}")]
    RollbackFailed { device: String, detail: String },
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Lease(#[from] LeaseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error(transparent)]
    DiffConflict(#[from] ApplyError),
    #[error("device {device} is deployment-locked: {reason}")]
    DeviceLocked { device: String, reason: String },
    #[error("unknown device '{0}'")]
    UnknownDevice(String),
    #[error("no baseline recorded for device '{0}'")]
    NoBaseline(String),
    #[error("device '{0}' is a production target")]
    ProductionTarget(String),
    #[error("HA barrier for {device} broken: {reason}")]
    HaBarrier { device: String, reason: String },
    #[error("cancelled during {stage}")]
    Cancelled { stage: String },
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition { from: AttemptState, to: AttemptState },
}

impl ReconcileError {
    /// Stable snake_case label used in reports and audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::Parse(_) => "parse_error",
            ReconcileError::Adapter(err) if err.is_transient() => "adapter_transient",
            ReconcileError::Adapter(_) => "adapter_permanent",
            ReconcileError::GuardrailBlocked { .. } => "guardrail_blocked",
            ReconcileError::ValidationFailed { .. } => "validation_failed",
            ReconcileError::RollbackFailed { .. } => "rollback_failed",
            ReconcileError::Integrity(_) => "integrity_error",
            ReconcileError::Lease(_) => "lease_held",
            ReconcileError::Store(_) => "store_error",
            ReconcileError::Audit(_) => "audit_error",
            ReconcileError::DiffConflict(_) => "diff_conflict",
            ReconcileError::DeviceLocked { .. } => "device_locked",
            ReconcileError::UnknownDevice(_) => "unknown_device",
            ReconcileError::NoBaseline(_) => "no_baseline",
            ReconcileError::ProductionTarget(_) => "production_target",
            ReconcileError::HaBarrier { .. } => "ha_barrier",
            ReconcileError::Cancelled { .. } => "cancelled",
            ReconcileError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

/// Serializable summary of a [`ReconcileError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub kind: String,
    pub message: String,
}

impl From<&ReconcileError> for FailureInfo {
    fn from(err: &ReconcileError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}
