//! Device adapter interface.
//!
//! The engine never talks to a device directly. Every device operation goes
//! through [`DeviceAdapter`], and post-commit checks go through
//! [`ValidationRunner`]. Both are async because every call may block on the
//! network; both fail with an [`AdapterError`] whose class decides whether the
//! caller retries.

mod checks;
mod file;
mod memory;

use std::fmt::{self, Display, Formatter};

use async_trait::async_trait;
use intent_core::{parse_snapshot, DiffRecord, IntentSnapshot, ParseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use checks::{HealthCheckRunner, ScriptedChecks};
pub use file::FileDeviceAdapter;
pub use memory::{CommitLogEntry, Fault, FaultMode, MemoryDeviceAdapter};

/// Device operation labels, used in errors, logs and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterOp {
    Fetch,
    Push,
    Validate,
    Commit,
    Discard,
    HaStatus,
    Checks,
}

impl AdapterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterOp::Fetch => "fetch",
            AdapterOp::Push => "push",
            AdapterOp::Validate => "validate",
            AdapterOp::Commit => "commit",
            AdapterOp::Discard => "discard",
            AdapterOp::HaStatus => "ha_status",
            AdapterOp::Checks => "checks",
        }
    }
}

impl Display for AdapterOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Permanent,
}

impl Display for ErrorClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{operation} on {device} failed ({class}): {message}")]
pub struct AdapterError {
    pub device: String,
    pub operation: AdapterOp,
    pub class: ErrorClass,
    pub message: String,
}

impl AdapterError {
    pub fn transient(device: impl Into<String>, operation: AdapterOp, message: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            operation,
            class: ErrorClass::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(device: impl Into<String>, operation: AdapterOp, message: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            operation,
            class: ErrorClass::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }
}

/// Raw exported configuration as returned by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPayload(pub Vec<u8>);

impl ConfigPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(u8::is_ascii_whitespace)
    }

    pub fn parse(&self) -> Result<IntentSnapshot, ParseError> {
        parse_snapshot(&self.0)
    }
}

/// Reference to a candidate staged on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateHandle {
    pub id: String,
    pub device: String,
    pub diff_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub accepted: bool,
    pub messages: Vec<String>,
}

impl ValidationResult {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            messages: Vec::new(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            messages: vec![message.into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaStatus {
    Active,
    Passive,
    Degraded,
    /// Not a member of an HA pair.
    Standalone,
}

impl HaStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(HaStatus::Active),
            "passive" => Some(HaStatus::Passive),
            "degraded" => Some(HaStatus::Degraded),
            "standalone" => Some(HaStatus::Standalone),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HaStatus::Active => "active",
            HaStatus::Passive => "passive",
            HaStatus::Degraded => "degraded",
            HaStatus::Standalone => "standalone",
        }
    }
}

impl Display for HaStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    async fn fetch_live_config(&self, device: &str) -> Result<ConfigPayload, AdapterError>;

    /// Stage `diff` as an uncommitted candidate.
    async fn push_candidate(
        &self,
        device: &str,
        diff: &DiffRecord,
    ) -> Result<CandidateHandle, AdapterError>;

    /// Device-side commit-check of a staged candidate.
    async fn validate_candidate(
        &self,
        device: &str,
        candidate: &CandidateHandle,
    ) -> Result<ValidationResult, AdapterError>;

    async fn commit(
        &self,
        device: &str,
        candidate: &CandidateHandle,
        comment: &str,
    ) -> Result<CommitResult, AdapterError>;

    async fn fetch_ha_status(&self, device: &str) -> Result<HaStatus, AdapterError>;

    /// Drop a staged candidate. Adapters without candidate storage may keep
    /// the default.
    async fn discard_candidate(
        &self,
        _device: &str,
        _candidate: &CandidateHandle,
    ) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Pass/fail of a post-commit check set plus a structured report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub passed: bool,
    pub report: serde_json::Value,
}

#[async_trait]
pub trait ValidationRunner: Send + Sync {
    async fn run_checks(&self, device: &str, checks: &[String]) -> Result<CheckOutcome, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::{AdapterError, AdapterOp, ConfigPayload, HaStatus};

    #[test]
    fn error_display_names_operation_and_class() {
        let err = AdapterError::transient("fw1", AdapterOp::Commit, "session reset");
        assert_eq!(err.to_string(), "commit on fw1 failed (transient): session reset");
        assert!(err.is_transient());
        assert!(!AdapterError::permanent("fw1", AdapterOp::Push, "denied").is_transient());
    }

    #[test]
    fn whitespace_payload_counts_as_empty() {
        assert!(ConfigPayload(b" \n\t".to_vec()).is_empty());
        assert!(!ConfigPayload(b"<intent/>".to_vec()).is_empty());
    }

    #[test]
    fn ha_status_parses_case_insensitively() {
        assert_eq!(HaStatus::parse(" Passive\n"), Some(HaStatus::Passive));
        assert_eq!(HaStatus::parse("primary"), None);
    }
}
