//! Configuration backups, restore drills and retention pruning.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use intent_core::diff_snapshots;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::adapter::{AdapterOp, ConfigPayload, DeviceAdapter};
use crate::audit::{AuditDraft, AuditLedger, AuditSubject};
use crate::config::{EngineConfig, Transition};
use crate::error::{IntegrityError, ReconcileError};
use crate::retry::retry_call;
use crate::store::{self, Record, StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionClass {
    Daily,
    Weekly,
    Monthly,
}

impl RetentionClass {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(RetentionClass::Daily),
            "weekly" => Some(RetentionClass::Weekly),
            "monthly" => Some(RetentionClass::Monthly),
            _ => None,
        }
    }
}

impl Display for RetentionClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RetentionClass::Daily => "daily",
            RetentionClass::Weekly => "weekly",
            RetentionClass::Monthly => "monthly",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub device: String,
    pub taken_at: DateTime<Utc>,
    pub retention: RetentionClass,
    /// Exported configuration, verbatim.
    pub payload: String,
    /// `sha256:<hex>` over the payload bytes.
    pub checksum: String,
    pub integrity_verified: bool,
    pub snapshot_fingerprint: String,
}

impl Record for BackupRecord {
    const COLLECTION: &'static str = "backups";

    fn record_id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrillReport {
    pub id: String,
    pub backup_id: String,
    pub device: String,
    pub passed: bool,
    pub detail: String,
    pub finished_at: DateTime<Utc>,
}

pub fn checksum(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Check a payload is non-empty and parseable; returns its fingerprint.
fn check_payload(device: &str, payload: &ConfigPayload) -> Result<String, IntegrityError> {
    if payload.is_empty() {
        return Err(IntegrityError::Empty {
            device: device.to_string(),
        });
    }
    payload
        .parse()
        .map(|snapshot| snapshot.fingerprint())
        .map_err(|err| IntegrityError::Unparseable {
            device: device.to_string(),
            reason: err.to_string(),
        })
}

pub struct BackupManager {
    adapter: Arc<dyn DeviceAdapter>,
    store: Arc<dyn StateStore>,
    audit: Arc<AuditLedger>,
    config: Arc<EngineConfig>,
}

impl BackupManager {
    pub fn new(
        adapter: Arc<dyn DeviceAdapter>,
        store: Arc<dyn StateStore>,
        audit: Arc<AuditLedger>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            adapter,
            store,
            audit,
            config,
        }
    }

    /// Export, verify and persist a backup. The caller holds the device lease.
    pub async fn capture(
        &self,
        device: &str,
        retention: RetentionClass,
        actor: &str,
        ticket: Option<&str>,
    ) -> Result<BackupRecord, ReconcileError> {
        let id = format!("bk-{}", Uuid::new_v4());
        let result = self.export(&id, device, retention).await;
        let (outcome, detail) = match &result {
            Ok(record) => (
                "verified".to_string(),
                json!({ "checksum": record.checksum, "retention": record.retention }),
            ),
            Err(err) => (err.kind().to_string(), json!({ "error": err.to_string() })),
        };
        self.audit.append(AuditDraft {
            device: device.to_string(),
            ticket: ticket.map(str::to_string),
            actor: actor.to_string(),
            subject: AuditSubject::Backup { backup_id: id },
            outcome,
            detail,
        })?;
        result
    }

    async fn export(
        &self,
        id: &str,
        device: &str,
        retention: RetentionClass,
    ) -> Result<BackupRecord, ReconcileError> {
        let payload = retry_call(
            &self.config.retry,
            self.config.timeouts.for_transition(Transition::Fetch),
            device,
            AdapterOp::Fetch,
            || self.adapter.fetch_live_config(device),
        )
        .await?;
        let fingerprint = check_payload(device, &payload)?;
        let text = String::from_utf8(payload.0.clone()).map_err(|err| IntegrityError::Unparseable {
            device: device.to_string(),
            reason: err.to_string(),
        })?;

        let mut record = BackupRecord {
            id: id.to_string(),
            device: device.to_string(),
            taken_at: Utc::now(),
            retention,
            checksum: checksum(text.as_bytes()),
            payload: text,
            integrity_verified: false,
            snapshot_fingerprint: fingerprint,
        };
        verify(&record)?;
        record.integrity_verified = true;
        store::put(self.store.as_ref(), &record)?;
        tracing::info!(device, backup = %record.id, retention = %retention, "backup captured");
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<Option<BackupRecord>, ReconcileError> {
        Ok(store::get::<BackupRecord>(self.store.as_ref(), id)?)
    }

    pub fn latest(&self, device: &str) -> Result<Option<BackupRecord>, ReconcileError> {
        Ok(store::list::<BackupRecord>(self.store.as_ref())?
            .into_iter()
            .filter(|record| record.device == device)
            .max_by_key(|record| record.taken_at))
    }

    /// Replay a backup onto a non-production device and confirm the result.
    /// The caller holds the target's lease and has refused production targets.
    pub async fn restore_drill(
        &self,
        backup_id: &str,
        target: &str,
        actor: &str,
    ) -> Result<DrillReport, ReconcileError> {
        let drill_id = format!("drill-{}", Uuid::new_v4());
        let result = self.replay(backup_id, target).await;
        let report = DrillReport {
            id: drill_id.clone(),
            backup_id: backup_id.to_string(),
            device: target.to_string(),
            passed: result.is_ok(),
            detail: match &result {
                Ok(detail) => detail.clone(),
                Err(err) => err.to_string(),
            },
            finished_at: Utc::now(),
        };
        tracing::info!(device = target, drill = %drill_id, passed = report.passed, "restore drill finished");
        self.audit.append(AuditDraft {
            device: target.to_string(),
            ticket: None,
            actor: actor.to_string(),
            subject: AuditSubject::RestoreDrill {
                drill_id,
                backup_id: backup_id.to_string(),
            },
            outcome: if report.passed { "passed" } else { "failed" }.to_string(),
            detail: json!({ "detail": report.detail }),
        })?;
        Ok(report)
    }

    async fn replay(&self, backup_id: &str, target: &str) -> Result<String, ReconcileError> {
        let record = self.get(backup_id)?.ok_or_else(|| IntegrityError::Unparseable {
            device: target.to_string(),
            reason: format!("backup {backup_id} not found"),
        })?;
        verify(&record)?;
        let wanted = ConfigPayload(record.payload.clone().into_bytes()).parse()?;

        let retry = &self.config.retry;
        let timeouts = &self.config.timeouts;
        let live = retry_call(retry, timeouts.for_transition(Transition::Fetch), target, AdapterOp::Fetch, || {
            self.adapter.fetch_live_config(target)
        })
        .await?
        .parse()?;
        let diff = diff_snapshots(&live, &wanted);
        let candidate = retry_call(retry, timeouts.for_transition(Transition::Stage), target, AdapterOp::Push, || {
            self.adapter.push_candidate(target, &diff)
        })
        .await?;
        let verdict = retry_call(
            retry,
            timeouts.for_transition(Transition::Validate),
            target,
            AdapterOp::Validate,
            || self.adapter.validate_candidate(target, &candidate),
        )
        .await?;
        if !verdict.accepted {
            if let Err(err) = self.adapter.discard_candidate(target, &candidate).await {
                tracing::warn!(device = target, error = %err, "discarding rejected restore candidate failed");
            }
            return Err(ReconcileError::ValidationFailed {
                device: target.to_string(),
                stage: "restore".to_string(),
                detail: verdict.messages.join("; "),
            });
        }
        let comment = format!("restore-drill backup={backup_id}");
        retry_call(retry, timeouts.for_transition(Transition::Commit), target, AdapterOp::Commit, || {
            self.adapter.commit(target, &candidate, &comment)
        })
        .await?;

        let after = retry_call(retry, timeouts.for_transition(Transition::Fetch), target, AdapterOp::Fetch, || {
            self.adapter.fetch_live_config(target)
        })
        .await?
        .parse()?;
        if after.fingerprint() != record.snapshot_fingerprint {
            return Err(ReconcileError::ValidationFailed {
                device: target.to_string(),
                stage: "restore".to_string(),
                detail: "restored configuration does not match the backup".to_string(),
            });
        }
        Ok(format!("{} changes replayed", diff.change_count()))
    }

    /// Remove backups past their class retention, always keeping each
    /// device's most recent record. Returns removed ids.
    pub fn prune(&self, now: DateTime<Utc>) -> Result<Vec<String>, ReconcileError> {
        let records = store::list::<BackupRecord>(self.store.as_ref())?;
        let mut newest: BTreeMap<&str, &BackupRecord> = BTreeMap::new();
        for record in &records {
            let entry = newest.entry(record.device.as_str()).or_insert(record);
            if (record.taken_at, &record.id) > (entry.taken_at, &entry.id) {
                *entry = record;
            }
        }

        let mut removed = Vec::new();
        for record in &records {
            if newest.get(record.device.as_str()).is_some_and(|keep| keep.id == record.id) {
                continue;
            }
            if now - record.taken_at > self.retention(record.retention) {
                store::delete::<BackupRecord>(self.store.as_ref(), &record.id)?;
                tracing::info!(device = %record.device, backup = %record.id, "backup pruned");
                removed.push(record.id.clone());
            }
        }
        Ok(removed)
    }

    fn retention(&self, class: RetentionClass) -> ChronoDuration {
        let backup = &self.config.backup;
        let days = match class {
            RetentionClass::Daily => backup.daily_days,
            RetentionClass::Weekly => backup.weekly_days,
            RetentionClass::Monthly => backup.monthly_days,
        };
        ChronoDuration::try_days(days).unwrap_or(ChronoDuration::MAX)
    }
}

/// Recompute the checksum and re-parse the payload.
pub fn verify(record: &BackupRecord) -> Result<(), IntegrityError> {
    let actual = checksum(record.payload.as_bytes());
    if actual != record.checksum {
        return Err(IntegrityError::ChecksumMismatch {
            id: record.id.clone(),
            expected: record.checksum.clone(),
            actual,
        });
    }
    check_payload(&record.device, &ConfigPayload(record.payload.clone().into_bytes())).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::{checksum, verify, BackupRecord, RetentionClass};
    use crate::error::IntegrityError;

    const PAYLOAD: &str = r#"<intent environment="lab" group="core" version="v1"/>"#;

    fn record() -> BackupRecord {
        BackupRecord {
            id: "bk-1".to_string(),
            device: "fw1".to_string(),
            taken_at: chrono::Utc::now(),
            retention: RetentionClass::Daily,
            payload: PAYLOAD.to_string(),
            checksum: checksum(PAYLOAD.as_bytes()),
            integrity_verified: true,
            snapshot_fingerprint: String::new(),
        }
    }

    #[test]
    fn checksum_is_prefixed_sha256() {
        let sum = checksum(b"abc");
        assert_eq!(
            sum,
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let mut tampered = record();
        assert!(verify(&tampered).is_ok());
        tampered.payload.push(' ');
        assert!(matches!(verify(&tampered), Err(IntegrityError::ChecksumMismatch { .. })));
    }

    #[test]
    fn retention_class_parses_labels() {
        assert_eq!(RetentionClass::parse("Weekly"), Some(RetentionClass::Weekly));
        assert_eq!(RetentionClass::parse("yearly"), None);
    }
}
