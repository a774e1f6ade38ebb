//! Append-only audit ledger.
//!
//! Entries are written once and never changed. The file-backed ledger is a
//! JSON Lines file opened in append mode; every entry is flushed before
//! [`AuditLedger::append`] returns. Compliance evidence is computed by
//! scanning entries.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit ledger I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("audit ledger {path} line {line} is not a valid entry: {source}")]
    Json {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// What an entry is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditSubject {
    Deployment { attempt_id: String, diff_id: String },
    Drift { report_id: String },
    Backup { backup_id: String },
    RestoreDrill { drill_id: String, backup_id: String },
    LockCleared { lock_id: String },
}

impl AuditSubject {
    pub fn label(&self) -> &'static str {
        match self {
            AuditSubject::Deployment { .. } => "deployment",
            AuditSubject::Drift { .. } => "drift",
            AuditSubject::Backup { .. } => "backup",
            AuditSubject::RestoreDrill { .. } => "restore_drill",
            AuditSubject::LockCleared { .. } => "lock_cleared",
        }
    }

    /// Identifier of the referenced attempt, report, backup or drill.
    pub fn reference(&self) -> &str {
        match self {
            AuditSubject::Deployment { attempt_id, .. } => attempt_id,
            AuditSubject::Drift { report_id } => report_id,
            AuditSubject::Backup { backup_id } => backup_id,
            AuditSubject::RestoreDrill { drill_id, .. } => drill_id,
            AuditSubject::LockCleared { lock_id } => lock_id,
        }
    }
}

/// Entry contents supplied by the caller; sequence, id and time are
/// assigned on append.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditDraft {
    pub device: String,
    pub ticket: Option<String>,
    pub actor: String,
    pub subject: AuditSubject,
    pub outcome: String,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    pub device: String,
    pub ticket: Option<String>,
    pub actor: String,
    pub subject: AuditSubject,
    pub outcome: String,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub device: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl AuditQuery {
    fn matches(&self, entry: &AuditEntry) -> bool {
        self.device.as_deref().map_or(true, |d| d == entry.device)
            && self.since.map_or(true, |t| entry.recorded_at >= t)
            && self.until.map_or(true, |t| entry.recorded_at <= t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub at: DateTime<Utc>,
    pub reference: String,
    pub outcome: String,
}

impl EvidenceItem {
    fn of(entry: &AuditEntry) -> Self {
        Self {
            at: entry.recorded_at,
            reference: entry.subject.reference().to_string(),
            outcome: entry.outcome.clone(),
        }
    }
}

/// Last known compliance facts for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceEvidence {
    pub device: String,
    pub last_backup: Option<EvidenceItem>,
    /// Completed deployment or passed restore drill.
    pub last_validation: Option<EvidenceItem>,
    pub last_drift_report: Option<EvidenceItem>,
    pub last_deployment: Option<EvidenceItem>,
    pub locked: bool,
}

#[derive(Debug)]
struct LedgerInner {
    entries: Vec<AuditEntry>,
    file: Option<(PathBuf, File)>,
}

#[derive(Debug)]
pub struct AuditLedger {
    inner: Mutex<LedgerInner>,
}

impl AuditLedger {
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                entries: Vec::new(),
                file: None,
            }),
        }
    }

    /// Open (or create) a JSON Lines ledger, loading existing entries.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let io = |source| AuditError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        let mut entries = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path).map_err(io)?);
            for (idx, line) in reader.lines().enumerate() {
                let line = line.map_err(io)?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry = serde_json::from_str(&line).map_err(|source| AuditError::Json {
                    path: path.display().to_string(),
                    line: idx + 1,
                    source,
                })?;
                entries.push(entry);
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io)?;
        Ok(Self {
            inner: Mutex::new(LedgerInner {
                entries,
                file: Some((path, file)),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, draft: AuditDraft) -> Result<AuditEntry, AuditError> {
        let mut inner = self.lock();
        let entry = AuditEntry {
            seq: inner.entries.last().map_or(1, |last| last.seq + 1),
            id: Uuid::new_v4().to_string(),
            recorded_at: Utc::now(),
            device: draft.device,
            ticket: draft.ticket,
            actor: draft.actor,
            subject: draft.subject,
            outcome: draft.outcome,
            detail: draft.detail,
        };
        if let Some((path, file)) = inner.file.as_mut() {
            let io = |source| AuditError::Io {
                path: path.display().to_string(),
                source,
            };
            let mut line = serde_json::to_vec(&entry).map_err(|source| AuditError::Json {
                path: path.display().to_string(),
                line: 0,
                source,
            })?;
            line.push(b'\n');
            file.write_all(&line).map_err(io)?;
            file.sync_data().map_err(io)?;
        }
        tracing::info!(
            device = %entry.device,
            subject = entry.subject.label(),
            reference = entry.subject.reference(),
            outcome = %entry.outcome,
            "audit entry recorded"
        );
        inner.entries.push(entry.clone());
        Ok(entry)
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect()
    }

    /// Entries referencing one attempt, drift report, backup or drill.
    pub fn for_reference(&self, reference: &str) -> Vec<AuditEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.subject.reference() == reference)
            .cloned()
            .collect()
    }

    pub fn evidence(&self, device: &str) -> ComplianceEvidence {
        let inner = self.lock();
        let mut evidence = ComplianceEvidence {
            device: device.to_string(),
            last_backup: None,
            last_validation: None,
            last_drift_report: None,
            last_deployment: None,
            locked: false,
        };
        for entry in inner.entries.iter().filter(|entry| entry.device == device) {
            let item = EvidenceItem::of(entry);
            match &entry.subject {
                AuditSubject::Backup { .. } if entry.outcome == "verified" => {
                    evidence.last_backup = Some(item);
                }
                AuditSubject::Deployment { .. } => {
                    match entry.outcome.as_str() {
                        "completed" => {
                            evidence.last_validation = Some(item.clone());
                            evidence.last_deployment = Some(item);
                        }
                        "deployment_locked" => evidence.locked = true,
                        _ => {}
                    }
                }
                AuditSubject::RestoreDrill { .. } if entry.outcome == "passed" => {
                    evidence.last_validation = Some(item);
                }
                AuditSubject::Drift { .. } => evidence.last_drift_report = Some(item),
                AuditSubject::LockCleared { .. } => evidence.locked = false,
                _ => {}
            }
        }
        evidence
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::{AuditDraft, AuditLedger, AuditQuery, AuditSubject};

    fn draft(device: &str, subject: AuditSubject, outcome: &str) -> AuditDraft {
        AuditDraft {
            device: device.to_string(),
            ticket: Some("CHG-1".to_string()),
            actor: "ci".to_string(),
            subject,
            outcome: outcome.to_string(),
            detail: json!({}),
        }
    }

    fn deployment(id: &str) -> AuditSubject {
        AuditSubject::Deployment {
            attempt_id: id.to_string(),
            diff_id: "diff-1".to_string(),
        }
    }

    #[test]
    fn file_ledger_appends_and_reloads() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        {
            let ledger = AuditLedger::open(&path).expect("open");
            ledger.append(draft("fw1", deployment("a1"), "completed")).expect("append");
            ledger.append(draft("fw2", deployment("a2"), "aborted")).expect("append");
        }
        let ledger = AuditLedger::open(&path).expect("reopen");
        assert_eq!(ledger.len(), 2);
        let third = ledger
            .append(draft("fw1", AuditSubject::Drift { report_id: "d1".to_string() }, "none"))
            .expect("append");
        assert_eq!(third.seq, 3);
        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn query_filters_by_device_and_time() {
        let ledger = AuditLedger::in_memory();
        let first = ledger.append(draft("fw1", deployment("a1"), "completed")).expect("append");
        ledger.append(draft("fw2", deployment("a2"), "completed")).expect("append");

        let by_device = ledger.query(&AuditQuery {
            device: Some("fw1".to_string()),
            ..AuditQuery::default()
        });
        assert_eq!(by_device.len(), 1);
        let until_first = ledger.query(&AuditQuery {
            until: Some(first.recorded_at),
            ..AuditQuery::default()
        });
        assert!(until_first.iter().all(|entry| entry.recorded_at <= first.recorded_at));
        assert!(!until_first.is_empty());
    }

    #[test]
    fn evidence_tracks_latest_facts_and_lock_state() {
        let ledger = AuditLedger::in_memory();
        ledger
            .append(draft("fw1", AuditSubject::Backup { backup_id: "b1".to_string() }, "verified"))
            .expect("append");
        ledger.append(draft("fw1", deployment("a1"), "completed")).expect("append");
        ledger.append(draft("fw1", deployment("a2"), "deployment_locked")).expect("append");

        let evidence = ledger.evidence("fw1");
        assert_eq!(evidence.last_backup.map(|item| item.reference), Some("b1".to_string()));
        assert_eq!(evidence.last_deployment.map(|item| item.reference), Some("a1".to_string()));
        assert!(evidence.locked);
        assert!(evidence.last_drift_report.is_none());

        ledger
            .append(draft("fw1", AuditSubject::LockCleared { lock_id: "a2".to_string() }, "cleared"))
            .expect("append");
        assert!(!ledger.evidence("fw1").locked);
    }
}
