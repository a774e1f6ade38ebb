//! Drift detection: live configuration against the recorded baseline.
//!
//! A run never changes device state. It holds the device lease for its whole
//! duration and compares against the baseline that was current when it
//! started.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use intent_core::{diff_with_options, DiffOptions, DiffRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use crate::adapter::AdapterOp;
use crate::audit::{AuditDraft, AuditSubject};
use crate::config::Transition;
use crate::engine::Services;
use crate::error::ReconcileError;
use crate::events::EngineEvent;
use crate::guardrail::Verdict;
use crate::lease::LeaseHolder;
use crate::policy::ShadowScope;
use crate::retry::retry_call;
use crate::store::{self, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    /// Live matches the baseline.
    None,
    /// Drift that no guardrail objects to.
    Info,
    Warn,
    Block,
}

impl DriftSeverity {
    pub fn of(diff: &DiffRecord, verdict: &Verdict) -> Self {
        if diff.is_empty() {
            return DriftSeverity::None;
        }
        match verdict {
            Verdict::Blocked { .. } => DriftSeverity::Block,
            Verdict::ApprovedWithWarnings { .. } => DriftSeverity::Warn,
            Verdict::Approved => DriftSeverity::Info,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DriftSeverity::None => "none",
            DriftSeverity::Info => "info",
            DriftSeverity::Warn => "warn",
            DriftSeverity::Block => "block",
        }
    }
}

impl Display for DriftSeverity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub id: String,
    pub device: String,
    pub baseline_version: String,
    pub baseline_fingerprint: String,
    pub live_fingerprint: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub severity: DriftSeverity,
    pub verdict: Verdict,
    pub diff: DiffRecord,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        self.severity != DriftSeverity::None
    }
}

impl Record for DriftReport {
    const COLLECTION: &'static str = "drift";

    fn record_id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Clone)]
pub struct DriftDetector {
    services: Arc<Services>,
}

impl DriftDetector {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// One drift run. Refused with [`LeaseError::Held`](crate::lease::LeaseError)
    /// while another operation holds the device.
    pub async fn run(&self, device: &str, actor: &str) -> Result<DriftReport, ReconcileError> {
        let run_id = format!("drift-{}", Uuid::new_v4());
        let span = tracing::info_span!("drift", device, run = %run_id);
        self.run_inner(device, actor, run_id).instrument(span).await
    }

    async fn run_inner(
        &self,
        device: &str,
        actor: &str,
        run_id: String,
    ) -> Result<DriftReport, ReconcileError> {
        let services = &self.services;
        if services.fleet.device(device).is_none() {
            return Err(ReconcileError::UnknownDevice(device.to_string()));
        }
        let _lease = services
            .leases
            .try_acquire(device, LeaseHolder::Drift(run_id.clone()))?;
        let baseline = services
            .fleet
            .baseline(device)
            .ok_or_else(|| ReconcileError::NoBaseline(device.to_string()))?;
        let started_at = Utc::now();

        let permit = Arc::clone(&services.pool)
            .acquire_owned()
            .await
            .map_err(|_| ReconcileError::Cancelled {
                stage: "worker pool closed".to_string(),
            })?;
        let payload = retry_call(
            &services.config.retry,
            services.config.timeouts.for_transition(Transition::Fetch),
            device,
            AdapterOp::Fetch,
            || services.adapter.fetch_live_config(device),
        )
        .await?;
        drop(permit);

        let live = payload
            .parse()?
            .relabel(baseline.scope().clone(), "live");
        let diff = diff_with_options(
            &baseline,
            &live,
            &DiffOptions::ignoring(services.config.drift.ignore.iter().cloned()),
        );
        let peers = match services.guardrails.policy().shadow_scope {
            ShadowScope::SharedZones => services.fleet.peer_baselines(baseline.scope()),
            ShadowScope::DeviceGroup => Vec::new(),
        };
        let verdict = services.guardrails.evaluate(&diff, &live, &peers);
        let severity = DriftSeverity::of(&diff, &verdict);

        let report = DriftReport {
            id: run_id,
            device: device.to_string(),
            baseline_version: baseline.version().to_string(),
            baseline_fingerprint: baseline.fingerprint(),
            live_fingerprint: live.fingerprint(),
            started_at,
            finished_at: Utc::now(),
            severity,
            verdict,
            diff,
        };
        store::put(services.store.as_ref(), &report)?;
        services.audit.append(AuditDraft {
            device: device.to_string(),
            ticket: None,
            actor: actor.to_string(),
            subject: AuditSubject::Drift {
                report_id: report.id.clone(),
            },
            outcome: severity.to_string(),
            detail: json!({
                "baseline_version": report.baseline_version,
                "changes": report.diff.change_count(),
                "verdict": report.verdict.label(),
            }),
        })?;
        tracing::info!(
            device,
            severity = %severity,
            changes = report.diff.change_count(),
            "drift run finished"
        );

        if report.has_drift() {
            services.events.emit(EngineEvent::DriftDetected {
                device: device.to_string(),
                report_id: report.id.clone(),
                severity,
                changes: report.diff.change_count(),
            });
        }
        if severity == DriftSeverity::Block {
            services.events.emit(EngineEvent::Alert {
                device: device.to_string(),
                page: false,
                reason: format!("drift blocked by guardrails: {}", report.verdict.summary()),
            });
        }
        Ok(report)
    }
}
