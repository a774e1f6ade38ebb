//! Composition root.
//!
//! [`Engine`] wires the adapter, stores, ledger and policy together and
//! exposes the fleet-level operations: deployments, drift runs, backups,
//! restore drills and lock clearing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use intent_core::IntentSnapshot;
use serde_json::json;
use tokio::sync::Semaphore;

use crate::adapter::{DeviceAdapter, HealthCheckRunner, ValidationRunner};
use crate::audit::{AuditDraft, AuditLedger, AuditSubject, ComplianceEvidence};
use crate::backup::{BackupManager, BackupRecord, DrillReport, RetentionClass};
use crate::config::EngineConfig;
use crate::deploy::{CancelSignal, DeploymentAttempt, DeploymentRequest, Orchestrator};
use crate::drift::{DriftDetector, DriftReport};
use crate::error::ReconcileError;
use crate::events::{EventSink, TracingSink};
use crate::fleet::{BaselineRecord, DeviceLock, Fleet};
use crate::guardrail::GuardrailEvaluator;
use crate::lease::{LeaseHolder, LeaseTable};
use crate::policy::{GuardrailPolicy, PolicyError};
use crate::store::{self, MemoryStore, StateStore};

/// Shared collaborators of every engine operation.
pub struct Services {
    pub adapter: Arc<dyn DeviceAdapter>,
    pub checks: Arc<dyn ValidationRunner>,
    pub store: Arc<dyn StateStore>,
    pub audit: Arc<AuditLedger>,
    pub events: Arc<dyn EventSink>,
    pub fleet: Arc<Fleet>,
    pub leases: Arc<LeaseTable>,
    /// Bounds concurrent device operations.
    pub pool: Arc<Semaphore>,
    pub config: Arc<EngineConfig>,
    pub guardrails: Arc<GuardrailEvaluator>,
    pub backups: Arc<BackupManager>,
}

pub struct EngineBuilder {
    fleet: Fleet,
    adapter: Arc<dyn DeviceAdapter>,
    checks: Option<Arc<dyn ValidationRunner>>,
    store: Option<Arc<dyn StateStore>>,
    audit: Option<Arc<AuditLedger>>,
    events: Option<Arc<dyn EventSink>>,
    config: EngineConfig,
    policy: Option<GuardrailPolicy>,
}

impl EngineBuilder {
    pub fn checks(mut self, checks: Arc<dyn ValidationRunner>) -> Self {
        self.checks = Some(checks);
        self
    }

    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn audit(mut self, audit: Arc<AuditLedger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn policy(mut self, policy: GuardrailPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Defaults: health checks through the adapter, in-memory store and
    /// ledger, tracing events, the embedded guardrail policy.
    pub fn build(self) -> Result<Engine, PolicyError> {
        let policy = match self.policy {
            Some(policy) => policy,
            None => GuardrailPolicy::embedded()?,
        };
        let guardrails = Arc::new(GuardrailEvaluator::from_policy(policy)?);
        let adapter = self.adapter;
        let checks = self
            .checks
            .unwrap_or_else(|| Arc::new(HealthCheckRunner::new(Arc::clone(&adapter))));
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let audit = self.audit.unwrap_or_else(|| Arc::new(AuditLedger::in_memory()));
        let events = self.events.unwrap_or_else(|| Arc::new(TracingSink));
        let config = Arc::new(self.config);
        let backups = Arc::new(BackupManager::new(
            Arc::clone(&adapter),
            Arc::clone(&store),
            Arc::clone(&audit),
            Arc::clone(&config),
        ));
        let services = Arc::new(Services {
            adapter,
            checks,
            store,
            audit,
            events,
            fleet: Arc::new(self.fleet),
            leases: Arc::new(LeaseTable::new()),
            pool: Arc::new(Semaphore::new(config.pool.max_in_flight.max(1))),
            config,
            guardrails,
            backups,
        });
        Ok(Engine {
            orchestrator: Orchestrator::new(Arc::clone(&services)),
            drift: DriftDetector::new(Arc::clone(&services)),
            services,
        })
    }
}

pub struct Engine {
    services: Arc<Services>,
    orchestrator: Orchestrator,
    drift: DriftDetector,
}

impl Engine {
    pub fn builder(fleet: Fleet, adapter: Arc<dyn DeviceAdapter>) -> EngineBuilder {
        EngineBuilder {
            fleet,
            adapter,
            checks: None,
            store: None,
            audit: None,
            events: None,
            config: EngineConfig::default(),
            policy: None,
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn fleet(&self) -> &Fleet {
        &self.services.fleet
    }

    pub fn audit(&self) -> &AuditLedger {
        &self.services.audit
    }

    pub fn leases(&self) -> &LeaseTable {
        &self.services.leases
    }

    /// Reinstall baselines and deployment locks persisted by earlier runs.
    pub fn load_persisted(&self) -> Result<(), ReconcileError> {
        let store = self.services.store.as_ref();
        for record in store::list::<BaselineRecord>(store)? {
            self.services.fleet.seed_baseline(&record.device, record.snapshot);
        }
        for lock in store::list::<DeviceLock>(store)? {
            self.services.fleet.lock(lock);
        }
        Ok(())
    }

    /// Record `snapshot` as the device's baseline outside a deployment, for
    /// example when adopting a device already in the desired state.
    pub fn adopt_baseline(&self, device: &str, snapshot: IntentSnapshot) -> Result<(), ReconcileError> {
        if self.services.fleet.device(device).is_none() {
            return Err(ReconcileError::UnknownDevice(device.to_string()));
        }
        store::put(
            self.services.store.as_ref(),
            &BaselineRecord {
                device: device.to_string(),
                snapshot: snapshot.clone(),
                attempt_id: None,
                recorded_at: Utc::now(),
            },
        )?;
        self.services.fleet.seed_baseline(device, snapshot);
        Ok(())
    }

    pub async fn deploy(
        &self,
        request: DeploymentRequest,
        cancel: CancelSignal,
    ) -> Result<DeploymentAttempt, ReconcileError> {
        self.orchestrator.deploy(request, None, cancel).await
    }

    /// Deploy to several devices in parallel; results follow `devices` order.
    pub async fn deploy_all(
        &self,
        target: Arc<IntentSnapshot>,
        devices: &[String],
        ticket: &str,
        actor: &str,
        cancel: CancelSignal,
    ) -> Vec<Result<DeploymentAttempt, ReconcileError>> {
        self.orchestrator
            .deploy_batch(target, devices, ticket, actor, cancel)
            .await
    }

    pub async fn detect_drift(&self, device: &str, actor: &str) -> Result<DriftReport, ReconcileError> {
        self.drift.run(device, actor).await
    }

    /// Independent drift runs, one task per device; results follow `devices`.
    pub async fn drift_all(
        &self,
        devices: &[String],
        actor: &str,
    ) -> Vec<Result<DriftReport, ReconcileError>> {
        let tasks: Vec<_> = devices
            .iter()
            .map(|device| {
                let detector = self.drift.clone();
                let device = device.clone();
                let actor = actor.to_string();
                tokio::spawn(async move { detector.run(&device, &actor).await })
            })
            .collect();
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(task.await.unwrap_or_else(|err| {
                Err(ReconcileError::Cancelled {
                    stage: format!("drift task: {err}"),
                })
            }));
        }
        results
    }

    /// Capture a backup outside a deployment. Refused while the device is
    /// leased.
    pub async fn backup(
        &self,
        device: &str,
        class: RetentionClass,
        actor: &str,
        ticket: Option<&str>,
    ) -> Result<BackupRecord, ReconcileError> {
        let services = &self.services;
        if services.fleet.device(device).is_none() {
            return Err(ReconcileError::UnknownDevice(device.to_string()));
        }
        let _lease = services
            .leases
            .try_acquire(device, LeaseHolder::Backup(class.to_string()))?;
        let _permit = self.permit().await?;
        services.backups.capture(device, class, actor, ticket).await
    }

    pub async fn restore_drill(
        &self,
        backup_id: &str,
        target: &str,
        actor: &str,
    ) -> Result<DrillReport, ReconcileError> {
        let services = &self.services;
        let device = services
            .fleet
            .device(target)
            .ok_or_else(|| ReconcileError::UnknownDevice(target.to_string()))?;
        if device.production {
            return Err(ReconcileError::ProductionTarget(target.to_string()));
        }
        let _lease = services
            .leases
            .try_acquire(target, LeaseHolder::RestoreDrill(backup_id.to_string()))?;
        let _permit = self.permit().await?;
        services.backups.restore_drill(backup_id, target, actor).await
    }

    pub fn prune_backups(&self, now: DateTime<Utc>) -> Result<Vec<String>, ReconcileError> {
        self.services.backups.prune(now)
    }

    /// Re-enable automation on a deployment-locked device. Returns the
    /// cleared lock, or `None` when the device was not locked.
    pub fn clear_lock(&self, device: &str, actor: &str) -> Result<Option<DeviceLock>, ReconcileError> {
        let services = &self.services;
        if services.fleet.device(device).is_none() {
            return Err(ReconcileError::UnknownDevice(device.to_string()));
        }
        let Some(lock) = services.fleet.clear_lock(device) else {
            return Ok(None);
        };
        store::delete::<DeviceLock>(services.store.as_ref(), device)?;
        services.audit.append(AuditDraft {
            device: device.to_string(),
            ticket: None,
            actor: actor.to_string(),
            subject: AuditSubject::LockCleared {
                lock_id: lock.attempt_id.clone(),
            },
            outcome: "cleared".to_string(),
            detail: json!({ "reason": lock.reason, "locked_at": lock.locked_at }),
        })?;
        tracing::warn!(device, actor, attempt = %lock.attempt_id, "deployment lock cleared");
        Ok(Some(lock))
    }

    pub fn evidence(&self, device: &str) -> ComplianceEvidence {
        self.services.audit.evidence(device)
    }

    async fn permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>, ReconcileError> {
        self.services
            .pool
            .acquire()
            .await
            .map_err(|_| ReconcileError::Cancelled {
                stage: "worker pool closed".to_string(),
            })
    }
}
