//! Per-device staged-commit driver.
//!
//! Order of resources for one attempt: the device lease first, then a worker
//! pool permit. An active HA member gives its permit back while it waits for
//! the passive member to commit, so a pool of one still completes a pair.

use std::sync::Arc;

use intent_core::{diff_snapshots, IntentSnapshot};
use serde_json::json;
use tokio::sync::OwnedSemaphorePermit;
use tracing::Instrument;
use uuid::Uuid;

use super::{AttemptOutcome, AttemptState, BarrierGate, BarrierRelease, CancelSignal, DeploymentAttempt};
use crate::adapter::{AdapterOp, HaStatus};
use crate::audit::{AuditDraft, AuditSubject};
use crate::config::Transition;
use crate::engine::Services;
use crate::error::{FailureInfo, ReconcileError};
use crate::events::EngineEvent;
use crate::fleet::{BaselineRecord, DeviceLock, DeviceRef};
use crate::lease::LeaseHolder;
use crate::policy::ShadowScope;
use crate::retry::retry_call;
use crate::store;

/// What to deploy where, and on whose behalf.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub device: String,
    pub target: Arc<IntentSnapshot>,
    pub ticket: String,
    pub actor: String,
}

/// Role of an attempt in an HA pair batch.
#[derive(Debug)]
pub enum HaLink {
    Passive(BarrierRelease),
    Active(BarrierGate),
    /// Roles could not be established; the attempt aborts.
    Indeterminate(String),
}

/// Why the forward path stopped.
enum Stop {
    /// End from `Pending`.
    Abort(ReconcileError),
    /// End in `Failed`; nothing was committed.
    Fail(ReconcileError),
    /// `Failed`, then restore the prior configuration.
    Rollback(ReconcileError),
    /// Store, ledger or state-machine fault. Before anything reaches the
    /// device the attempt ends from where it is; afterwards it rolls back.
    Internal(ReconcileError),
}

/// Terminal path taken once the forward path has stopped.
enum Ending {
    Abort,
    Fail,
    Rollback,
}

impl From<ReconcileError> for Stop {
    fn from(err: ReconcileError) -> Self {
        Stop::Internal(err)
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    services: Arc<Services>,
}

impl Orchestrator {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Run one attempt to a terminal state.
    ///
    /// `Err` is returned only when the attempt could not be set up or
    /// recorded; every device-facing failure ends in an outcome instead.
    /// An HA member without a link to its peer aborts: pairs only deploy
    /// together, through [`Orchestrator::deploy_batch`].
    pub async fn deploy(
        &self,
        request: DeploymentRequest,
        ha: Option<HaLink>,
        cancel: CancelSignal,
    ) -> Result<DeploymentAttempt, ReconcileError> {
        let device = self
            .services
            .fleet
            .device(&request.device)
            .cloned()
            .ok_or_else(|| ReconcileError::UnknownDevice(request.device.clone()))?;
        let ha = ha.or_else(|| {
            device.ha_peer.as_ref().map(|peer| {
                HaLink::Indeterminate(format!(
                    "{} is an HA member; deploy it together with its peer {peer}",
                    device.id
                ))
            })
        });
        let attempt = DeploymentAttempt::new(
            format!("att-{}", Uuid::new_v4()),
            &device.id,
            request.target.version(),
            &request.ticket,
            &request.actor,
        );
        let span = tracing::info_span!("deployment", device = %device.id, attempt = %attempt.id);
        let run = Run {
            services: &self.services,
            device,
            target: request.target,
            attempt,
            ha,
            cancel,
            pre_change: None,
            pushed: false,
            committed: false,
            record_fault: None,
        };
        run.execute().instrument(span).await
    }

    /// Deploy one target to several devices in parallel.
    ///
    /// HA pairs present in the batch are ordered through a barrier: the
    /// passive member commits first. When the pair's roles are not exactly
    /// one active and one passive, both attempts abort.
    pub async fn deploy_batch(
        &self,
        target: Arc<IntentSnapshot>,
        devices: &[String],
        ticket: &str,
        actor: &str,
        cancel: CancelSignal,
    ) -> Vec<Result<DeploymentAttempt, ReconcileError>> {
        let mut links = self.pair_links(devices).await;
        let mut tasks = Vec::with_capacity(devices.len());
        for device in devices {
            let orchestrator = self.clone();
            let request = DeploymentRequest {
                device: device.clone(),
                target: Arc::clone(&target),
                ticket: ticket.to_string(),
                actor: actor.to_string(),
            };
            let link = links.remove(device);
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                orchestrator.deploy(request, link, cancel).await
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(task.await.unwrap_or_else(|err| {
                Err(ReconcileError::Cancelled {
                    stage: format!("deployment task: {err}"),
                })
            }));
        }
        results
    }

    async fn pair_links(&self, devices: &[String]) -> std::collections::BTreeMap<String, HaLink> {
        let mut links = std::collections::BTreeMap::new();
        for device in devices {
            let Some(peer) = self
                .services
                .fleet
                .device(device)
                .and_then(|d| d.ha_peer.clone())
            else {
                continue;
            };
            if !devices.contains(&peer) || links.contains_key(device) || links.contains_key(&peer) {
                continue;
            }
            let roles = (self.ha_status(device).await, self.ha_status(&peer).await);
            match roles {
                (Ok(HaStatus::Passive), Ok(HaStatus::Active)) => {
                    let (release, gate) = super::ha_barrier();
                    links.insert(device.clone(), HaLink::Passive(release));
                    links.insert(peer, HaLink::Active(gate));
                }
                (Ok(HaStatus::Active), Ok(HaStatus::Passive)) => {
                    let (release, gate) = super::ha_barrier();
                    links.insert(peer, HaLink::Passive(release));
                    links.insert(device.clone(), HaLink::Active(gate));
                }
                (own, other) => {
                    let describe = |r: &Result<HaStatus, ReconcileError>| match r {
                        Ok(status) => status.to_string(),
                        Err(err) => format!("unknown ({err})"),
                    };
                    let reason = format!(
                        "HA roles indeterminate: {device} is {}, {peer} is {}",
                        describe(&own),
                        describe(&other)
                    );
                    tracing::warn!(device = %device, peer = %peer, %reason, "HA pair will not be deployed");
                    links.insert(device.clone(), HaLink::Indeterminate(reason.clone()));
                    links.insert(peer, HaLink::Indeterminate(reason));
                }
            }
        }
        links
    }

    async fn ha_status(&self, device: &str) -> Result<HaStatus, ReconcileError> {
        let services = &self.services;
        Ok(retry_call(
            &services.config.retry,
            services.config.timeouts.for_transition(Transition::Fetch),
            device,
            AdapterOp::HaStatus,
            || services.adapter.fetch_ha_status(device),
        )
        .await?)
    }
}

struct Run<'a> {
    services: &'a Services,
    device: DeviceRef,
    target: Arc<IntentSnapshot>,
    attempt: DeploymentAttempt,
    ha: Option<HaLink>,
    cancel: CancelSignal,
    /// Live configuration fetched in `Pending`.
    pre_change: Option<IntentSnapshot>,
    /// A candidate reached the device.
    pushed: bool,
    /// The device accepted the commit, whether or not it was recorded.
    committed: bool,
    /// First bookkeeping failure once the attempt is under way.
    record_fault: Option<ReconcileError>,
}

impl Run<'_> {
    async fn execute(mut self) -> Result<DeploymentAttempt, ReconcileError> {
        let services = self.services;
        let _lease = services
            .leases
            .acquire(&self.device.id, LeaseHolder::Deployment(self.attempt.id.clone()))
            .await;
        self.persist()?;
        let mut permit = Some(self.permit().await?);

        let forward = self.forward(&mut permit).await;
        let ending = match forward {
            Ok(()) => None,
            Err(Stop::Abort(err)) => Some((Ending::Abort, FailureInfo::from(&err))),
            Err(Stop::Fail(err)) => Some((Ending::Fail, FailureInfo::from(&err))),
            Err(Stop::Rollback(err)) => Some((Ending::Rollback, FailureInfo::from(&err))),
            Err(Stop::Internal(err)) => {
                tracing::error!(device = %self.device.id, error = %err, "attempt bookkeeping failed");
                let ending = if self.pushed {
                    Ending::Rollback
                } else if self.attempt.state == AttemptState::Pending {
                    Ending::Abort
                } else {
                    Ending::Fail
                };
                let info = FailureInfo::from(&err);
                self.record_fault.get_or_insert(err);
                Some((ending, info))
            }
        };

        match ending {
            None => {
                let stepped = self.step(AttemptState::Completed, None);
                self.keep(stepped);
                let baseline = services
                    .fleet
                    .record_completed(&self.device.id, self.target.as_ref().clone());
                let stored = store::put(
                    services.store.as_ref(),
                    &BaselineRecord {
                        device: self.device.id.clone(),
                        snapshot: baseline.as_ref().clone(),
                        attempt_id: Some(self.attempt.id.clone()),
                        recorded_at: chrono::Utc::now(),
                    },
                );
                self.keep(stored.map_err(ReconcileError::from));
                self.finish(AttemptOutcome::Completed);
            }
            Some((Ending::Abort, error)) => {
                let stepped = self.step(AttemptState::Aborted, Some(error.kind.clone()));
                self.keep(stepped);
                self.finish(AttemptOutcome::Aborted { error });
            }
            Some((Ending::Fail, error)) => {
                self.discard_candidate().await;
                let stepped = self.step(AttemptState::Failed, Some(error.kind.clone()));
                self.keep(stepped);
                self.finish(AttemptOutcome::Failed { error });
            }
            Some((Ending::Rollback, error)) => {
                let stepped = self.step(AttemptState::Failed, Some(error.kind.clone()));
                self.keep(stepped);
                let committed = self.committed || self.attempt.commits > 0;
                match self.rollback(committed).await {
                    Ok(()) => {
                        let stepped = self.step(AttemptState::RolledBack, None);
                        self.keep(stepped);
                        self.finish(AttemptOutcome::RolledBack { error });
                    }
                    Err(rollback_err) => {
                        let locked = ReconcileError::RollbackFailed {
                            device: self.device.id.clone(),
                            detail: format!("after {}: {rollback_err}", error.kind),
                        };
                        let stepped =
                            self.step(AttemptState::Locked, Some(rollback_err.to_string()));
                        self.keep(stepped);
                        let lock_written = self.lock_device(&locked);
                        self.keep(lock_written);
                        self.finish(AttemptOutcome::Locked {
                            error: FailureInfo::from(&locked),
                        });
                    }
                }
            }
        }
        drop(permit);
        match self.record_fault.take() {
            Some(err) => {
                services.events.emit(EngineEvent::Alert {
                    device: self.device.id.clone(),
                    page: services.fleet.lock_state(&self.device.id).is_some(),
                    reason: format!(
                        "deployment attempt {} ended {} but was not fully recorded: {err}",
                        self.attempt.id,
                        self.attempt.state
                    ),
                });
                Err(err)
            }
            None => Ok(self.attempt),
        }
    }

    /// Hold on to the first bookkeeping failure without stopping device work.
    fn keep(&mut self, result: Result<(), ReconcileError>) {
        if let Err(err) = result {
            tracing::error!(
                device = %self.device.id,
                attempt = %self.attempt.id,
                error = %err,
                "attempt record not written"
            );
            self.record_fault.get_or_insert(err);
        }
    }

    async fn forward(&mut self, permit: &mut Option<OwnedSemaphorePermit>) -> Result<(), Stop> {
        let services = self.services;
        let config = &services.config;
        let device = self.device.id.clone();

        // Pending
        if let Some(lock) = services.fleet.lock_state(&device) {
            return Err(Stop::Abort(ReconcileError::DeviceLocked {
                device,
                reason: lock.reason,
            }));
        }
        if let Some(HaLink::Indeterminate(reason)) = &self.ha {
            return Err(Stop::Abort(ReconcileError::HaBarrier {
                device,
                reason: reason.clone(),
            }));
        }
        self.check_cancel(AttemptState::Pending).map_err(Stop::Abort)?;

        let live = self.fetch_live().await.map_err(Stop::Abort)?;
        let diff = diff_snapshots(&live, &self.target);
        self.pre_change = Some(live);
        self.attempt.diff_id = Some(diff.id.clone());
        store::put(services.store.as_ref(), self.target.as_ref()).map_err(ReconcileError::from)?;
        store::put(services.store.as_ref(), &diff).map_err(ReconcileError::from)?;

        let peers = match services.guardrails.policy().shadow_scope {
            ShadowScope::SharedZones => services.fleet.peer_baselines(self.target.scope()),
            ShadowScope::DeviceGroup => Vec::new(),
        };
        let verdict = services.guardrails.evaluate(&diff, &self.target, &peers);
        self.attempt.verdict = Some(verdict.clone());
        if verdict.is_blocked() {
            services.events.emit(EngineEvent::GuardrailBlocked {
                device: device.clone(),
                attempt_id: self.attempt.id.clone(),
                violations: verdict.blocking().map(|v| v.rule_id.clone()).collect(),
            });
            return Err(Stop::Abort(ReconcileError::GuardrailBlocked {
                violations: verdict.blocking().count(),
                summary: verdict.summary(),
            }));
        }
        self.step(AttemptState::GuardrailChecked, Some(verdict.label().to_string()))?;

        // GuardrailChecked
        self.check_cancel(AttemptState::GuardrailChecked).map_err(Stop::Fail)?;
        if config.backup.required_before_deploy {
            let backup = services
                .backups
                .capture(
                    &device,
                    config.backup.gate_class,
                    &self.attempt.actor,
                    Some(&self.attempt.ticket),
                )
                .await
                .map_err(Stop::Fail)?;
            self.attempt.backup_id = Some(backup.id);
        }
        let candidate = retry_call(
            &config.retry,
            config.timeouts.for_transition(Transition::Stage),
            &device,
            AdapterOp::Push,
            || services.adapter.push_candidate(&device, &diff),
        )
        .await
        .map_err(|err| Stop::Fail(err.into()))?;
        self.pushed = true;
        self.attempt.candidate = Some(candidate.clone());
        self.step(AttemptState::Staged, Some(candidate.id.clone()))?;

        // Staged
        if let Some(HaLink::Active(gate)) = self.ha.as_mut() {
            drop(permit.take());
            tracing::info!(device = %device, "waiting for passive member to commit");
            let waited = gate.wait(config.timeouts.for_transition(Transition::Ha)).await;
            if let Err(err) = waited {
                self.discard_candidate().await;
                return Err(Stop::Fail(ReconcileError::HaBarrier {
                    device,
                    reason: err.to_string(),
                }));
            }
            *permit = Some(self.permit().await?);
        }
        self.check_cancel(AttemptState::Staged).map_err(Stop::Rollback)?;
        let validation = retry_call(
            &config.retry,
            config.timeouts.for_transition(Transition::Validate),
            &device,
            AdapterOp::Validate,
            || services.adapter.validate_candidate(&device, &candidate),
        )
        .await;
        let validation = match validation {
            Ok(result) => result,
            Err(err) => {
                self.discard_candidate().await;
                return Err(Stop::Fail(err.into()));
            }
        };
        if !validation.accepted {
            self.discard_candidate().await;
            return Err(Stop::Fail(ReconcileError::ValidationFailed {
                device,
                stage: "commit-check".to_string(),
                detail: validation.messages.join("; "),
            }));
        }
        self.step(AttemptState::Validated, None)?;

        // Validated
        self.check_cancel(AttemptState::Validated).map_err(Stop::Rollback)?;
        let comment = format!(
            "ticket={} diff={} attempt={}",
            self.attempt.ticket, diff.id, self.attempt.id
        );
        let commit = retry_call(
            &config.retry,
            config.timeouts.for_transition(Transition::Commit),
            &device,
            AdapterOp::Commit,
            || services.adapter.commit(&device, &candidate, &comment),
        )
        .await
        .map_err(|err| Stop::Rollback(err.into()))?;
        self.committed = true;
        self.attempt.candidate = None;
        self.step(AttemptState::Committed, Some(format!("revision {}", commit.revision)))?;
        if matches!(self.ha, Some(HaLink::Passive(_))) {
            if let Some(HaLink::Passive(release)) = self.ha.take() {
                release.committed();
            }
        }

        // Committed
        self.check_cancel(AttemptState::Committed).map_err(Stop::Rollback)?;
        let checks = &config.post_validate.checks;
        let outcome = retry_call(
            &config.retry,
            config.timeouts.for_transition(Transition::PostValidate),
            &device,
            AdapterOp::Checks,
            || services.checks.run_checks(&device, checks),
        )
        .await
        .map_err(|err| Stop::Rollback(err.into()))?;
        self.attempt.check_report = Some(outcome.report.clone());
        if !outcome.passed {
            return Err(Stop::Rollback(ReconcileError::ValidationFailed {
                device,
                stage: "post-validate".to_string(),
                detail: outcome.report.to_string(),
            }));
        }
        self.step(AttemptState::PostValidated, None)?;
        Ok(())
    }

    /// Restore the configuration that preceded this attempt: the recorded
    /// baseline once something was committed, otherwise the live
    /// configuration fetched before staging.
    async fn rollback(&mut self, committed: bool) -> Result<(), ReconcileError> {
        self.discard_candidate().await;
        let restore_to = if committed {
            self.services
                .fleet
                .baseline(&self.device.id)
                .map(|baseline| baseline.as_ref().clone())
                .or_else(|| self.pre_change.clone())
        } else {
            self.pre_change.clone()
        };
        let Some(restore_to) = restore_to else {
            return Err(ReconcileError::RollbackFailed {
                device: self.device.id.clone(),
                detail: "no prior configuration is known".to_string(),
            });
        };

        let tries = self.services.config.rollback.max_attempts.max(1);
        let pause = std::time::Duration::from_millis(self.services.config.retry.initial_backoff_ms);
        let mut last = None;
        for n in 1..=tries {
            match self.restore(&restore_to).await {
                Ok(()) => {
                    tracing::info!(device = %self.device.id, tries = n, "rollback confirmed");
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(device = %self.device.id, try_no = n, error = %err, "rollback try failed");
                    last = Some(err);
                    if n < tries {
                        tokio::time::sleep(pause).await;
                    }
                }
            }
        }
        Err(last.unwrap_or_else(|| ReconcileError::RollbackFailed {
            device: self.device.id.clone(),
            detail: "rollback was not attempted".to_string(),
        }))
    }

    async fn restore(&self, restore_to: &IntentSnapshot) -> Result<(), ReconcileError> {
        let services = self.services;
        let config = &services.config;
        let device = self.device.id.as_str();

        let live = self.fetch_live().await?;
        if live.fingerprint() == restore_to.fingerprint() {
            return Ok(());
        }
        let diff = diff_snapshots(&live, restore_to);
        let candidate = retry_call(
            &config.retry,
            config.timeouts.for_transition(Transition::Stage),
            device,
            AdapterOp::Push,
            || services.adapter.push_candidate(device, &diff),
        )
        .await?;
        let validation = retry_call(
            &config.retry,
            config.timeouts.for_transition(Transition::Validate),
            device,
            AdapterOp::Validate,
            || services.adapter.validate_candidate(device, &candidate),
        )
        .await?;
        if !validation.accepted {
            return Err(ReconcileError::ValidationFailed {
                device: device.to_string(),
                stage: "rollback".to_string(),
                detail: validation.messages.join("; "),
            });
        }
        let comment = format!(
            "rollback ticket={} attempt={}",
            self.attempt.ticket, self.attempt.id
        );
        retry_call(
            &config.retry,
            config.timeouts.for_transition(Transition::Commit),
            device,
            AdapterOp::Commit,
            || services.adapter.commit(device, &candidate, &comment),
        )
        .await?;

        let after = self.fetch_live().await?;
        if after.fingerprint() == restore_to.fingerprint() {
            Ok(())
        } else {
            Err(ReconcileError::RollbackFailed {
                device: device.to_string(),
                detail: "device configuration does not match the restored snapshot".to_string(),
            })
        }
    }

    async fn fetch_live(&self) -> Result<IntentSnapshot, ReconcileError> {
        let services = self.services;
        let device = self.device.id.as_str();
        let payload = retry_call(
            &services.config.retry,
            services.config.timeouts.for_transition(Transition::Fetch),
            device,
            AdapterOp::Fetch,
            || services.adapter.fetch_live_config(device),
        )
        .await?;
        Ok(payload.parse()?)
    }

    async fn discard_candidate(&mut self) {
        let Some(candidate) = self.attempt.candidate.take() else {
            return;
        };
        if let Err(err) = self
            .services
            .adapter
            .discard_candidate(&self.device.id, &candidate)
            .await
        {
            tracing::warn!(device = %self.device.id, error = %err, "discarding candidate failed");
        }
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit, ReconcileError> {
        Arc::clone(&self.services.pool)
            .acquire_owned()
            .await
            .map_err(|_| ReconcileError::Cancelled {
                stage: "worker pool closed".to_string(),
            })
    }

    fn check_cancel(&self, state: AttemptState) -> Result<(), ReconcileError> {
        if self.cancel.is_cancelled() {
            tracing::warn!(device = %self.device.id, state = %state, "cancellation requested");
            Err(ReconcileError::Cancelled {
                stage: state.to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn step(&mut self, to: AttemptState, note: Option<String>) -> Result<(), ReconcileError> {
        self.attempt.advance(to, note)?;
        self.persist()
    }

    fn persist(&self) -> Result<(), ReconcileError> {
        Ok(store::put(self.services.store.as_ref(), &self.attempt)?)
    }

    fn lock_device(&self, err: &ReconcileError) -> Result<(), ReconcileError> {
        let lock = DeviceLock {
            device: self.device.id.clone(),
            attempt_id: self.attempt.id.clone(),
            reason: err.to_string(),
            locked_at: chrono::Utc::now(),
        };
        self.services.fleet.lock(lock.clone());
        store::put(self.services.store.as_ref(), &lock)?;
        tracing::error!(device = %self.device.id, attempt = %self.attempt.id, "device deployment-locked");
        Ok(())
    }

    /// Record the outcome, audit it and emit its events. Record failures are
    /// kept for the caller; the events go out regardless.
    fn finish(&mut self, outcome: AttemptOutcome) {
        let services = self.services;
        self.attempt.outcome = Some(outcome.clone());
        let persisted = self.persist();
        self.keep(persisted);
        let audited = services.audit.append(AuditDraft {
            device: self.device.id.clone(),
            ticket: Some(self.attempt.ticket.clone()),
            actor: self.attempt.actor.clone(),
            subject: AuditSubject::Deployment {
                attempt_id: self.attempt.id.clone(),
                diff_id: self.attempt.diff_id.clone().unwrap_or_default(),
            },
            outcome: outcome.label().to_string(),
            detail: json!({
                "target_version": self.attempt.target_version,
                "state": self.attempt.state,
                "verdict": self.attempt.verdict.as_ref().map(|v| v.label()),
                "backup_id": self.attempt.backup_id,
                "commits": self.attempt.commits,
                "error": outcome.error(),
                "checks": self.attempt.check_report,
            }),
        });
        self.keep(audited.map(|_| ()).map_err(ReconcileError::from));

        let device = self.device.id.clone();
        let attempt_id = self.attempt.id.clone();
        match &outcome {
            AttemptOutcome::Completed => services.events.emit(EngineEvent::DeploymentCompleted {
                device,
                attempt_id,
                diff_id: self.attempt.diff_id.clone().unwrap_or_default(),
            }),
            AttemptOutcome::Aborted { error } if error.kind == "guardrail_blocked" => {}
            AttemptOutcome::Aborted { error } => {
                services.events.emit(EngineEvent::DeploymentFailed {
                    device,
                    attempt_id,
                    outcome: outcome.label().to_string(),
                    error_kind: error.kind.clone(),
                    message: error.message.clone(),
                });
            }
            AttemptOutcome::Failed { error }
            | AttemptOutcome::RolledBack { error }
            | AttemptOutcome::Locked { error } => {
                let page = matches!(outcome, AttemptOutcome::Locked { .. });
                services.events.emit(EngineEvent::DeploymentFailed {
                    device: device.clone(),
                    attempt_id,
                    outcome: outcome.label().to_string(),
                    error_kind: error.kind.clone(),
                    message: error.message.clone(),
                });
                services.events.emit(EngineEvent::Alert {
                    device,
                    page,
                    reason: format!("deployment {}: {}", outcome.label(), error.message),
                });
            }
        }
    }
}
