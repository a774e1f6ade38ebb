use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AttemptState;
use crate::adapter::CandidateHandle;
use crate::error::{FailureInfo, ReconcileError};
use crate::guardrail::Verdict;
use crate::store::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: AttemptState,
    pub to: AttemptState,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// How an attempt ended. Only `Completed` counts as success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Completed,
    Aborted { error: FailureInfo },
    Failed { error: FailureInfo },
    RolledBack { error: FailureInfo },
    Locked { error: FailureInfo },
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Completed => "completed",
            AttemptOutcome::Aborted { .. } => "aborted",
            AttemptOutcome::Failed { .. } => "failed",
            AttemptOutcome::RolledBack { .. } => "rolled_back",
            AttemptOutcome::Locked { .. } => "deployment_locked",
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, AttemptOutcome::Completed)
    }

    pub fn error(&self) -> Option<&FailureInfo> {
        match self {
            AttemptOutcome::Completed => None,
            AttemptOutcome::Aborted { error }
            | AttemptOutcome::Failed { error }
            | AttemptOutcome::RolledBack { error }
            | AttemptOutcome::Locked { error } => Some(error),
        }
    }
}

/// One run of the staged state machine against one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentAttempt {
    pub id: String,
    pub device: String,
    pub diff_id: Option<String>,
    pub target_version: String,
    pub ticket: String,
    pub actor: String,
    pub state: AttemptState,
    pub created_at: DateTime<Utc>,
    pub transitions: Vec<TransitionRecord>,
    pub commits: u32,
    pub verdict: Option<Verdict>,
    pub backup_id: Option<String>,
    pub candidate: Option<CandidateHandle>,
    pub check_report: Option<serde_json::Value>,
    pub outcome: Option<AttemptOutcome>,
}

impl DeploymentAttempt {
    pub fn new(
        id: impl Into<String>,
        device: impl Into<String>,
        target_version: impl Into<String>,
        ticket: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            device: device.into(),
            diff_id: None,
            target_version: target_version.into(),
            ticket: ticket.into(),
            actor: actor.into(),
            state: AttemptState::Pending,
            created_at: Utc::now(),
            transitions: Vec::new(),
            commits: 0,
            verdict: None,
            backup_id: None,
            candidate: None,
            check_report: None,
            outcome: None,
        }
    }

    /// Move to `to`, refusing transitions the state machine does not allow
    /// and a second entry into `Committed`.
    pub fn advance(&mut self, to: AttemptState, note: Option<String>) -> Result<(), ReconcileError> {
        let invalid = ReconcileError::InvalidTransition {
            from: self.state,
            to,
        };
        if self.outcome.is_some() || !self.state.can_transition(to) {
            return Err(invalid);
        }
        if to == AttemptState::Committed {
            if self.commits > 0 {
                return Err(invalid);
            }
            self.commits += 1;
        }
        tracing::info!(
            device = %self.device,
            attempt = %self.id,
            from = %self.state,
            to = %to,
            note = note.as_deref().unwrap_or(""),
            "attempt transition"
        );
        self.transitions.push(TransitionRecord {
            from: self.state,
            to,
            at: Utc::now(),
            note,
        });
        self.state = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn visited(&self, state: AttemptState) -> bool {
        self.state == state || self.transitions.iter().any(|t| t.to == state)
    }

    pub fn entered_at(&self, state: AttemptState) -> Option<DateTime<Utc>> {
        self.transitions.iter().find(|t| t.to == state).map(|t| t.at)
    }
}

impl Record for DeploymentAttempt {
    const COLLECTION: &'static str = "attempts";

    fn record_id(&self) -> String {
        self.id.clone()
    }

    fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }
}
