use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// States of one deployment attempt.
///
/// ```text
/// Pending -> GuardrailChecked -> Staged -> Validated -> Committed -> PostValidated -> Completed
/// Pending -> Aborted
/// GuardrailChecked | Staged | Validated | Committed | PostValidated -> Failed
/// Failed -> RolledBack | Locked
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    GuardrailChecked,
    Staged,
    Validated,
    Committed,
    PostValidated,
    Completed,
    Failed,
    RolledBack,
    Aborted,
    /// Rollback could not be confirmed; manual intervention required.
    Locked,
}

impl AttemptState {
    pub fn can_transition(self, to: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, to),
            (Pending, GuardrailChecked)
                | (Pending, Aborted)
                | (GuardrailChecked, Staged)
                | (GuardrailChecked, Failed)
                | (Staged, Validated)
                | (Staged, Failed)
                | (Validated, Committed)
                | (Validated, Failed)
                | (Committed, PostValidated)
                | (Committed, Failed)
                | (PostValidated, Completed)
                | (PostValidated, Failed)
                | (Failed, RolledBack)
                | (Failed, Locked)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttemptState::Pending => "pending",
            AttemptState::GuardrailChecked => "guardrail_checked",
            AttemptState::Staged => "staged",
            AttemptState::Validated => "validated",
            AttemptState::Committed => "committed",
            AttemptState::PostValidated => "post_validated",
            AttemptState::Completed => "completed",
            AttemptState::Failed => "failed",
            AttemptState::RolledBack => "rolled_back",
            AttemptState::Aborted => "aborted",
            AttemptState::Locked => "deployment_locked",
        }
    }
}

impl Display for AttemptState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
