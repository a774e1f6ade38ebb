//! Staged deployment of a target snapshot to devices.

mod attempt;
mod barrier;
mod cancel;
mod orchestrator;
mod state;

pub use attempt::{AttemptOutcome, DeploymentAttempt, TransitionRecord};
pub use barrier::{ha_barrier, BarrierError, BarrierGate, BarrierRelease};
pub use cancel::{CancelHandle, CancelSignal};
pub use orchestrator::{DeploymentRequest, HaLink, Orchestrator};
pub use state::AttemptState;
