//! Firewall intent reconciliation: guardrails, staged deployment with
//! rollback, drift detection, backups and an audit ledger, on top of the
//! `intent-core` diff engine.

pub mod adapter;
pub mod audit;
pub mod backup;
pub mod config;
pub mod deploy;
pub mod drift;
pub mod engine;
pub mod error;
pub mod events;
pub mod fleet;
pub mod guardrail;
mod guardrail_broad;
mod guardrail_diff;
mod guardrail_logging;
mod guardrail_metadata;
mod guardrail_shadow;
pub mod lease;
pub mod logging;
pub mod matchspace;
pub mod policy;
pub mod report;
pub mod retry;
pub mod store;

pub use engine::{Engine, EngineBuilder, Services};
pub use error::ReconcileError;
pub use guardrail_broad::risky_zone;
pub use guardrail_metadata::metadata_problems;
pub use guardrail_shadow::{shadow_pairs, ShadowKind, ShadowPair};
