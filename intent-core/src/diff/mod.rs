//! Structural diffing of intent snapshots.

pub mod apply;
pub mod engine;
pub mod lcs;
pub mod result;

pub use apply::{apply_diff, ApplyError};
pub use engine::{diff_snapshots, diff_with_options, DiffOptions};
pub use result::{DiffRecord, ObjectChange, RuleMove, SequenceChange, SnapshotRef};
