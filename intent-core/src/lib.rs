//! Declarative firewall intent: config trees, canonical objects, and structural diffs.
//!
//! Everything in this crate is pure and synchronous. Device I/O, policy
//! evaluation, and deployment live in higher-level crates.

pub mod canonical;
pub mod codec;
pub mod diff;
pub mod format;
pub mod model;
pub mod net;
pub mod parser;
pub mod tree;
pub mod writer;

pub use canonical::{canonicalize, content_hash};
pub use codec::{decode_snapshot, encode_snapshot, parse_snapshot, render_snapshot};
pub use diff::{
    apply_diff, diff_snapshots, diff_with_options, ApplyError, DiffOptions, DiffRecord,
    ObjectChange, RuleMove, SequenceChange, SnapshotRef,
};
pub use format::{format_json, format_summary, format_text};
pub use model::{
    AddressObject, DeviceSetting, IntentObject, IntentSnapshot, NatRule, ObjectKey, ObjectKind,
    RuleAction, Scope, SecurityRule, ServiceObject, ZoneBinding,
};
pub use parser::{parse, parse_file, ParseError};
pub use tree::ConfigNode;
pub use writer::{write, write_file, WriteError};
