use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::{IntentObject, IntentSnapshot, ObjectKey, ObjectKind, Scope};

/// Which snapshot one side of a diff was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub scope: Scope,
    pub version: String,
    pub fingerprint: String,
}

impl SnapshotRef {
    pub fn of(snapshot: &IntentSnapshot) -> Self {
        Self {
            scope: snapshot.scope().clone(),
            version: snapshot.version().to_string(),
            fingerprint: snapshot.fingerprint(),
        }
    }
}

/// One object present on either side with before/after content hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectChange {
    pub key: ObjectKey,
    pub before_hash: Option<String>,
    pub after_hash: Option<String>,
    pub before: Option<IntentObject>,
    pub after: Option<IntentObject>,
}

impl ObjectChange {
    pub fn new(key: ObjectKey, before: Option<&IntentObject>, after: Option<&IntentObject>) -> Self {
        Self {
            key,
            before_hash: before.map(IntentObject::content_hash),
            after_hash: after.map(IntentObject::content_hash),
            before: before.cloned(),
            after: after.cloned(),
        }
    }

    fn inverse(&self) -> Self {
        Self {
            key: self.key.clone(),
            before_hash: self.after_hash.clone(),
            after_hash: self.before_hash.clone(),
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }
}

/// Positional delta of an ordered object that is not part of the common subsequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMove {
    pub kind: ObjectKind,
    pub name: String,
    pub from: usize,
    pub to: usize,
}

/// Full identifier sequence of an ordered kind on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceChange {
    pub kind: ObjectKind,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

/// Structural difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub id: String,
    pub from: SnapshotRef,
    pub to: SnapshotRef,
    pub added: Vec<ObjectChange>,
    pub modified: Vec<ObjectChange>,
    pub removed: Vec<ObjectChange>,
    pub reordered: Vec<RuleMove>,
    pub sequences: Vec<SequenceChange>,
}

impl DiffRecord {
    pub(crate) fn assemble(
        from: SnapshotRef,
        to: SnapshotRef,
        added: Vec<ObjectChange>,
        modified: Vec<ObjectChange>,
        removed: Vec<ObjectChange>,
        reordered: Vec<RuleMove>,
        sequences: Vec<SequenceChange>,
    ) -> Self {
        let id = diff_id(&from, &to);
        Self {
            id,
            from,
            to,
            added,
            modified,
            removed,
            reordered,
            sequences,
        }
    }

    /// Scope of the target side.
    pub fn scope(&self) -> &Scope {
        &self.to.scope
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.removed.is_empty()
            && self.reordered.is_empty()
            && self.sequences.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len() + self.reordered.len()
    }

    /// Diff that undoes this one.
    pub fn inverse(&self) -> Self {
        Self::assemble(
            self.to.clone(),
            self.from.clone(),
            self.removed.iter().map(ObjectChange::inverse).collect(),
            self.modified.iter().map(ObjectChange::inverse).collect(),
            self.added.iter().map(ObjectChange::inverse).collect(),
            self.reordered
                .iter()
                .map(|moved| RuleMove {
                    kind: moved.kind,
                    name: moved.name.clone(),
                    from: moved.to,
                    to: moved.from,
                })
                .collect(),
            self.sequences
                .iter()
                .map(|change| SequenceChange {
                    kind: change.kind,
                    before: change.after.clone(),
                    after: change.before.clone(),
                })
                .collect(),
        )
    }

    /// Names of objects of `kind` that were added, modified, or moved.
    pub fn touched(&self, kind: ObjectKind) -> BTreeSet<&str> {
        let changed = self
            .added
            .iter()
            .chain(&self.modified)
            .filter(|change| change.key.kind == kind)
            .map(|change| change.key.name.as_str());
        let moved = self
            .reordered
            .iter()
            .filter(|moved| moved.kind == kind)
            .map(|moved| moved.name.as_str());
        changed.chain(moved).collect()
    }

    /// Post-change objects (added and modified).
    pub fn incoming(&self) -> impl Iterator<Item = &IntentObject> {
        self.added
            .iter()
            .chain(&self.modified)
            .filter_map(|change| change.after.as_ref())
    }
}

fn diff_id(from: &SnapshotRef, to: &SnapshotRef) -> String {
    let mut hasher = Sha256::new();
    for part in [
        from.scope.environment.as_str(),
        from.scope.device_group.as_str(),
        from.version.as_str(),
        from.fingerprint.as_str(),
        to.scope.environment.as_str(),
        to.scope.device_group.as_str(),
        to.version.as_str(),
        to.fingerprint.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());
    format!("diff-{}", &digest[..16])
}
