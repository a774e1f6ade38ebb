use std::collections::BTreeMap;

use thiserror::Error;

use crate::diff::result::DiffRecord;
use crate::model::{IntentObject, IntentSnapshot, ObjectKey, ObjectKind};
use crate::parser::ParseError;

#[derive(Debug, Error)]
pub enum ApplyError {
    /// The base snapshot does not satisfy the diff's preconditions.
    #[error("cannot apply diff at {key}: {reason}")]
    Conflict { key: String, reason: String },
    /// The patched object set is not a valid snapshot.
    #[error(transparent)]
    Snapshot(#[from] ParseError),
}

fn conflict(key: impl ToString, reason: impl Into<String>) -> ApplyError {
    ApplyError::Conflict {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Apply `diff` to `base`, producing the diff's target snapshot.
///
/// Every removed and modified object must be present in `base` with its
/// recorded before-hash, added objects must be absent, and ordered kinds
/// must still have the recorded before-sequence. The result carries the
/// diff's target scope and version.
pub fn apply_diff(base: &IntentSnapshot, diff: &DiffRecord) -> Result<IntentSnapshot, ApplyError> {
    let mut objects: BTreeMap<ObjectKey, IntentObject> = base
        .objects()
        .iter()
        .map(|object| (object.key(), object.clone()))
        .collect();
    let mut order: BTreeMap<ObjectKind, Vec<String>> = ObjectKind::ALL
        .into_iter()
        .filter(|kind| kind.is_ordered())
        .map(|kind| (kind, base.sequence(kind)))
        .collect();

    for change in diff.removed.iter().chain(&diff.modified) {
        let current = objects
            .get(&change.key)
            .ok_or_else(|| conflict(&change.key, "object is missing from base"))?;
        if Some(current.content_hash()) != change.before_hash {
            return Err(conflict(&change.key, "object content differs from base"));
        }
    }
    for change in &diff.added {
        if objects.contains_key(&change.key) {
            return Err(conflict(&change.key, "object already exists in base"));
        }
    }
    for sequence in &diff.sequences {
        // ignored objects never appear in recorded sequences
        let compared: Vec<&String> = order
            .get(&sequence.kind)
            .into_iter()
            .flatten()
            .filter(|name| sequence.before.contains(*name))
            .collect();
        if !compared.iter().copied().eq(sequence.before.iter()) {
            return Err(conflict(sequence.kind, "ordering differs from base"));
        }
    }

    for change in &diff.removed {
        objects.remove(&change.key);
    }
    for change in diff.added.iter().chain(&diff.modified) {
        let after = change
            .after
            .clone()
            .ok_or_else(|| conflict(&change.key, "change carries no target content"))?;
        objects.insert(change.key.clone(), after);
    }

    for sequence in &diff.sequences {
        let entry = order.entry(sequence.kind).or_default();
        let merged = merge_sequence(entry, &sequence.before, &sequence.after);
        *entry = merged;
    }

    let mut result = Vec::with_capacity(objects.len());
    for kind in ObjectKind::ALL {
        if kind.is_ordered() {
            for name in order.get(&kind).into_iter().flatten() {
                if let Some(object) = objects.remove(&ObjectKey::new(kind, name.as_str())) {
                    result.push(object);
                }
            }
        }
    }
    // unordered kinds are re-sorted by the snapshot constructor
    result.extend(objects.into_values());

    Ok(IntentSnapshot::new(
        diff.to.scope.clone(),
        diff.to.version.clone(),
        result,
    )?)
}

/// Replace the compared identifiers with the target order, keeping any
/// identifiers the diff did not compare at their relative positions.
fn merge_sequence(current: &[String], before: &[String], after: &[String]) -> Vec<String> {
    if current == before {
        return after.to_vec();
    }
    let mut targets = after.iter();
    let mut merged = Vec::with_capacity(after.len() + current.len());
    for name in current {
        if before.contains(name) {
            if let Some(next) = targets.next() {
                merged.push(next.clone());
            }
        } else {
            merged.push(name.clone());
        }
    }
    merged.extend(targets.cloned());
    merged
}
