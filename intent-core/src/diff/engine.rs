use std::collections::{BTreeMap, BTreeSet};

use crate::diff::lcs::longest_common_subsequence;
use crate::diff::result::{DiffRecord, ObjectChange, RuleMove, SequenceChange, SnapshotRef};
use crate::model::{IntentObject, IntentSnapshot, ObjectKey, ObjectKind};

/// Configures snapshot diff behavior.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Objects to leave out of the comparison, as `kind` or `kind:name`.
    ///
    /// `kind` accepts either the kind label (`security_rule`) or the document
    /// tag (`rule`).
    pub ignore: Vec<String>,
}

impl DiffOptions {
    pub fn ignoring<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignore: patterns.into_iter().map(Into::into).collect(),
        }
    }

    fn should_ignore(&self, key: &ObjectKey) -> bool {
        self.ignore.iter().any(|pattern| {
            let (kind, name) = match pattern.split_once(':') {
                Some((kind, name)) => (kind, Some(name.trim())),
                None => (pattern.as_str(), None),
            };
            ObjectKind::parse(kind) == Some(key.kind)
                && name.map_or(true, |name| name == key.name)
        })
    }
}

/// Diff two snapshots with default options.
pub fn diff_snapshots(from: &IntentSnapshot, to: &IntentSnapshot) -> DiffRecord {
    diff_with_options(from, to, &DiffOptions::default())
}

/// Diff two snapshots with custom options.
///
/// Objects are matched by identifier. Ordered kinds get an extra positional
/// pass: identifiers common to both sides but outside their longest common
/// subsequence are reported as moves, and any change to the identifier
/// sequence is recorded in full.
pub fn diff_with_options(
    from: &IntentSnapshot,
    to: &IntentSnapshot,
    opts: &DiffOptions,
) -> DiffRecord {
    let left = index(from, opts);
    let right = index(to, opts);

    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut removed = Vec::new();

    let keys: BTreeSet<&ObjectKey> = left.keys().chain(right.keys()).collect();
    for key in keys {
        match (left.get(key), right.get(key)) {
            (Some(before), Some(after)) => {
                if before.content_hash() != after.content_hash() {
                    modified.push(ObjectChange::new(key.clone(), Some(before), Some(after)));
                }
            }
            (Some(before), None) => removed.push(ObjectChange::new(key.clone(), Some(before), None)),
            (None, Some(after)) => added.push(ObjectChange::new(key.clone(), None, Some(after))),
            (None, None) => {}
        }
    }

    let mut reordered = Vec::new();
    let mut sequences = Vec::new();
    for kind in ObjectKind::ALL.into_iter().filter(|kind| kind.is_ordered()) {
        let before = ordered_names(from, kind, opts);
        let after = ordered_names(to, kind, opts);
        if before == after {
            continue;
        }
        reordered.extend(positional_moves(kind, &before, &after));
        sequences.push(SequenceChange {
            kind,
            before,
            after,
        });
    }

    DiffRecord::assemble(
        SnapshotRef::of(from),
        SnapshotRef::of(to),
        added,
        modified,
        removed,
        reordered,
        sequences,
    )
}

fn index<'a>(
    snapshot: &'a IntentSnapshot,
    opts: &DiffOptions,
) -> BTreeMap<ObjectKey, &'a IntentObject> {
    snapshot
        .objects()
        .iter()
        .map(|object| (object.key(), object))
        .filter(|(key, _)| !opts.should_ignore(key))
        .collect()
}

fn ordered_names(snapshot: &IntentSnapshot, kind: ObjectKind, opts: &DiffOptions) -> Vec<String> {
    snapshot
        .sequence(kind)
        .into_iter()
        .filter(|name| !opts.should_ignore(&ObjectKey::new(kind, name.as_str())))
        .collect()
}

/// First position of each identifier.
fn positions(names: &[String]) -> BTreeMap<&str, usize> {
    let mut index = BTreeMap::new();
    for (pos, name) in names.iter().enumerate() {
        index.entry(name.as_str()).or_insert(pos);
    }
    index
}

fn positional_moves(kind: ObjectKind, before: &[String], after: &[String]) -> Vec<RuleMove> {
    let before_at = positions(before);
    let after_at = positions(after);
    let left: Vec<&str> = before
        .iter()
        .map(String::as_str)
        .filter(|name| after_at.contains_key(name))
        .collect();
    let right: Vec<&str> = after
        .iter()
        .map(String::as_str)
        .filter(|name| before_at.contains_key(name))
        .collect();

    let stable: BTreeSet<&str> = longest_common_subsequence(&left, &right)
        .into_iter()
        .collect();

    right
        .iter()
        .filter(|name| !stable.contains(*name))
        .filter_map(|name| {
            let from = *before_at.get(name)?;
            let to = *after_at.get(name)?;
            Some(RuleMove {
                kind,
                name: (*name).to_string(),
                from,
                to,
            })
        })
        .collect()
}
