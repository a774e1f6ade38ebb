use crate::diff::DiffRecord;

/// Format a diff record as plain text, one line per change.
pub fn format_text(diff: &DiffRecord) -> String {
    let mut lines = Vec::with_capacity(diff.change_count() + 1);
    lines.push(format!(
        "diff {} ({} {} -> {})",
        diff.id,
        diff.scope(),
        diff.from.version,
        diff.to.version
    ));
    for change in &diff.added {
        lines.push(format!("+ {}", change.key));
    }
    for change in &diff.removed {
        lines.push(format!("- {}", change.key));
    }
    for change in &diff.modified {
        lines.push(format!(
            "~ {} ({} -> {})",
            change.key,
            short_hash(change.before_hash.as_deref()),
            short_hash(change.after_hash.as_deref())
        ));
    }
    for moved in &diff.reordered {
        lines.push(format!(
            "^ {}:{} {} -> {}",
            moved.kind, moved.name, moved.from, moved.to
        ));
    }
    lines.join("\n")
}

/// Format a simple summary of diff counts.
pub fn format_summary(diff: &DiffRecord) -> String {
    format!(
        "added={} modified={} removed={} reordered={}",
        diff.added.len(),
        diff.modified.len(),
        diff.removed.len(),
        diff.reordered.len()
    )
}

fn short_hash(hash: Option<&str>) -> &str {
    hash.map_or("-", |hash| &hash[..hash.len().min(12)])
}
