use crate::diff::DiffRecord;

/// Format a diff record as JSON.
pub fn format_json(diff: &DiffRecord) -> String {
    serde_json::to_string_pretty(diff).unwrap_or_else(|_| "{}".to_string())
}
