//! Rule metadata completeness.
//!
//! Changed rules must name an owner and carry `created` and `expires` dates in
//! the policy's date format, with `created` not after `expires`.

use chrono::NaiveDate;
use intent_core::{ObjectKey, ObjectKind, SecurityRule};

use crate::guardrail::{Finding, GuardrailContext, GuardrailFamily, Severity};
use crate::policy::GuardrailRule;

inventory::submit! {
    GuardrailFamily {
        id: "rule_metadata",
        default_severity: Severity::Warn,
        summary: "rule owner, created and expires fields present and well-formed",
        check: metadata_findings,
    }
}

fn metadata_findings(ctx: &GuardrailContext<'_>, _rule: &GuardrailRule) -> Vec<Finding> {
    let mut out = Vec::new();
    for rule in ctx.changed_rules() {
        let key = ObjectKey::new(ObjectKind::SecurityRule, &rule.name);
        for problem in metadata_problems(rule, &ctx.policy.date_format) {
            out.push(Finding::on(key.clone(), format!("rule '{}' {problem}", rule.name)));
        }
    }
    out
}

/// Human-readable metadata problems of one rule, in field order.
pub fn metadata_problems(rule: &SecurityRule, date_format: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if rule.owner.as_deref().map_or(true, |owner| owner.trim().is_empty()) {
        problems.push("has no owner".to_string());
    }
    let created = check_date("created", rule.created.as_deref(), date_format, &mut problems);
    let expires = check_date("expires", rule.expires.as_deref(), date_format, &mut problems);
    if let (Some(created), Some(expires)) = (created, expires) {
        if created > expires {
            problems.push(format!("expires ({expires}) before it was created ({created})"));
        }
    }
    problems
}

fn check_date(
    field: &str,
    value: Option<&str>,
    format: &str,
    problems: &mut Vec<String>,
) -> Option<NaiveDate> {
    match value {
        None => {
            problems.push(format!("has no {field} date"));
            None
        }
        Some(raw) => match NaiveDate::parse_from_str(raw, format) {
            Ok(date) => Some(date),
            Err(_) => {
                problems.push(format!("has malformed {field} date '{raw}' (expected {format})"));
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use intent_core::{RuleAction, SecurityRule};

    use super::metadata_problems;

    #[test]
    fn complete_metadata_passes() {
        let mut rule = SecurityRule::new("r", RuleAction::Allow);
        rule.owner = Some("netops".to_string());
        rule.created = Some("2026-01-01".to_string());
        rule.expires = Some("2027-01-01".to_string());
        assert!(metadata_problems(&rule, "%Y-%m-%d").is_empty());
    }

    #[test]
    fn missing_and_malformed_fields_are_listed() {
        let mut rule = SecurityRule::new("r", RuleAction::Allow);
        rule.created = Some("01/02/2026".to_string());
        let problems = metadata_problems(&rule, "%Y-%m-%d");
        assert_eq!(problems.len(), 3);
        assert_eq!(problems[0], "has no owner");
        assert!(problems[1].starts_with("has malformed created date"));
        assert_eq!(problems[2], "has no expires date");
    }

    #[test]
    fn expiry_before_creation_is_reported() {
        let mut rule = SecurityRule::new("r", RuleAction::Allow);
        rule.owner = Some("netops".to_string());
        rule.created = Some("2026-05-01".to_string());
        rule.expires = Some("2026-01-01".to_string());
        let problems = metadata_problems(&rule, "%Y-%m-%d");
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("before it was created"));
    }
}
