//! Deny, drop and reject rules must log.

use intent_core::{ObjectKey, ObjectKind};

use crate::guardrail::{Finding, GuardrailContext, GuardrailFamily, Severity};
use crate::policy::GuardrailRule;

inventory::submit! {
    GuardrailFamily {
        id: "deny_logging",
        default_severity: Severity::Block,
        summary: "deny-action rule without logging",
        check: deny_logging_findings,
    }
}

fn deny_logging_findings(ctx: &GuardrailContext<'_>, _rule: &GuardrailRule) -> Vec<Finding> {
    ctx.changed_rules()
        .into_iter()
        .filter(|rule| rule.action.is_deny() && !rule.log && !rule.disabled)
        .map(|rule| {
            Finding::on(
                ObjectKey::new(ObjectKind::SecurityRule, &rule.name),
                format!("{} rule '{}' does not log", rule.action, rule.name),
            )
        })
        .collect()
}
