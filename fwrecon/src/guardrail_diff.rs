//! Diff-level guardrails: change budget and protected objects.

use intent_core::{ObjectChange, ObjectKind};

use crate::guardrail::{Finding, GuardrailContext, GuardrailFamily, Severity};
use crate::policy::GuardrailRule;

pub const DEFAULT_CHANGE_LIMIT: usize = 50;

inventory::submit! {
    GuardrailFamily {
        id: "change_budget",
        default_severity: Severity::Warn,
        summary: "number of changes in one diff exceeds the configured limit",
        check: change_budget_findings,
    }
}

inventory::submit! {
    GuardrailFamily {
        id: "protected_objects",
        default_severity: Severity::Block,
        summary: "removal or modification of a listed object",
        check: protected_object_findings,
    }
}

fn change_budget_findings(ctx: &GuardrailContext<'_>, rule: &GuardrailRule) -> Vec<Finding> {
    let limit = rule.limit.unwrap_or(DEFAULT_CHANGE_LIMIT);
    let count = ctx.diff.change_count();
    if count > limit {
        vec![Finding::general(format!(
            "diff {} carries {count} changes, over the limit of {limit}",
            ctx.diff.id
        ))]
    } else {
        Vec::new()
    }
}

fn protected_object_findings(ctx: &GuardrailContext<'_>, rule: &GuardrailRule) -> Vec<Finding> {
    let mut out = Vec::new();
    for (verb, changes) in [("removes", &ctx.diff.removed), ("modifies", &ctx.diff.modified)] {
        for change in changes {
            if rule.objects.iter().any(|selector| selects(selector, change)) {
                out.push(Finding::on(
                    change.key.clone(),
                    format!("diff {verb} protected object {}", change.key),
                ));
            }
        }
    }
    out
}

/// `kind` or `kind:name`, where kind is a label or element tag.
fn selects(selector: &str, change: &ObjectChange) -> bool {
    let (kind, name) = match selector.split_once(':') {
        Some((kind, name)) => (kind, Some(name)),
        None => (selector, None),
    };
    ObjectKind::parse(kind) == Some(change.key.kind)
        && name.map_or(true, |name| name == change.key.name)
}

#[cfg(test)]
mod tests {
    use intent_core::{ObjectChange, ObjectKey, ObjectKind};

    use super::selects;

    #[test]
    fn selectors_match_kind_and_optional_name() {
        let change = ObjectChange::new(ObjectKey::new(ObjectKind::SecurityRule, "deny-all"), None, None);
        assert!(selects("security_rule:deny-all", &change));
        assert!(selects("rule:deny-all", &change));
        assert!(selects("security_rule", &change));
        assert!(!selects("security_rule:allow-web", &change));
        assert!(!selects("address:deny-all", &change));
    }
}
