//! Overly-broad allow rules in high-risk zones.
//!
//! A rule is overly broad when source, destination and service all resolve to
//! `any` (after expanding address and service objects) and it allows traffic
//! into or out of a high-risk zone. A zone list of `any` includes every
//! high-risk zone. Rules are checked when the diff changes them or any
//! address or service object they resolve through.

use intent_core::{IntentSnapshot, ObjectKey, ObjectKind, SecurityRule};

use crate::guardrail::{Finding, GuardrailContext, GuardrailFamily, Severity};
use crate::matchspace::{AddressSpace, Category, ServiceSpace};
use crate::policy::{GuardrailPolicy, GuardrailRule};

inventory::submit! {
    GuardrailFamily {
        id: "overly_broad",
        default_severity: Severity::Block,
        summary: "allow rule matching any source, destination and service in a high-risk zone",
        check: overly_broad_findings,
    }
}

fn overly_broad_findings(ctx: &GuardrailContext<'_>, _rule: &GuardrailRule) -> Vec<Finding> {
    ctx.touched_rules()
        .into_iter()
        .filter_map(|rule| {
            let zone = risky_zone(rule, ctx.target, ctx.policy)?;
            Some(Finding::on(
                ObjectKey::new(ObjectKind::SecurityRule, &rule.name),
                format!(
                    "rule '{}' allows any source to any destination on any service in high-risk zone '{zone}'",
                    rule.name
                ),
            ))
        })
        .collect()
}

/// The high-risk zone an unrestricted allow rule touches, if any.
pub fn risky_zone(
    rule: &SecurityRule,
    snapshot: &IntentSnapshot,
    policy: &GuardrailPolicy,
) -> Option<String> {
    if rule.action.is_deny() || rule.disabled || policy.high_risk_zones.is_empty() {
        return None;
    }
    let unrestricted = AddressSpace::resolve(&rule.source, snapshot).is_any()
        && AddressSpace::resolve(&rule.destination, snapshot).is_any()
        && ServiceSpace::resolve(&rule.service, snapshot).is_any();
    if !unrestricted {
        return None;
    }

    for zones in [&rule.from_zones, &rule.to_zones] {
        let category = Category::of(zones);
        if category.is_any() {
            return policy.high_risk_zones.first().cloned();
        }
        let found = category
            .members()
            .find(|zone| policy.is_high_risk(zone))
            .map(str::to_string);
        if found.is_some() {
            return found;
        }
    }
    None
}
