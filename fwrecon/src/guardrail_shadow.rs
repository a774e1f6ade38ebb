//! Shadowed rule detection.
//!
//! Rules match first-hit, so a rule whose match space is fully covered by an
//! earlier enabled rule never matches. Containment is checked per dimension
//! by [`MatchSpace::covers`]: zones, source, destination, application and
//! service. A covered rule with a different action is `conflicting`; with the
//! same action it is `redundant`.
//!
//! Only pairs involving a rule touched by the diff are reported, and each
//! shadowed rule is reported once, against the first rule that covers it.
//! A shadowed rule marked safety-critical escalates the finding to Block.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use intent_core::{IntentSnapshot, ObjectKey, ObjectKind, SecurityRule};
use serde::{Deserialize, Serialize};

use crate::guardrail::{Finding, GuardrailContext, GuardrailFamily, Severity};
use crate::matchspace::{Category, MatchSpace};
use crate::policy::{GuardrailRule, ShadowScope};

inventory::submit! {
    GuardrailFamily {
        id: "shadowed_rule",
        default_severity: Severity::Warn,
        summary: "rule unreachable because an earlier rule covers its match space",
        check: shadow_findings,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowKind {
    Conflicting,
    Redundant,
}

impl Display for ShadowKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShadowKind::Conflicting => "conflicting",
            ShadowKind::Redundant => "redundant",
        })
    }
}

/// An earlier rule that covers a later one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowPair {
    pub earlier: String,
    /// Device-group of the earlier rule when it comes from a peer snapshot.
    pub earlier_group: Option<String>,
    pub later: String,
    pub kind: ShadowKind,
    pub later_critical: bool,
}

struct Entry<'a> {
    rule: &'a SecurityRule,
    space: MatchSpace,
    peer_group: Option<&'a str>,
}

/// Every (earlier, later) covering pair in the evaluation context, where the
/// later rule belongs to `target`. Pairs are ordered by later rule position,
/// then earlier rule position.
pub fn shadow_pairs(
    target: &IntentSnapshot,
    peers: &[IntentSnapshot],
    scope: ShadowScope,
) -> Vec<ShadowPair> {
    let mut entries: Vec<Entry<'_>> = Vec::new();
    if scope == ShadowScope::SharedZones {
        let zones = target.zone_names();
        for peer in peers {
            if peer.scope() == target.scope() {
                continue;
            }
            for rule in peer.rules().filter(|rule| !rule.disabled) {
                if zones_defined_in(rule, &zones) {
                    entries.push(Entry {
                        rule,
                        space: MatchSpace::of(rule, peer),
                        peer_group: Some(peer.scope().device_group.as_str()),
                    });
                }
            }
        }
    }
    let own_start = entries.len();
    for rule in target.rules().filter(|rule| !rule.disabled) {
        entries.push(Entry {
            rule,
            space: MatchSpace::of(rule, target),
            peer_group: None,
        });
    }

    let mut pairs = Vec::new();
    for later_idx in own_start..entries.len() {
        let later = &entries[later_idx];
        for earlier in &entries[..later_idx] {
            if earlier.space.covers(&later.space) {
                pairs.push(ShadowPair {
                    earlier: earlier.rule.name.clone(),
                    earlier_group: earlier.peer_group.map(str::to_string),
                    later: later.rule.name.clone(),
                    kind: if earlier.rule.action == later.rule.action {
                        ShadowKind::Redundant
                    } else {
                        ShadowKind::Conflicting
                    },
                    later_critical: later.rule.safety_critical,
                });
            }
        }
    }
    pairs
}

/// A peer rule applies to the target when each of its zones is `any` or a
/// zone the target defines.
fn zones_defined_in(rule: &SecurityRule, zones: &BTreeSet<&str>) -> bool {
    [&rule.from_zones, &rule.to_zones].into_iter().all(|list| {
        let category = Category::of(list);
        let known = category.members().all(|zone| zones.contains(zone));
        known
    })
}

fn shadow_findings(ctx: &GuardrailContext<'_>, _rule: &GuardrailRule) -> Vec<Finding> {
    let touched: BTreeSet<&str> = ctx
        .touched_rules()
        .into_iter()
        .map(|rule| rule.name.as_str())
        .collect();
    if touched.is_empty() {
        return Vec::new();
    }

    let mut reported = BTreeSet::new();
    let mut out = Vec::new();
    for pair in shadow_pairs(ctx.target, ctx.peers, ctx.policy.shadow_scope) {
        let earlier_touched = pair.earlier_group.is_none() && touched.contains(pair.earlier.as_str());
        if !(earlier_touched || touched.contains(pair.later.as_str())) {
            continue;
        }
        if !reported.insert(pair.later.clone()) {
            continue;
        }
        let earlier = match &pair.earlier_group {
            Some(group) => format!("'{}' (group {group})", pair.earlier),
            None => format!("'{}'", pair.earlier),
        };
        let message = format!(
            "rule '{}' is shadowed by earlier rule {earlier} ({})",
            pair.later, pair.kind
        );
        out.push(
            Finding::on(ObjectKey::new(ObjectKind::SecurityRule, &pair.later), message)
                .escalated(pair.later_critical),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use intent_core::{IntentObject, IntentSnapshot, RuleAction, Scope, SecurityRule, ZoneBinding};

    use super::{shadow_pairs, ShadowKind};
    use crate::policy::ShadowScope;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn rule(name: &str, action: RuleAction, source: &str) -> SecurityRule {
        let mut rule = SecurityRule::new(name, action);
        rule.source = strings(&[source]);
        rule
    }

    fn snapshot(group: &str, objects: Vec<IntentObject>) -> IntentSnapshot {
        IntentSnapshot::new(Scope::new("prod", group), "v1", objects).expect("snapshot")
    }

    #[test]
    fn broader_allow_shadows_narrower_deny() {
        let snap = snapshot(
            "edge",
            vec![
                IntentObject::SecurityRule(rule("r1", RuleAction::Allow, "10.0.0.0/8")),
                IntentObject::SecurityRule(rule("r2", RuleAction::Deny, "10.1.0.0/16")),
            ],
        );
        let pairs = shadow_pairs(&snap, &[], ShadowScope::DeviceGroup);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].earlier, "r1");
        assert_eq!(pairs[0].later, "r2");
        assert_eq!(pairs[0].kind, ShadowKind::Conflicting);
    }

    #[test]
    fn narrower_first_is_not_shadowing() {
        let snap = snapshot(
            "edge",
            vec![
                IntentObject::SecurityRule(rule("r2", RuleAction::Deny, "10.1.0.0/16")),
                IntentObject::SecurityRule(rule("r1", RuleAction::Allow, "10.0.0.0/8")),
            ],
        );
        assert!(shadow_pairs(&snap, &[], ShadowScope::DeviceGroup).is_empty());
    }

    #[test]
    fn disabled_rules_neither_shadow_nor_are_reported() {
        let mut wide = rule("wide", RuleAction::Allow, "any");
        wide.disabled = true;
        let snap = snapshot(
            "edge",
            vec![
                IntentObject::SecurityRule(wide),
                IntentObject::SecurityRule(rule("narrow", RuleAction::Allow, "10.1.0.0/16")),
            ],
        );
        assert!(shadow_pairs(&snap, &[], ShadowScope::DeviceGroup).is_empty());
    }

    #[test]
    fn same_action_is_redundant() {
        let snap = snapshot(
            "edge",
            vec![
                IntentObject::SecurityRule(rule("a", RuleAction::Allow, "10.0.0.0/8")),
                IntentObject::SecurityRule(rule("b", RuleAction::Allow, "10.2.3.4")),
            ],
        );
        let pairs = shadow_pairs(&snap, &[], ShadowScope::DeviceGroup);
        assert_eq!(pairs[0].kind, ShadowKind::Redundant);
    }

    #[test]
    fn shared_zone_scope_includes_peer_rules_with_known_zones() {
        let mut peer_rule = rule("peer-allow", RuleAction::Allow, "10.0.0.0/8");
        peer_rule.to_zones = strings(&["untrust"]);
        let mut foreign = rule("peer-foreign", RuleAction::Allow, "any");
        foreign.to_zones = strings(&["lab"]);
        let peer = snapshot(
            "core",
            vec![
                IntentObject::SecurityRule(peer_rule),
                IntentObject::SecurityRule(foreign),
            ],
        );

        let mut own = rule("own-deny", RuleAction::Deny, "10.1.0.0/16");
        own.to_zones = strings(&["untrust"]);
        let target = snapshot(
            "edge",
            vec![
                IntentObject::Zone(ZoneBinding {
                    name: "untrust".to_string(),
                    interfaces: strings(&["eth1"]),
                }),
                IntentObject::SecurityRule(own),
            ],
        );

        assert!(shadow_pairs(&target, &[peer.clone()], ShadowScope::DeviceGroup).is_empty());
        let pairs = shadow_pairs(&target, &[peer], ShadowScope::SharedZones);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].earlier, "peer-allow");
        assert_eq!(pairs[0].earlier_group.as_deref(), Some("core"));
    }
}
