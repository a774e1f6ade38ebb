//! Guardrail evaluation.
//!
//! A policy is an ordered list of rules, each bound to a registered family.
//! Families register themselves with [`inventory`] so adding one is a matter
//! of a new module with an `inventory::submit!` block.
//!
//! Evaluation runs every rule in policy order and never short-circuits, so
//! the report is complete even when an early rule blocks. The result is a
//! pure function of the policy, the diff, and the snapshots.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use intent_core::{
    AddressObject, DiffRecord, IntentObject, IntentSnapshot, ObjectKey, ObjectKind, SecurityRule,
};
use serde::{Deserialize, Serialize};

use crate::policy::{GuardrailPolicy, GuardrailRule, PolicyError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
    Block,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warn => "warn",
            Severity::Block => "block",
        })
    }
}

/// One raised finding, attributed to the policy rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub family: String,
    pub severity: Severity,
    pub object: Option<String>,
    pub message: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    ApprovedWithWarnings { warnings: Vec<Violation> },
    /// Every violation in evaluation order, warnings included.
    Blocked { violations: Vec<Violation> },
}

impl Verdict {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        if violations.iter().any(|v| v.severity == Severity::Block) {
            Verdict::Blocked { violations }
        } else if violations.is_empty() {
            Verdict::Approved
        } else {
            Verdict::ApprovedWithWarnings {
                warnings: violations,
            }
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Blocked { .. })
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            Verdict::Approved => &[],
            Verdict::ApprovedWithWarnings { warnings } => warnings,
            Verdict::Blocked { violations } => violations,
        }
    }

    pub fn blocking(&self) -> impl Iterator<Item = &Violation> {
        self.violations()
            .iter()
            .filter(|v| v.severity == Severity::Block)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::ApprovedWithWarnings { .. } => "approved_with_warnings",
            Verdict::Blocked { .. } => "blocked",
        }
    }

    /// `rule_id: message` of each blocking violation, joined.
    pub fn summary(&self) -> String {
        self.blocking()
            .map(|v| format!("{}: {}", v.rule_id, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Everything a family may look at.
pub struct GuardrailContext<'a> {
    pub diff: &'a DiffRecord,
    /// Post-change configuration the diff leads to.
    pub target: &'a IntentSnapshot,
    /// Other device-groups' snapshots, consulted by shared-zone shadow scope.
    pub peers: &'a [IntentSnapshot],
    pub policy: &'a GuardrailPolicy,
}

impl<'a> GuardrailContext<'a> {
    /// Rules whose own content changed.
    pub fn changed_rules(&self) -> Vec<&'a SecurityRule> {
        let changed: BTreeSet<&str> = self
            .diff
            .added
            .iter()
            .chain(&self.diff.modified)
            .filter(|change| change.key.kind == ObjectKind::SecurityRule)
            .map(|change| change.key.name.as_str())
            .collect();
        self.target
            .rules()
            .filter(|rule| changed.contains(rule.name.as_str()))
            .collect()
    }

    /// Rules touched by the diff: changed, moved, or referencing a changed
    /// address or service object, directly or through address groups.
    pub fn touched_rules(&self) -> Vec<&'a SecurityRule> {
        let touched = self.diff.touched(ObjectKind::SecurityRule);
        let addresses = self.touched_addresses();
        let services = self.diff.touched(ObjectKind::Service);
        self.target
            .rules()
            .filter(|rule| {
                touched.contains(rule.name.as_str())
                    || rule
                        .source
                        .iter()
                        .chain(&rule.destination)
                        .any(|m| addresses.contains(m.as_str()))
                    || rule.service.iter().any(|m| services.contains(m.as_str()))
            })
            .collect()
    }

    /// Changed or removed address objects plus every group in the target
    /// that contains one of them, at any depth.
    fn touched_addresses(&self) -> BTreeSet<&'a str> {
        let mut names: BTreeSet<&'a str> = self.diff.touched(ObjectKind::Address);
        names.extend(
            self.diff
                .removed
                .iter()
                .filter(|change| change.key.kind == ObjectKind::Address)
                .map(|change| change.key.name.as_str()),
        );
        let groups: Vec<&'a AddressObject> = self
            .target
            .objects()
            .iter()
            .filter_map(|object| match object {
                IntentObject::Address(address) => Some(address),
                _ => None,
            })
            .collect();
        loop {
            let before = names.len();
            for group in &groups {
                if group.members.iter().any(|m| names.contains(m.as_str())) {
                    names.insert(group.name.as_str());
                }
            }
            if names.len() == before {
                return names;
            }
        }
    }
}

/// A family's raw result before severity is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub object: Option<ObjectKey>,
    pub message: String,
    /// Raise to Block regardless of configured severity.
    pub escalate: bool,
}

impl Finding {
    pub fn on(object: ObjectKey, message: impl Into<String>) -> Self {
        Self {
            object: Some(object),
            message: message.into(),
            escalate: false,
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            object: None,
            message: message.into(),
            escalate: false,
        }
    }

    pub fn escalated(mut self, escalate: bool) -> Self {
        self.escalate = escalate;
        self
    }
}

pub type CheckFn = fn(&GuardrailContext<'_>, &GuardrailRule) -> Vec<Finding>;

/// A registered guardrail family.
pub struct GuardrailFamily {
    pub id: &'static str,
    pub default_severity: Severity,
    pub summary: &'static str,
    pub check: CheckFn,
}

inventory::collect!(GuardrailFamily);

pub fn lookup_family(id: &str) -> Option<&'static GuardrailFamily> {
    inventory::iter::<GuardrailFamily>
        .into_iter()
        .find(|family| family.id == id)
}

/// All registered families, sorted by id.
pub fn families() -> Vec<&'static GuardrailFamily> {
    let mut all: Vec<&'static GuardrailFamily> =
        inventory::iter::<GuardrailFamily>.into_iter().collect();
    all.sort_by_key(|family| family.id);
    all
}

/// Evaluates diffs against a validated policy.
pub struct GuardrailEvaluator {
    policy: GuardrailPolicy,
    bound: Vec<&'static GuardrailFamily>,
}

impl GuardrailEvaluator {
    pub fn from_policy(policy: GuardrailPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        let mut bound = Vec::with_capacity(policy.rules.len());
        for rule in &policy.rules {
            let family = lookup_family(&rule.family).ok_or_else(|| PolicyError::UnknownFamily {
                rule: rule.id.clone(),
                family: rule.family.clone(),
            })?;
            bound.push(family);
        }
        Ok(Self { policy, bound })
    }

    pub fn policy(&self) -> &GuardrailPolicy {
        &self.policy
    }

    pub fn evaluate(
        &self,
        diff: &DiffRecord,
        target: &IntentSnapshot,
        peers: &[IntentSnapshot],
    ) -> Verdict {
        let ctx = GuardrailContext {
            diff,
            target,
            peers,
            policy: &self.policy,
        };

        let mut violations = Vec::new();
        for (rule, family) in self.policy.rules.iter().zip(&self.bound) {
            let severity = rule.severity.unwrap_or(family.default_severity);
            for finding in (family.check)(&ctx, rule) {
                violations.push(Violation {
                    rule_id: rule.id.clone(),
                    family: family.id.to_string(),
                    severity: if finding.escalate {
                        Severity::Block
                    } else {
                        severity
                    },
                    object: finding.object.map(|key| key.to_string()),
                    message: finding.message,
                    explanation: rule.explanation.clone(),
                });
            }
        }
        Verdict::from_violations(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::{families, lookup_family, Severity, Verdict, Violation};

    fn violation(severity: Severity) -> Violation {
        Violation {
            rule_id: "r".to_string(),
            family: "f".to_string(),
            severity,
            object: None,
            message: "m".to_string(),
            explanation: String::new(),
        }
    }

    #[test]
    fn builtin_families_are_registered() {
        let ids: Vec<&str> = families().iter().map(|f| f.id).collect();
        for expected in [
            "change_budget",
            "deny_logging",
            "overly_broad",
            "protected_objects",
            "rule_metadata",
            "shadowed_rule",
        ] {
            assert!(ids.contains(&expected), "missing family {expected}");
        }
        assert_eq!(
            lookup_family("overly_broad").map(|f| f.default_severity),
            Some(Severity::Block)
        );
    }

    #[test]
    fn verdict_follows_highest_severity() {
        assert_eq!(Verdict::from_violations(Vec::new()), Verdict::Approved);
        assert!(matches!(
            Verdict::from_violations(vec![violation(Severity::Warn)]),
            Verdict::ApprovedWithWarnings { .. }
        ));
        let blocked =
            Verdict::from_violations(vec![violation(Severity::Warn), violation(Severity::Block)]);
        assert!(blocked.is_blocked());
        assert_eq!(blocked.violations().len(), 2);
        assert_eq!(blocked.blocking().count(), 1);
    }
}
