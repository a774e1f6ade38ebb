use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::model::{ObjectKey, ObjectKind};

/// Security rule action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
    Drop,
    Reject,
}

impl RuleAction {
    /// Parse an action keyword; `pass` and `block` are accepted as synonyms.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" | "pass" | "permit" => Some(RuleAction::Allow),
            "deny" | "block" => Some(RuleAction::Deny),
            "drop" => Some(RuleAction::Drop),
            "reject" => Some(RuleAction::Reject),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::Deny => "deny",
            RuleAction::Drop => "drop",
            RuleAction::Reject => "reject",
        }
    }

    pub fn is_deny(self) -> bool {
        !matches!(self, RuleAction::Allow)
    }
}

impl Display for RuleAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneBinding {
    pub name: String,
    pub interfaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressObject {
    pub name: String,
    /// Address literals or names of other address objects.
    pub members: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceObject {
    pub name: String,
    pub protocol: String,
    pub ports: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSetting {
    pub name: String,
    pub value: String,
}

/// One entry of the ordered security policy.
///
/// Match criteria are sets; `["any"]` is the unrestricted set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub name: String,
    pub from_zones: Vec<String>,
    pub to_zones: Vec<String>,
    pub source: Vec<String>,
    pub destination: Vec<String>,
    pub application: Vec<String>,
    pub service: Vec<String>,
    pub action: RuleAction,
    pub log: bool,
    pub disabled: bool,
    /// Owner-declared safety-critical intent.
    pub safety_critical: bool,
    pub owner: Option<String>,
    pub created: Option<String>,
    pub expires: Option<String>,
    pub description: Option<String>,
}

impl SecurityRule {
    /// A rule with every criterion set to `any`.
    pub fn new(name: impl Into<String>, action: RuleAction) -> Self {
        let any = || vec!["any".to_string()];
        Self {
            name: name.into(),
            from_zones: any(),
            to_zones: any(),
            source: any(),
            destination: any(),
            application: any(),
            service: any(),
            action,
            log: false,
            disabled: false,
            safety_critical: false,
            owner: None,
            created: None,
            expires: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatRule {
    pub name: String,
    pub from_zone: String,
    pub to_zone: String,
    pub source: Vec<String>,
    pub destination: Vec<String>,
    pub service: Vec<String>,
    pub translated_source: Option<String>,
    pub translated_destination: Option<String>,
    pub translated_port: Option<String>,
    pub disabled: bool,
    pub description: Option<String>,
}

/// A typed configuration unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentObject {
    Zone(ZoneBinding),
    Address(AddressObject),
    Service(ServiceObject),
    Setting(DeviceSetting),
    SecurityRule(SecurityRule),
    NatRule(NatRule),
}

impl IntentObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            IntentObject::Zone(_) => ObjectKind::Zone,
            IntentObject::Address(_) => ObjectKind::Address,
            IntentObject::Service(_) => ObjectKind::Service,
            IntentObject::Setting(_) => ObjectKind::Setting,
            IntentObject::SecurityRule(_) => ObjectKind::SecurityRule,
            IntentObject::NatRule(_) => ObjectKind::NatRule,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            IntentObject::Zone(o) => &o.name,
            IntentObject::Address(o) => &o.name,
            IntentObject::Service(o) => &o.name,
            IntentObject::Setting(o) => &o.name,
            IntentObject::SecurityRule(o) => &o.name,
            IntentObject::NatRule(o) => &o.name,
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.kind(), self.name())
    }

    /// Hash of the canonical form; equal for semantically identical objects.
    pub fn content_hash(&self) -> String {
        crate::canonical::content_hash(self)
    }

    pub fn as_rule(&self) -> Option<&SecurityRule> {
        match self {
            IntentObject::SecurityRule(rule) => Some(rule),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{IntentObject, RuleAction, SecurityRule};
    use crate::model::ObjectKind;

    #[test]
    fn pf_action_synonyms_are_accepted() {
        assert_eq!(RuleAction::parse("pass"), Some(RuleAction::Allow));
        assert_eq!(RuleAction::parse(" BLOCK "), Some(RuleAction::Deny));
        assert_eq!(RuleAction::parse("nat"), None);
        assert!(RuleAction::Reject.is_deny());
        assert!(!RuleAction::Allow.is_deny());
    }

    #[test]
    fn object_key_reflects_variant() {
        let object = IntentObject::SecurityRule(SecurityRule::new("r1", RuleAction::Deny));
        assert_eq!(object.kind(), ObjectKind::SecurityRule);
        assert_eq!(object.key().to_string(), "security_rule:r1");
        assert!(object.as_rule().is_some());
    }
}
