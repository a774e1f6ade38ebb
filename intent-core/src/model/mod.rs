//! Typed intent objects and snapshots.

mod object;
mod snapshot;

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

pub use object::{
    AddressObject, DeviceSetting, IntentObject, NatRule, RuleAction, SecurityRule, ServiceObject,
    ZoneBinding,
};
pub use snapshot::IntentSnapshot;

/// The (environment, device-group) pair a snapshot belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub environment: String,
    pub device_group: String,
}

impl Scope {
    pub fn new(environment: impl Into<String>, device_group: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            device_group: device_group.into(),
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.environment, self.device_group)
    }
}

/// Object variants, declared in canonical snapshot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Zone,
    Address,
    Service,
    Setting,
    SecurityRule,
    NatRule,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 6] = [
        ObjectKind::Zone,
        ObjectKind::Address,
        ObjectKind::Service,
        ObjectKind::Setting,
        ObjectKind::SecurityRule,
        ObjectKind::NatRule,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Zone => "zone",
            ObjectKind::Address => "address",
            ObjectKind::Service => "service",
            ObjectKind::Setting => "setting",
            ObjectKind::SecurityRule => "security_rule",
            ObjectKind::NatRule => "nat_rule",
        }
    }

    /// Element name used in intent documents.
    pub fn tag(self) -> &'static str {
        match self {
            ObjectKind::Zone => "zone",
            ObjectKind::Address => "address",
            ObjectKind::Service => "service",
            ObjectKind::Setting => "setting",
            ObjectKind::SecurityRule => "rule",
            ObjectKind::NatRule => "nat",
        }
    }

    /// Rule lists are first-match, so their order is part of their meaning.
    pub fn is_ordered(self) -> bool {
        matches!(self, ObjectKind::SecurityRule | ObjectKind::NatRule)
    }

    /// Accepts either the kind label or the document tag.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value || kind.tag() == value)
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an object within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: ObjectKind,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::{ObjectKey, ObjectKind};

    #[test]
    fn kind_parses_label_and_tag() {
        assert_eq!(ObjectKind::parse("rule"), Some(ObjectKind::SecurityRule));
        assert_eq!(ObjectKind::parse("security_rule"), Some(ObjectKind::SecurityRule));
        assert_eq!(ObjectKind::parse("nat"), Some(ObjectKind::NatRule));
        assert_eq!(ObjectKind::parse("policy"), None);
    }

    #[test]
    fn keys_order_by_kind_then_name() {
        let mut keys = vec![
            ObjectKey::new(ObjectKind::SecurityRule, "a"),
            ObjectKey::new(ObjectKind::Address, "z"),
            ObjectKey::new(ObjectKind::Address, "b"),
        ];
        keys.sort();
        let rendered: Vec<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["address:b", "address:z", "security_rule:a"]);
    }
}
