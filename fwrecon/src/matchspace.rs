//! Set-theoretic view of a security rule's match criteria.
//!
//! Each dimension resolves names through the snapshot the rule lives in:
//! address references through address objects (recursively, stopping at
//! cycles) and service references through service objects. A name that does
//! not resolve becomes an opaque token, contained only by `any` or by the same
//! token.

use std::collections::{BTreeMap, BTreeSet};

use intent_core::canonical::{is_any, ANY};
use intent_core::net::{parse_address, parse_ports, ports_cover, Family, PortRange, RangeSet};
use intent_core::{IntentSnapshot, SecurityRule};

/// Categorical dimension (zones, applications).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    Any,
    Set(BTreeSet<String>),
}

impl Category {
    pub fn of(values: &[String]) -> Self {
        if values.is_empty() || is_any(values) || values.iter().any(|v| v == ANY) {
            Category::Any
        } else {
            Category::Set(values.iter().cloned().collect())
        }
    }

    pub fn covers(&self, other: &Category) -> bool {
        match (self, other) {
            (Category::Any, _) => true,
            (Category::Set(_), Category::Any) => false,
            (Category::Set(own), Category::Set(theirs)) => theirs.is_subset(own),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Category::Any)
    }

    /// Members, empty for `Any`.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        let set = match self {
            Category::Any => None,
            Category::Set(set) => Some(set),
        };
        set.into_iter().flatten().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSpace {
    any: bool,
    ranges: RangeSet,
    tokens: BTreeSet<String>,
}

impl AddressSpace {
    pub fn resolve(members: &[String], snapshot: &IntentSnapshot) -> Self {
        let mut space = AddressSpace::default();
        let mut visiting = BTreeSet::new();
        for member in members {
            space.add(member, snapshot, &mut visiting);
        }
        if members.is_empty() {
            space.any = true;
        }
        space
    }

    fn add(&mut self, member: &str, snapshot: &IntentSnapshot, visiting: &mut BTreeSet<String>) {
        if member == ANY {
            self.any = true;
            return;
        }
        if let Ok(range) = parse_address(member) {
            self.ranges.insert(range);
            return;
        }
        match snapshot.address(member) {
            Some(object) => {
                // a group reached again through itself adds nothing new
                if visiting.insert(member.to_string()) {
                    for inner in &object.members {
                        self.add(inner, snapshot, visiting);
                    }
                    visiting.remove(member);
                }
            }
            None => {
                self.tokens.insert(member.to_string());
            }
        }
    }

    /// Unrestricted: `any`, or every address of both families.
    pub fn is_any(&self) -> bool {
        self.any || (self.ranges.is_full(Family::V4) && self.ranges.is_full(Family::V6))
    }

    pub fn covers(&self, other: &AddressSpace) -> bool {
        if self.is_any() {
            return true;
        }
        if other.is_any() {
            return false;
        }
        self.ranges.covers(&other.ranges) && other.tokens.is_subset(&self.tokens)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSpace {
    any: bool,
    ports: BTreeMap<String, Vec<PortRange>>,
    tokens: BTreeSet<String>,
}

impl ServiceSpace {
    pub fn resolve(members: &[String], snapshot: &IntentSnapshot) -> Self {
        let mut space = ServiceSpace::default();
        for member in members {
            space.add(member, snapshot);
        }
        if members.is_empty() {
            space.any = true;
        }
        for ranges in space.ports.values_mut() {
            *ranges = intent_core::net::merge_ports(std::mem::take(ranges));
        }
        space
    }

    fn add(&mut self, member: &str, snapshot: &IntentSnapshot) {
        if member == ANY {
            self.any = true;
            return;
        }
        if let Some((protocol, ports)) = member.split_once('/') {
            self.add_ports(protocol, ports, member);
            return;
        }
        match snapshot.service(member) {
            Some(service) if service.protocol == ANY => self.any = true,
            Some(service) if matches!(service.protocol.as_str(), "tcp" | "udp" | "sctp") => {
                self.add_ports(&service.protocol, &service.ports, member);
            }
            Some(service) => {
                self.tokens.insert(service.protocol.clone());
            }
            None => {
                self.tokens.insert(member.to_string());
            }
        }
    }

    fn add_ports(&mut self, protocol: &str, ports: &str, member: &str) {
        match parse_ports(ports) {
            Ok(ranges) => self
                .ports
                .entry(protocol.to_string())
                .or_default()
                .extend(ranges),
            Err(_) => {
                self.tokens.insert(member.to_string());
            }
        }
    }

    pub fn is_any(&self) -> bool {
        self.any
    }

    pub fn covers(&self, other: &ServiceSpace) -> bool {
        if self.any {
            return true;
        }
        if other.any {
            return false;
        }
        let ports_covered = other.ports.iter().all(|(protocol, ranges)| {
            self.ports
                .get(protocol)
                .is_some_and(|own| ports_cover(own, ranges))
        });
        ports_covered && other.tokens.is_subset(&self.tokens)
    }
}

/// All match dimensions of one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpace {
    pub from_zones: Category,
    pub to_zones: Category,
    pub source: AddressSpace,
    pub destination: AddressSpace,
    pub application: Category,
    pub service: ServiceSpace,
}

impl MatchSpace {
    pub fn of(rule: &SecurityRule, snapshot: &IntentSnapshot) -> Self {
        Self {
            from_zones: Category::of(&rule.from_zones),
            to_zones: Category::of(&rule.to_zones),
            source: AddressSpace::resolve(&rule.source, snapshot),
            destination: AddressSpace::resolve(&rule.destination, snapshot),
            application: Category::of(&rule.application),
            service: ServiceSpace::resolve(&rule.service, snapshot),
        }
    }

    /// True when every packet matched by `other` is also matched by `self`.
    pub fn covers(&self, other: &MatchSpace) -> bool {
        self.from_zones.covers(&other.from_zones)
            && self.to_zones.covers(&other.to_zones)
            && self.source.covers(&other.source)
            && self.destination.covers(&other.destination)
            && self.application.covers(&other.application)
            && self.service.covers(&other.service)
    }
}

#[cfg(test)]
mod tests {
    use intent_core::{
        AddressObject, IntentObject, IntentSnapshot, RuleAction, Scope, SecurityRule,
        ServiceObject,
    };

    use super::{AddressSpace, Category, MatchSpace, ServiceSpace};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn snapshot() -> IntentSnapshot {
        IntentSnapshot::new(
            Scope::new("prod", "edge"),
            "v1",
            vec![
                IntentObject::Address(AddressObject {
                    name: "corp".to_string(),
                    members: strings(&["10.0.0.0/8", "branch"]),
                    description: None,
                }),
                IntentObject::Address(AddressObject {
                    name: "branch".to_string(),
                    members: strings(&["172.16.0.0/12", "corp"]),
                    description: None,
                }),
                IntentObject::Service(ServiceObject {
                    name: "web".to_string(),
                    protocol: "tcp".to_string(),
                    ports: "80,443".to_string(),
                    description: None,
                }),
            ],
        )
        .expect("snapshot")
    }

    #[test]
    fn nested_address_groups_resolve_without_looping() {
        let snapshot = snapshot();
        let corp = AddressSpace::resolve(&strings(&["corp"]), &snapshot);
        let inner = AddressSpace::resolve(&strings(&["172.16.5.0/24", "10.9.0.0/16"]), &snapshot);
        assert!(corp.covers(&inner));
        assert!(!inner.covers(&corp));
    }

    #[test]
    fn unresolved_names_are_opaque_tokens() {
        let snapshot = snapshot();
        let named = AddressSpace::resolve(&strings(&["partners"]), &snapshot);
        let wide = AddressSpace::resolve(&strings(&["0.0.0.0/0"]), &snapshot);
        let any = AddressSpace::resolve(&strings(&["any"]), &snapshot);
        assert!(!wide.covers(&named));
        assert!(any.covers(&named));
        assert!(named.covers(&named.clone()));
    }

    #[test]
    fn service_objects_and_literals_compare_by_ports() {
        let snapshot = snapshot();
        let web = ServiceSpace::resolve(&strings(&["web"]), &snapshot);
        let https = ServiceSpace::resolve(&strings(&["tcp/443"]), &snapshot);
        let dns = ServiceSpace::resolve(&strings(&["udp/443"]), &snapshot);
        assert!(web.covers(&https));
        assert!(!web.covers(&dns));
        assert!(!https.covers(&web));
    }

    #[test]
    fn category_any_covers_sets_but_not_the_reverse() {
        let any = Category::of(&strings(&["any"]));
        let ssl = Category::of(&strings(&["ssl"]));
        assert!(any.covers(&ssl));
        assert!(!ssl.covers(&any));
    }

    #[test]
    fn rule_space_requires_every_dimension() {
        let snapshot = snapshot();
        let mut wide = SecurityRule::new("wide", RuleAction::Allow);
        wide.source = strings(&["10.0.0.0/8"]);
        let mut narrow = SecurityRule::new("narrow", RuleAction::Deny);
        narrow.source = strings(&["10.1.0.0/16"]);
        narrow.application = strings(&["ssh"]);

        let wide_space = MatchSpace::of(&wide, &snapshot);
        let narrow_space = MatchSpace::of(&narrow, &snapshot);
        assert!(wide_space.covers(&narrow_space));
        assert!(!narrow_space.covers(&wide_space));

        wide.to_zones = strings(&["dmz"]);
        assert!(!MatchSpace::of(&wide, &snapshot).covers(&narrow_space));
    }
}
