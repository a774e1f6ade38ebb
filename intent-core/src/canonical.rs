//! Canonical form of intent objects.
//!
//! Canonicalization strips representation-only variance so that semantically
//! identical objects serialize, and therefore hash, identically:
//!
//! - whitespace is trimmed and internal runs collapse to one space
//! - match lists are sets: sorted, de-duplicated, `any` absorbs the rest, and
//!   an empty list means `any`
//! - address literals are normalized (`10.1.2.3/16` becomes `10.1.0.0/16`)
//! - port lists are merged (`443, 80,80-90` becomes `80-90,443`)
//!
//! The transformation is idempotent.

use sha2::{Digest, Sha256};

use crate::model::{
    AddressObject, DeviceSetting, IntentObject, NatRule, SecurityRule, ServiceObject, ZoneBinding,
};
use crate::net::{canonical_address, canonical_ports};

pub const ANY: &str = "any";

const SERVICE_PROTOCOLS: [&str; 3] = ["tcp", "udp", "sctp"];

#[derive(Clone, Copy)]
enum Member {
    Name,
    Address,
    Application,
    Service,
}

/// Return the canonical form of `object`.
pub fn canonicalize(object: &IntentObject) -> IntentObject {
    match object {
        IntentObject::Zone(zone) => IntentObject::Zone(ZoneBinding {
            name: collapse(&zone.name),
            interfaces: plain_set(&zone.interfaces),
        }),
        IntentObject::Address(address) => IntentObject::Address(AddressObject {
            name: collapse(&address.name),
            members: match_set(&address.members, Member::Address),
            description: optional(&address.description),
        }),
        IntentObject::Service(service) => {
            let protocol = collapse(&service.protocol).to_ascii_lowercase();
            let ports = if SERVICE_PROTOCOLS.contains(&protocol.as_str()) {
                canonical_ports(&service.ports).unwrap_or_else(|_| collapse(&service.ports))
            } else {
                ANY.to_string()
            };
            IntentObject::Service(ServiceObject {
                name: collapse(&service.name),
                protocol,
                ports,
                description: optional(&service.description),
            })
        }
        IntentObject::Setting(setting) => IntentObject::Setting(DeviceSetting {
            name: collapse(&setting.name),
            value: collapse(&setting.value),
        }),
        IntentObject::SecurityRule(rule) => IntentObject::SecurityRule(SecurityRule {
            name: collapse(&rule.name),
            from_zones: match_set(&rule.from_zones, Member::Name),
            to_zones: match_set(&rule.to_zones, Member::Name),
            source: match_set(&rule.source, Member::Address),
            destination: match_set(&rule.destination, Member::Address),
            application: match_set(&rule.application, Member::Application),
            service: match_set(&rule.service, Member::Service),
            action: rule.action,
            log: rule.log,
            disabled: rule.disabled,
            safety_critical: rule.safety_critical,
            owner: optional(&rule.owner),
            created: optional(&rule.created),
            expires: optional(&rule.expires),
            description: optional(&rule.description),
        }),
        IntentObject::NatRule(nat) => IntentObject::NatRule(NatRule {
            name: collapse(&nat.name),
            from_zone: keyword_or_name(&nat.from_zone),
            to_zone: keyword_or_name(&nat.to_zone),
            source: match_set(&nat.source, Member::Address),
            destination: match_set(&nat.destination, Member::Address),
            service: match_set(&nat.service, Member::Service),
            translated_source: optional(&nat.translated_source)
                .map(|value| member(&value, Member::Address)),
            translated_destination: optional(&nat.translated_destination)
                .map(|value| member(&value, Member::Address)),
            translated_port: optional(&nat.translated_port)
                .map(|value| canonical_ports(&value).unwrap_or(value)),
            disabled: nat.disabled,
            description: optional(&nat.description),
        }),
    }
}

/// Hex SHA-256 of the canonical serialization of `object`.
pub fn content_hash(object: &IntentObject) -> String {
    let canonical = canonicalize(object);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// True when a canonical match list is unrestricted.
pub fn is_any(values: &[String]) -> bool {
    values.len() == 1 && values[0] == ANY
}

fn collapse(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(collapse)
        .filter(|value| !value.is_empty())
}

fn keyword_or_name(value: &str) -> String {
    let value = collapse(value);
    if value.is_empty() || value.eq_ignore_ascii_case(ANY) {
        ANY.to_string()
    } else {
        value
    }
}

fn member(raw: &str, kind: Member) -> String {
    let value = collapse(raw);
    if value.eq_ignore_ascii_case(ANY) {
        return ANY.to_string();
    }
    match kind {
        Member::Name => value,
        Member::Address => canonical_address(&value).unwrap_or(value),
        Member::Application => value.to_ascii_lowercase(),
        Member::Service => match value.split_once('/') {
            Some((protocol, ports)) => {
                let protocol = protocol.trim().to_ascii_lowercase();
                match canonical_ports(ports) {
                    Ok(ports) => format!("{protocol}/{ports}"),
                    Err(_) => format!("{protocol}/{}", ports.trim()),
                }
            }
            None if value.eq_ignore_ascii_case("application-default") => {
                "application-default".to_string()
            }
            None => value,
        },
    }
}

fn match_set(values: &[String], kind: Member) -> Vec<String> {
    let mut set: Vec<String> = values
        .iter()
        .map(|value| member(value, kind))
        .filter(|value| !value.is_empty())
        .collect();
    set.sort();
    set.dedup();
    if set.is_empty() || set.iter().any(|value| value == ANY) {
        return vec![ANY.to_string()];
    }
    set
}

fn plain_set(values: &[String]) -> Vec<String> {
    let mut set: Vec<String> = values
        .iter()
        .map(|value| collapse(value))
        .filter(|value| !value.is_empty())
        .collect();
    set.sort();
    set.dedup();
    set
}
