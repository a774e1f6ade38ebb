//! Conversion between config trees and intent snapshots.
//!
//! Decoding is strict: unknown elements, missing names, and invalid values are
//! all [`ParseError`]s, and no partial snapshot is ever returned.

use crate::model::{
    AddressObject, DeviceSetting, IntentObject, IntentSnapshot, NatRule, RuleAction, Scope,
    SecurityRule, ServiceObject, ZoneBinding,
};
use crate::net::{parse_address, parse_ports};
use crate::parser::{parse, ParseError};
use crate::tree::ConfigNode;
use crate::writer::{write, WriteError};

const ROOT_TAGS: [&str; 2] = ["intent", "config"];
const DEFAULT_SCOPE_PART: &str = "default";
const DEFAULT_VERSION: &str = "live";

/// Parse configuration bytes straight into a snapshot.
pub fn parse_snapshot(bytes: &[u8]) -> Result<IntentSnapshot, ParseError> {
    decode_snapshot(&parse(bytes)?)
}

/// Render a snapshot as an intent document.
pub fn render_snapshot(snapshot: &IntentSnapshot) -> Result<Vec<u8>, WriteError> {
    write(&encode_snapshot(snapshot))
}

/// Decode an `<intent>` or `<config>` tree.
pub fn decode_snapshot(root: &ConfigNode) -> Result<IntentSnapshot, ParseError> {
    if !ROOT_TAGS.contains(&root.tag.as_str()) {
        return Err(ParseError::UnsupportedRoot(root.tag.clone()));
    }

    let scope = Scope::new(
        root.attr("environment").unwrap_or(DEFAULT_SCOPE_PART),
        root.attr("group").unwrap_or(DEFAULT_SCOPE_PART),
    );
    let version = root.attr("version").unwrap_or(DEFAULT_VERSION);

    let mut objects = Vec::with_capacity(root.children.len());
    for child in &root.children {
        let object = match child.tag.as_str() {
            "zone" => decode_zone(child)?,
            "address" => decode_address(child)?,
            "service" => decode_service(child)?,
            "setting" => decode_setting(child)?,
            "rule" => decode_rule(child)?,
            "nat" => decode_nat(child)?,
            _ => {
                return Err(ParseError::UnexpectedElement {
                    parent: root.tag.clone(),
                    found: child.tag.clone(),
                })
            }
        };
        objects.push(object);
    }

    IntentSnapshot::new(scope, version, objects)
}

/// Encode a snapshot as an `<intent>` tree.
pub fn encode_snapshot(snapshot: &IntentSnapshot) -> ConfigNode {
    let scope = snapshot.scope();
    let mut root = ConfigNode::new("intent")
        .with_attr("environment", scope.environment.as_str())
        .with_attr("group", scope.device_group.as_str())
        .with_attr("version", snapshot.version());

    for object in snapshot.objects() {
        root.push(encode_object(object));
    }
    root
}

fn encode_object(object: &IntentObject) -> ConfigNode {
    let mut node = ConfigNode::new(object.kind().tag()).with_attr("name", object.name());
    match object {
        IntentObject::Zone(zone) => push_all(&mut node, "interface", &zone.interfaces),
        IntentObject::Address(address) => {
            push_all(&mut node, "member", &address.members);
            push_opt(&mut node, "description", &address.description);
        }
        IntentObject::Service(service) => {
            node.push(ConfigNode::leaf("protocol", service.protocol.as_str()));
            node.push(ConfigNode::leaf("port", service.ports.as_str()));
            push_opt(&mut node, "description", &service.description);
        }
        IntentObject::Setting(setting) => {
            if !setting.value.is_empty() {
                node.text = Some(setting.value.clone());
            }
        }
        IntentObject::SecurityRule(rule) => {
            push_all(&mut node, "from", &rule.from_zones);
            push_all(&mut node, "to", &rule.to_zones);
            push_all(&mut node, "source", &rule.source);
            push_all(&mut node, "destination", &rule.destination);
            push_all(&mut node, "application", &rule.application);
            push_all(&mut node, "service", &rule.service);
            node.push(ConfigNode::leaf("action", rule.action.as_str()));
            push_flag(&mut node, "log", rule.log);
            push_flag(&mut node, "disabled", rule.disabled);
            push_flag(&mut node, "critical", rule.safety_critical);
            push_opt(&mut node, "owner", &rule.owner);
            push_opt(&mut node, "created", &rule.created);
            push_opt(&mut node, "expires", &rule.expires);
            push_opt(&mut node, "description", &rule.description);
        }
        IntentObject::NatRule(nat) => {
            node.push(ConfigNode::leaf("from", nat.from_zone.as_str()));
            node.push(ConfigNode::leaf("to", nat.to_zone.as_str()));
            push_all(&mut node, "source", &nat.source);
            push_all(&mut node, "destination", &nat.destination);
            push_all(&mut node, "service", &nat.service);
            push_opt(&mut node, "translated-source", &nat.translated_source);
            push_opt(&mut node, "translated-destination", &nat.translated_destination);
            push_opt(&mut node, "translated-port", &nat.translated_port);
            push_flag(&mut node, "disabled", nat.disabled);
            push_opt(&mut node, "description", &nat.description);
        }
    }
    node
}

fn push_all(node: &mut ConfigNode, tag: &str, values: &[String]) {
    for value in values {
        node.push(ConfigNode::leaf(tag, value.as_str()));
    }
}

fn push_opt(node: &mut ConfigNode, tag: &str, value: &Option<String>) {
    if let Some(value) = value {
        node.push(ConfigNode::leaf(tag, value.as_str()));
    }
}

fn push_flag(node: &mut ConfigNode, tag: &str, value: bool) {
    if value {
        node.push(ConfigNode::new(tag));
    }
}

fn object_name(node: &ConfigNode) -> Result<String, ParseError> {
    node.attr("name")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| ParseError::MissingField {
            object: node.tag.clone(),
            field: "name".to_string(),
        })
}

fn label(node: &ConfigNode, name: &str) -> String {
    format!("{} '{}'", node.tag, name)
}

fn unexpected(parent: &ConfigNode, child: &ConfigNode) -> ParseError {
    ParseError::UnexpectedElement {
        parent: parent.tag.clone(),
        found: child.tag.clone(),
    }
}

fn invalid(object: &str, field: &str, value: &str, reason: impl Into<String>) -> ParseError {
    ParseError::InvalidValue {
        object: object.to_string(),
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Comma separated members of one element.
fn split_members(child: &ConfigNode, into: &mut Vec<String>) {
    if let Some(text) = child.trimmed_text() {
        into.extend(
            text.split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string),
        );
    }
}

fn single_text(child: &ConfigNode) -> Option<String> {
    child.trimmed_text().map(ToString::to_string)
}

fn parse_flag(child: &ConfigNode, object: &str) -> Result<bool, ParseError> {
    let Some(text) = child.trimmed_text() else {
        return Ok(true);
    };
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(invalid(object, &child.tag, text, "expected a boolean")),
    }
}

fn looks_like_address(value: &str) -> bool {
    value.contains("::")
        || (value.contains('.')
            && value
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | '/' | '-')))
}

fn check_addresses(object: &str, field: &str, values: &[String]) -> Result<(), ParseError> {
    for value in values {
        if looks_like_address(value) {
            parse_address(value).map_err(|err| invalid(object, field, value, err.to_string()))?;
        }
    }
    Ok(())
}

fn check_services(object: &str, values: &[String]) -> Result<(), ParseError> {
    for value in values {
        if let Some((protocol, ports)) = value.split_once('/') {
            let protocol = protocol.trim().to_ascii_lowercase();
            if !matches!(protocol.as_str(), "tcp" | "udp" | "sctp") {
                return Err(invalid(object, "service", value, "unknown protocol"));
            }
            parse_ports(ports).map_err(|err| invalid(object, "service", value, err.to_string()))?;
        }
    }
    Ok(())
}

fn decode_zone(node: &ConfigNode) -> Result<IntentObject, ParseError> {
    let name = object_name(node)?;
    let mut interfaces = Vec::new();
    for child in &node.children {
        match child.tag.as_str() {
            "interface" => split_members(child, &mut interfaces),
            _ => return Err(unexpected(node, child)),
        }
    }
    Ok(IntentObject::Zone(ZoneBinding { name, interfaces }))
}

fn decode_address(node: &ConfigNode) -> Result<IntentObject, ParseError> {
    let name = object_name(node)?;
    let object = label(node, &name);
    let mut members = Vec::new();
    let mut description = None;
    for child in &node.children {
        match child.tag.as_str() {
            "member" => split_members(child, &mut members),
            "description" => description = single_text(child),
            _ => return Err(unexpected(node, child)),
        }
    }
    if members.is_empty() {
        return Err(ParseError::MissingField {
            object,
            field: "member".to_string(),
        });
    }
    check_addresses(&object, "member", &members)?;
    Ok(IntentObject::Address(AddressObject {
        name,
        members,
        description,
    }))
}

fn decode_service(node: &ConfigNode) -> Result<IntentObject, ParseError> {
    let name = object_name(node)?;
    let object = label(node, &name);
    let mut protocol = None;
    let mut ports = None;
    let mut description = None;
    for child in &node.children {
        match child.tag.as_str() {
            "protocol" => protocol = single_text(child),
            "port" => ports = single_text(child),
            "description" => description = single_text(child),
            _ => return Err(unexpected(node, child)),
        }
    }
    let protocol = protocol.ok_or_else(|| ParseError::MissingField {
        object: object.clone(),
        field: "protocol".to_string(),
    })?;
    let ports = ports.unwrap_or_else(|| "any".to_string());
    if !matches!(
        protocol.to_ascii_lowercase().as_str(),
        "tcp" | "udp" | "sctp" | "icmp" | "icmp6" | "any"
    ) {
        return Err(invalid(&object, "protocol", &protocol, "unknown protocol"));
    }
    parse_ports(&ports).map_err(|err| invalid(&object, "port", &ports, err.to_string()))?;
    Ok(IntentObject::Service(ServiceObject {
        name,
        protocol,
        ports,
        description,
    }))
}

fn decode_setting(node: &ConfigNode) -> Result<IntentObject, ParseError> {
    let name = object_name(node)?;
    if let Some(child) = node.children.first() {
        return Err(unexpected(node, child));
    }
    Ok(IntentObject::Setting(DeviceSetting {
        name,
        value: node.trimmed_text().unwrap_or_default().to_string(),
    }))
}

fn decode_rule(node: &ConfigNode) -> Result<IntentObject, ParseError> {
    let name = object_name(node)?;
    let object = label(node, &name);
    let mut rule = SecurityRule::new(name, RuleAction::Deny);
    let (mut from, mut to, mut source, mut destination, mut application, mut service) =
        (Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
    let mut action = None;

    for child in &node.children {
        match child.tag.as_str() {
            "from" => split_members(child, &mut from),
            "to" => split_members(child, &mut to),
            "source" => split_members(child, &mut source),
            "destination" => split_members(child, &mut destination),
            "application" => split_members(child, &mut application),
            "service" => service.extend(single_text(child)),
            "action" => {
                let raw = child.trimmed_text().unwrap_or_default();
                action = Some(
                    RuleAction::parse(raw)
                        .ok_or_else(|| invalid(&object, "action", raw, "unknown action"))?,
                );
            }
            "log" => rule.log = parse_flag(child, &object)?,
            "disabled" => rule.disabled = parse_flag(child, &object)?,
            "critical" => rule.safety_critical = parse_flag(child, &object)?,
            "owner" => rule.owner = single_text(child),
            "created" => rule.created = single_text(child),
            "expires" => rule.expires = single_text(child),
            "description" => rule.description = single_text(child),
            _ => return Err(unexpected(node, child)),
        }
    }

    rule.action = action.ok_or_else(|| ParseError::MissingField {
        object: object.clone(),
        field: "action".to_string(),
    })?;
    check_addresses(&object, "source", &source)?;
    check_addresses(&object, "destination", &destination)?;
    check_services(&object, &service)?;
    rule.from_zones = from;
    rule.to_zones = to;
    rule.source = source;
    rule.destination = destination;
    rule.application = application;
    rule.service = service;
    Ok(IntentObject::SecurityRule(rule))
}

fn decode_nat(node: &ConfigNode) -> Result<IntentObject, ParseError> {
    let name = object_name(node)?;
    let object = label(node, &name);
    let mut nat = NatRule {
        name,
        from_zone: "any".to_string(),
        to_zone: "any".to_string(),
        source: Vec::new(),
        destination: Vec::new(),
        service: Vec::new(),
        translated_source: None,
        translated_destination: None,
        translated_port: None,
        disabled: false,
        description: None,
    };

    for child in &node.children {
        match child.tag.as_str() {
            "from" => nat.from_zone = single_text(child).unwrap_or_else(|| "any".to_string()),
            "to" => nat.to_zone = single_text(child).unwrap_or_else(|| "any".to_string()),
            "source" => split_members(child, &mut nat.source),
            "destination" => split_members(child, &mut nat.destination),
            "service" => nat.service.extend(single_text(child)),
            "translated-source" => nat.translated_source = single_text(child),
            "translated-destination" => nat.translated_destination = single_text(child),
            "translated-port" => nat.translated_port = single_text(child),
            "disabled" => nat.disabled = parse_flag(child, &object)?,
            "description" => nat.description = single_text(child),
            _ => return Err(unexpected(node, child)),
        }
    }

    check_addresses(&object, "source", &nat.source)?;
    check_addresses(&object, "destination", &nat.destination)?;
    check_services(&object, &nat.service)?;
    for (field, value) in [
        ("translated-source", &nat.translated_source),
        ("translated-destination", &nat.translated_destination),
    ] {
        if let Some(value) = value {
            check_addresses(&object, field, std::slice::from_ref(value))?;
        }
    }
    if let Some(port) = &nat.translated_port {
        parse_ports(port).map_err(|err| invalid(&object, "translated-port", port, err.to_string()))?;
    }
    Ok(IntentObject::NatRule(nat))
}

#[cfg(test)]
mod tests {
    use super::{decode_snapshot, encode_snapshot, parse_snapshot};
    use crate::model::{IntentObject, ObjectKind, RuleAction};
    use crate::parser::ParseError;

    const DOC: &str = r#"<?xml version="1.0"?>
<intent environment="prod" group="edge" version="v42">
  <zone name="untrust"><interface>ethernet1/1</interface></zone>
  <address name="web-net"><member>10.1.2.3/16</member></address>
  <service name="https"><protocol>tcp</protocol><port>443</port></service>
  <setting name="hostname">fw-edge-1</setting>
  <rule name="allow-web">
    <from>trust</from><to>untrust</to>
    <source>web-net</source><destination>any</destination>
    <application>SSL, web-browsing</application><service>https</service>
    <action>pass</action><log/>
    <owner>netops</owner><created>2026-01-01</created><expires>2027-01-01</expires>
  </rule>
  <nat name="outbound"><from>trust</from><to>untrust</to>
    <translated-source>203.0.113.10</translated-source></nat>
</intent>"#;

    #[test]
    fn decodes_every_object_kind() {
        let snapshot = parse_snapshot(DOC.as_bytes()).expect("parse");
        assert_eq!(snapshot.id(), "prod.edge.v42");
        assert_eq!(snapshot.len(), 6);

        let rule = snapshot.rules().next().expect("rule");
        assert_eq!(rule.action, RuleAction::Allow);
        assert!(rule.log);
        assert_eq!(rule.application, vec!["ssl", "web-browsing"]);

        let address = snapshot.address("web-net").expect("address");
        assert_eq!(address.members, vec!["10.1.0.0/16"]);

        let IntentObject::NatRule(nat) = &snapshot.objects()[5] else {
            panic!("expected nat rule last");
        };
        assert_eq!(nat.translated_source.as_deref(), Some("203.0.113.10/32"));
        assert_eq!(snapshot.sequence(ObjectKind::Setting), vec!["hostname"]);
    }

    #[test]
    fn encode_then_decode_is_identity() {
        let snapshot = parse_snapshot(DOC.as_bytes()).expect("parse");
        let decoded = decode_snapshot(&encode_snapshot(&snapshot)).expect("decode");
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn unknown_element_is_rejected() {
        let err = parse_snapshot(b"<intent><rule name=\"a\"><action>allow</action><colour>red</colour></rule></intent>")
            .expect_err("unknown element");
        assert!(matches!(err, ParseError::UnexpectedElement { found, .. } if found == "colour"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad_action = parse_snapshot(b"<intent><rule name=\"a\"><action>maybe</action></rule></intent>");
        assert!(matches!(bad_action, Err(ParseError::InvalidValue { .. })));

        let bad_address = parse_snapshot(
            b"<intent><address name=\"a\"><member>10.0.0.300</member></address></intent>",
        );
        assert!(matches!(bad_address, Err(ParseError::InvalidValue { .. })));

        let bad_port = parse_snapshot(
            b"<intent><service name=\"s\"><protocol>tcp</protocol><port>99999</port></service></intent>",
        );
        assert!(matches!(bad_port, Err(ParseError::InvalidValue { .. })));

        let missing_name = parse_snapshot(b"<intent><setting>x</setting></intent>");
        assert!(matches!(missing_name, Err(ParseError::MissingField { .. })));
    }

    #[test]
    fn unsupported_root_is_rejected() {
        let err = parse_snapshot(b"<pfsense/>").expect_err("root");
        assert!(matches!(err, ParseError::UnsupportedRoot(tag) if tag == "pfsense"));
    }
}
