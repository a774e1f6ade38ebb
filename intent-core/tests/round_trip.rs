use intent_core::{
    apply_diff, canonicalize, content_hash, diff_snapshots, parse_snapshot, render_snapshot,
    AddressObject, DeviceSetting, IntentObject, IntentSnapshot, RuleAction, Scope, SecurityRule,
};
use proptest::prelude::*;

const RULE_NAMES: [&str; 6] = ["r1", "r2", "r3", "r4", "r5", "r6"];
const ADDRESS_NAMES: [&str; 3] = ["web", "db", "dns"];
const LITERALS: [&str; 6] = [
    "10.0.0.0/8",
    " 10.1.2.3/16 ",
    "192.0.2.7",
    "any",
    "2001:db8::1/48",
    "web",
];
const ACTIONS: [RuleAction; 4] = [
    RuleAction::Allow,
    RuleAction::Deny,
    RuleAction::Drop,
    RuleAction::Reject,
];

fn build(
    version: &str,
    rules: Vec<&'static str>,
    rule_attrs: Vec<(usize, usize, bool)>,
    addresses: Vec<&'static str>,
    address_members: Vec<usize>,
    hostname: u8,
) -> IntentSnapshot {
    let mut objects = Vec::new();
    for (name, (action, source, log)) in rules.into_iter().zip(rule_attrs) {
        let mut rule = SecurityRule::new(name, ACTIONS[action]);
        rule.source = vec![LITERALS[source].to_string()];
        rule.log = log;
        objects.push(IntentObject::SecurityRule(rule));
    }
    for (name, member) in addresses.into_iter().zip(address_members) {
        objects.push(IntentObject::Address(AddressObject {
            name: name.to_string(),
            members: vec![LITERALS[member].to_string()],
            description: None,
        }));
    }
    objects.push(IntentObject::Setting(DeviceSetting {
        name: "hostname".to_string(),
        value: format!("fw-{hostname}"),
    }));
    IntentSnapshot::new(Scope::new("prod", "edge"), version, objects).expect("valid snapshot")
}

fn snapshot(version: &'static str) -> impl Strategy<Value = IntentSnapshot> {
    (
        prop::sample::subsequence(RULE_NAMES.to_vec(), 0..=RULE_NAMES.len()).prop_shuffle(),
        prop::collection::vec(
            (0..ACTIONS.len(), 0..LITERALS.len(), any::<bool>()),
            RULE_NAMES.len(),
        ),
        prop::sample::subsequence(ADDRESS_NAMES.to_vec(), 0..=ADDRESS_NAMES.len()),
        prop::collection::vec(0..LITERALS.len(), ADDRESS_NAMES.len()),
        0u8..3,
    )
        .prop_map(move |(rules, attrs, addresses, members, hostname)| {
            build(version, rules, attrs, addresses, members, hostname)
        })
}

proptest! {
    #[test]
    fn inverse_diff_restores_source(a in snapshot("a"), b in snapshot("b")) {
        let diff = diff_snapshots(&a, &b);
        prop_assert_eq!(apply_diff(&a, &diff).expect("forward"), b.clone());
        prop_assert_eq!(apply_diff(&b, &diff.inverse()).expect("inverse"), a);
    }

    #[test]
    fn canonicalization_is_idempotent(s in snapshot("a")) {
        for object in s.objects() {
            let again = canonicalize(object);
            prop_assert_eq!(&again, object);
            prop_assert_eq!(content_hash(&again), content_hash(object));
        }
    }

    #[test]
    fn rendered_snapshot_parses_back(s in snapshot("a")) {
        let bytes = render_snapshot(&s).expect("render");
        prop_assert_eq!(parse_snapshot(&bytes).expect("parse"), s);
    }
}
