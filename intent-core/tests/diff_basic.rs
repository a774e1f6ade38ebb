use std::path::PathBuf;

use pretty_assertions::assert_eq;

use intent_core::{
    diff_snapshots, diff_with_options, format_json, format_summary, format_text, parse_file,
    decode_snapshot, DiffOptions, IntentSnapshot, ObjectKind,
};

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

fn load(path: &str) -> IntentSnapshot {
    let tree = parse_file(&fixture(path)).expect("fixture should parse");
    decode_snapshot(&tree).expect("fixture should decode")
}

#[test]
fn diff_detects_added_address_and_rule() {
    let v1 = load("fixtures/edge_v1.xml");
    let v2 = load("fixtures/edge_v2.xml");

    let diff = diff_snapshots(&v1, &v2);

    let added: Vec<String> = diff.added.iter().map(|c| c.key.to_string()).collect();
    assert_eq!(added, vec!["address:dns-servers", "security_rule:allow-dns"]);
    assert!(diff.modified.is_empty());
    assert!(diff.removed.is_empty());
    // an insertion shifts positions but is not a move
    assert!(diff.reordered.is_empty());
    assert_eq!(diff.sequences.len(), 1);

    let text = format_text(&diff);
    let json = format_json(&diff);
    let summary = format_summary(&diff);
    assert!(text.contains("+ security_rule:allow-dns"));
    assert!(json.contains("\"added\""));
    assert_eq!(summary, "added=2 modified=0 removed=0 reordered=0");
}

#[test]
fn representation_only_variance_is_invisible_but_order_is_not() {
    let v1 = load("fixtures/edge_v1.xml");
    let reordered = load("fixtures/edge_reordered.xml");

    let diff = diff_snapshots(&v1, &reordered);

    assert!(diff.added.is_empty());
    assert!(diff.modified.is_empty());
    assert!(diff.removed.is_empty());
    assert!(!diff.reordered.is_empty());
    assert!(diff
        .reordered
        .iter()
        .all(|moved| moved.kind == ObjectKind::SecurityRule));
    assert!(format_text(&diff).contains("^ security_rule:"));
}

#[test]
fn identical_snapshots_produce_empty_diff() {
    let v1 = load("fixtures/edge_v1.xml");
    let diff = diff_snapshots(&v1, &v1);
    assert!(diff.is_empty());
    assert_eq!(diff.change_count(), 0);
    assert_eq!(diff.from.fingerprint, diff.to.fingerprint);
}

#[test]
fn ignore_patterns_hide_rule_changes() {
    let v1 = load("fixtures/edge_v1.xml");
    let v2 = load("fixtures/edge_v2.xml");

    let opts = DiffOptions::ignoring(["rule", "address:dns-servers"]);
    let diff = diff_with_options(&v1, &v2, &opts);

    assert!(diff.is_empty(), "unexpected changes: {}", format_text(&diff));
}
