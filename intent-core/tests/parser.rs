use std::path::PathBuf;

use intent_core::{
    decode_snapshot, encode_snapshot, parse, parse_file, parse_snapshot, write_file, ParseError,
};

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

#[test]
fn fixture_documents_parse() {
    for name in ["edge_v1.xml", "edge_v2.xml", "edge_reordered.xml", "edge_broad.xml"] {
        let path = fixture(&format!("fixtures/{name}"));
        let tree = parse_file(&path).expect("fixture should parse");
        assert_eq!(tree.tag, "intent");
        assert_eq!(tree.attr("group"), Some("edge"));
    }
}

#[test]
fn unclosed_document_is_a_parse_error() {
    let err = parse_file(&fixture("fixtures/malformed.xml")).expect_err("must not parse");
    assert!(matches!(err, ParseError::Malformed(_) | ParseError::Xml(_)));
}

#[test]
fn empty_payload_is_a_parse_error() {
    assert!(matches!(parse_snapshot(b""), Err(ParseError::Empty)));
    assert!(matches!(parse(b"\n   \n"), Err(ParseError::Empty)));
}

#[test]
fn duplicate_rule_names_are_rejected() {
    let xml = br#"<intent>
        <rule name="dup"><action>allow</action></rule>
        <rule name="dup"><action>deny</action></rule>
    </intent>"#;
    let err = parse_snapshot(xml).expect_err("duplicate");
    assert!(matches!(err, ParseError::Duplicate { ref kind, ref name } if kind == "security_rule" && name == "dup"));
}

#[test]
fn missing_action_is_reported_by_field() {
    let err = parse_snapshot(br#"<intent><rule name="r"><log/></rule></intent>"#)
        .expect_err("missing action");
    assert_eq!(err.to_string(), "rule 'r' is missing required field 'action'");
}

#[test]
fn encoded_snapshot_written_to_disk_reloads() {
    let tree = parse_file(&fixture("fixtures/edge_reordered.xml")).expect("parse");
    let snapshot = decode_snapshot(&tree).expect("decode");

    let out_dir = tempfile::tempdir().expect("tempdir should be created");
    let out_path = out_dir.path().join("canonical.xml");
    write_file(&encode_snapshot(&snapshot), &out_path).expect("write_file should succeed");

    let reloaded = decode_snapshot(&parse_file(&out_path).expect("reparse")).expect("decode");
    assert_eq!(reloaded, snapshot);
}
