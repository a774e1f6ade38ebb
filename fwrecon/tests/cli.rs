use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{tempdir, TempDir};

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

fn fwrecon() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("fwrecon"));
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Fleet of one file-backed device `fw1` running `edge_v1.xml`.
fn workspace() -> TempDir {
    let dir = tempdir().expect("tempdir");
    fs::write(
        dir.path().join("fleet.toml"),
        r#"
[[device]]
id = "fw1"
group = "edge"
environment = "prod"
"#,
    )
    .expect("write fleet");
    fs::create_dir_all(dir.path().join("devices")).expect("devices dir");
    fs::create_dir_all(dir.path().join("state")).expect("state dir");
    fs::copy(
        fixture("fixtures/edge_v1.xml"),
        dir.path().join("devices").join("fw1.xml"),
    )
    .expect("copy live config");
    dir
}

fn engine_args(cmd: &mut Command, root: &Path) {
    cmd.arg("--fleet")
        .arg(root.join("fleet.toml"))
        .arg("--devices")
        .arg(root.join("devices"))
        .arg("--state")
        .arg(root.join("state"));
}

#[test]
fn diff_lists_added_objects() {
    fwrecon()
        .arg("diff")
        .arg(fixture("fixtures/edge_v1.xml"))
        .arg(fixture("fixtures/edge_v2.xml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("+ security_rule:allow-dns"))
        .stdout(predicate::str::contains("+ address:dns-servers"));
}

#[test]
fn diff_of_reordered_document_is_empty() {
    fwrecon()
        .arg("diff")
        .arg(fixture("fixtures/edge_v1.xml"))
        .arg(fixture("fixtures/edge_reordered.xml"))
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"added\": []"));
}

#[test]
fn diff_rejects_malformed_input() {
    fwrecon()
        .arg("diff")
        .arg(fixture("fixtures/edge_v1.xml"))
        .arg(fixture("fixtures/malformed.xml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse"));
}

#[test]
fn check_approves_a_clean_change() {
    fwrecon()
        .arg("check")
        .arg(fixture("fixtures/edge_v1.xml"))
        .arg(fixture("fixtures/edge_v2.xml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("verdict: approved"));
}

#[test]
fn check_blocks_an_any_any_rule_into_a_high_risk_zone() {
    fwrecon()
        .arg("check")
        .arg(fixture("fixtures/edge_v1.xml"))
        .arg(fixture("fixtures/edge_broad.xml"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("no-any-any-in-high-risk-zones"))
        .stderr(predicate::str::contains("check failed"));
}

#[test]
fn deploy_then_audit_drift_and_unlock() {
    let dir = workspace();
    let root = dir.path();

    let mut deploy = fwrecon();
    deploy.arg("deploy");
    engine_args(&mut deploy, root);
    deploy
        .arg("--target")
        .arg(fixture("fixtures/edge_v2.xml"))
        .args(["--ticket", "CHG-7", "--actor", "ci"])
        .assert()
        .success()
        .stdout(predicate::str::contains("completed fw1 -> v2"));
    let live = fs::read_to_string(root.join("devices").join("fw1.xml")).expect("live config");
    assert!(live.contains("allow-dns"));
    assert!(!root.join("devices").join("fw1.candidate.xml").exists());

    fwrecon()
        .arg("audit")
        .arg("--state")
        .arg(root.join("state"))
        .args(["--device", "fw1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deployment"))
        .stdout(predicate::str::contains("ticket=CHG-7"))
        .stdout(predicate::str::contains("2 entries"));

    let mut drift = fwrecon();
    drift.arg("drift");
    engine_args(&mut drift, root);
    drift
        .args(["--device", "fw1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("drift fw1 severity=none"));

    fwrecon()
        .arg("audit")
        .arg("--state")
        .arg(root.join("state"))
        .args(["--device", "fw1", "--evidence"])
        .assert()
        .success()
        .stdout(predicate::str::contains("- deployment_locked: no"))
        .stdout(predicate::str::contains("- last_drift_report: never").not());

    let mut unlock = fwrecon();
    unlock.arg("unlock");
    engine_args(&mut unlock, root);
    unlock
        .args(["--device", "fw1", "--actor", "oncall"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unlock failed: fw1 is not deployment-locked"));
}

#[test]
fn blocked_deploy_leaves_the_device_untouched() {
    let dir = workspace();
    let root = dir.path();
    let before = fs::read_to_string(root.join("devices").join("fw1.xml")).expect("live config");

    let mut deploy = fwrecon();
    deploy.arg("deploy");
    engine_args(&mut deploy, root);
    deploy
        .arg("--target")
        .arg(fixture("fixtures/edge_broad.xml"))
        .args(["--ticket", "CHG-8", "--actor", "ci"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("error[guardrail_blocked]"))
        .stderr(predicate::str::contains("deploy failed: 1 of 1"));

    let after = fs::read_to_string(root.join("devices").join("fw1.xml")).expect("live config");
    assert_eq!(before, after);
}

#[test]
fn backup_then_prune_keeps_the_latest() {
    let dir = workspace();
    let root = dir.path();

    let mut backup = fwrecon();
    backup.arg("backup");
    engine_args(&mut backup, root);
    backup
        .args(["--class", "weekly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fw1"));

    let mut prune = fwrecon();
    prune.arg("backup");
    engine_args(&mut prune, root);
    prune
        .arg("--prune")
        .assert()
        .success()
        .stdout(predicate::str::contains("pruned 0 backup(s)"));
}

#[test]
fn evidence_requires_a_device() {
    fwrecon()
        .args(["audit", "--state", ".", "--evidence"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--device"));
}
