mod common;

use common::{edge_device, egress, fast_config, load, load_with, Harness};
use fwrecon::audit::AuditSubject;
use fwrecon::deploy::AttemptOutcome;
use fwrecon::drift::DriftSeverity;
use fwrecon::events::EngineEvent;
use fwrecon::ReconcileError;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn no_drift_after_a_completed_deployment() {
    let h = Harness::new(vec![edge_device("fw1")], fast_config());
    let v2 = load("fixtures/edge_v2.xml");
    let attempt = h.deploy("fw1", &v2).await;
    assert_eq!(attempt.outcome, Some(AttemptOutcome::Completed));

    let report = h.engine.detect_drift("fw1", "scheduler").await.expect("drift run");

    assert_eq!(report.severity, DriftSeverity::None);
    assert!(!report.has_drift());
    assert_eq!(report.baseline_fingerprint, report.live_fingerprint);
    assert!(h.events_named("drift_detected").is_empty());
    let evidence = h.engine.evidence("fw1");
    assert_eq!(
        evidence.last_drift_report.map(|item| item.reference),
        Some(report.id)
    );
}

#[tokio::test]
async fn out_of_band_any_any_rule_is_block_severity() {
    let h = Harness::new(vec![edge_device("fw1")], fast_config());
    h.adapter.set_live("fw1", load("fixtures/edge_broad.xml"));

    let report = h.engine.detect_drift("fw1", "scheduler").await.expect("drift run");

    assert_eq!(report.severity, DriftSeverity::Block);
    assert!(report.verdict.is_blocked());
    assert!(report
        .diff
        .added
        .iter()
        .any(|change| change.key.to_string() == "security_rule:allow-everything"));
    assert_eq!(h.events_named("drift_detected").len(), 1);
    let alerts: Vec<_> = h
        .events
        .events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::Alert { page: false, .. }))
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(h.events.pages(), 0);

    let entries = h.audit.for_reference(&report.id);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, "block");
    assert!(matches!(entries[0].subject, AuditSubject::Drift { .. }));
}

#[tokio::test]
async fn out_of_band_address_widening_is_block_severity() {
    let h = Harness::unseeded(vec![edge_device("fw1")], fast_config());
    let before = egress("v1", "<member>10.1.1.0/24</member>");
    h.engine.adopt_baseline("fw1", before).expect("baseline");
    h.adapter.set_live(
        "fw1",
        egress("v1", "<member>0.0.0.0/0</member><member>::/0</member>"),
    );

    let report = h.engine.detect_drift("fw1", "scheduler").await.expect("drift run");

    assert_eq!(report.severity, DriftSeverity::Block);
    assert!(report
        .verdict
        .blocking()
        .any(|v| v.object.as_deref() == Some("security_rule:edge-out")));
}

#[tokio::test]
async fn harmless_out_of_band_change_is_informational() {
    let h = Harness::new(vec![edge_device("fw1")], fast_config());
    h.adapter.set_live("fw1", load("fixtures/edge_v2.xml"));

    let report = h.engine.detect_drift("fw1", "scheduler").await.expect("drift run");

    assert_eq!(report.severity, DriftSeverity::Info);
    assert!(report.has_drift());
    assert!(h
        .events
        .events()
        .iter()
        .all(|e| !matches!(e, EngineEvent::Alert { .. })));
}

#[tokio::test]
async fn ignored_objects_do_not_count_as_drift() {
    let mut config = fast_config();
    config.drift.ignore = vec!["setting:hostname".to_string()];
    let h = Harness::new(vec![edge_device("fw1")], config);
    h.adapter.set_live(
        "fw1",
        load_with("fixtures/edge_v1.xml", "fw-edge-1", "fw-edge-renamed"),
    );

    let report = h.engine.detect_drift("fw1", "scheduler").await.expect("drift run");

    assert_eq!(report.severity, DriftSeverity::None);
    assert_ne!(report.baseline_fingerprint, report.live_fingerprint);
}

#[tokio::test]
async fn device_without_baseline_cannot_be_checked() {
    let h = Harness::unseeded(vec![edge_device("fw1")], fast_config());

    let err = h
        .engine
        .detect_drift("fw1", "scheduler")
        .await
        .expect_err("no baseline");

    assert!(matches!(err, ReconcileError::NoBaseline(ref device) if device == "fw1"));
    assert!(h.audit.is_empty());
}

#[tokio::test]
async fn fleet_drift_run_reports_each_device() {
    let h = Harness::new(vec![edge_device("fw1"), edge_device("fw2")], fast_config());
    h.adapter.set_live("fw2", load("fixtures/edge_v2.xml"));
    let devices = vec!["fw1".to_string(), "fw2".to_string()];

    let reports = h.engine.drift_all(&devices, "scheduler").await;

    let severities: Vec<DriftSeverity> = reports
        .into_iter()
        .map(|report| report.expect("drift run").severity)
        .collect();
    assert_eq!(severities, vec![DriftSeverity::None, DriftSeverity::Info]);
}
