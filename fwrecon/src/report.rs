use colored::Colorize;
use intent_core::{format_summary, format_text, DiffRecord};

use crate::audit::{AuditEntry, ComplianceEvidence, EvidenceItem};
use crate::backup::BackupRecord;
use crate::deploy::{AttemptOutcome, DeploymentAttempt};
use crate::drift::{DriftReport, DriftSeverity};
use crate::guardrail::{Severity, Verdict};

/// Render a diff for terminal output.
pub fn render_diff(diff: &DiffRecord) -> String {
    format_text(diff)
        .lines()
        .map(|line| {
            if line.starts_with('+') {
                line.green().to_string()
            } else if line.starts_with('-') {
                line.red().to_string()
            } else if line.starts_with('~') {
                line.yellow().to_string()
            } else if line.starts_with('^') {
                line.magenta().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_diff_summary(diff: &DiffRecord) -> String {
    format_summary(diff).cyan().to_string()
}

/// Verdict line followed by one line per violation.
pub fn render_verdict(verdict: &Verdict) -> String {
    let head = match verdict {
        Verdict::Approved => "verdict: approved".green().to_string(),
        Verdict::ApprovedWithWarnings { warnings } => {
            format!("verdict: approved with {} warning(s)", warnings.len())
                .yellow()
                .to_string()
        }
        Verdict::Blocked { .. } => "verdict: blocked".red().bold().to_string(),
    };
    let mut out = vec![head];
    for violation in verdict.violations() {
        let tag = match violation.severity {
            Severity::Block => "BLOCK".red().to_string(),
            Severity::Warn => "WARN".yellow().to_string(),
        };
        let object = violation.object.as_deref().unwrap_or("-");
        out.push(format!(
            "{tag} {} [{}] {}: {}",
            violation.rule_id, violation.family, object, violation.message
        ));
        if !violation.explanation.is_empty() {
            out.push(format!("  {}", violation.explanation.dimmed()));
        }
    }
    out.join("\n")
}

pub fn render_attempt(attempt: &DeploymentAttempt) -> String {
    let outcome = match &attempt.outcome {
        Some(AttemptOutcome::Completed) => "completed".green().to_string(),
        Some(AttemptOutcome::Locked { .. }) => "deployment_locked".red().bold().to_string(),
        Some(outcome @ AttemptOutcome::RolledBack { .. }) => outcome.label().yellow().to_string(),
        Some(outcome) => outcome.label().red().to_string(),
        None => attempt.state.to_string(),
    };
    let mut out = vec![format!(
        "{} {} -> {} attempt={} diff={}",
        outcome,
        attempt.device,
        attempt.target_version,
        attempt.id,
        attempt.diff_id.as_deref().unwrap_or("-")
    )];
    let path: Vec<&str> = attempt.transitions.iter().map(|t| t.to.as_str()).collect();
    if !path.is_empty() {
        out.push(format!("  states: pending -> {}", path.join(" -> ")));
    }
    if let Some(error) = attempt.outcome.as_ref().and_then(AttemptOutcome::error) {
        out.push(format!("  error[{}]: {}", error.kind, error.message));
    }
    if let Some(backup) = &attempt.backup_id {
        out.push(format!("  backup: {backup}"));
    }
    out.join("\n")
}

pub fn render_drift(report: &DriftReport) -> String {
    let severity = match report.severity {
        DriftSeverity::None => "none".green().to_string(),
        DriftSeverity::Info => "info".cyan().to_string(),
        DriftSeverity::Warn => "warn".yellow().to_string(),
        DriftSeverity::Block => "block".red().bold().to_string(),
    };
    let mut out = vec![format!(
        "drift {} severity={} baseline={} report={}",
        report.device, severity, report.baseline_version, report.id
    )];
    if report.has_drift() {
        out.push(render_diff(&report.diff));
        if !report.verdict.violations().is_empty() {
            out.push(render_verdict(&report.verdict));
        }
    }
    out.join("\n")
}

pub fn render_backup(record: &BackupRecord) -> String {
    format!(
        "{} backup {} ({}) {} {}",
        "verified".green(),
        record.device,
        record.retention,
        record.id,
        record.checksum.dimmed()
    )
}

pub fn render_audit_entry(entry: &AuditEntry) -> String {
    format!(
        "#{} {} {} {} {} outcome={} actor={}{}",
        entry.seq,
        entry.recorded_at.to_rfc3339(),
        entry.device,
        entry.subject.label(),
        entry.subject.reference(),
        entry.outcome,
        entry.actor,
        entry
            .ticket
            .as_deref()
            .map(|ticket| format!(" ticket={ticket}"))
            .unwrap_or_default()
    )
}

pub fn render_evidence(evidence: &ComplianceEvidence) -> String {
    let item = |label: &str, item: &Option<EvidenceItem>| match item {
        Some(item) => format!(
            "- {label}: {} {} ({})",
            item.at.to_rfc3339(),
            item.reference,
            item.outcome
        ),
        None => format!("- {label}: {}", "never".dimmed()),
    };
    let locked = if evidence.locked {
        "yes".red().bold().to_string()
    } else {
        "no".to_string()
    };
    [
        format!("evidence {}", evidence.device),
        item("last_backup", &evidence.last_backup),
        item("last_validation", &evidence.last_validation),
        item("last_drift_report", &evidence.last_drift_report),
        item("last_deployment", &evidence.last_deployment),
        format!("- deployment_locked: {locked}"),
    ]
    .join("\n")
}
