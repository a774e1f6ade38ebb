use anyhow::{bail, Result};
use fwrecon::backup::RetentionClass;
use fwrecon::report::render_backup;
use serde_json::json;

use crate::cli::{BackupArgs, BackupClass, OutputFormat, RestoreDrillArgs};
use crate::workspace::open_engine;

pub async fn run_backup(args: BackupArgs) -> Result<()> {
    let engine = open_engine(&args.engine)?;

    if args.prune {
        let removed = engine.prune_backups(chrono::Utc::now())?;
        match args.format {
            OutputFormat::Text => {
                println!("pruned {} backup(s)", removed.len());
                for id in &removed {
                    println!("- {id}");
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json!({ "removed": removed }))?),
        }
        return Ok(());
    }

    let class = retention_class(args.class);
    let devices: Vec<String> = if args.device.is_empty() {
        engine.fleet().devices().map(|device| device.id.clone()).collect()
    } else {
        args.device.clone()
    };

    let mut errors = 0;
    let mut lines = Vec::new();
    let mut values = Vec::new();
    for device in &devices {
        match engine
            .backup(device, class, &args.actor, args.ticket.as_deref())
            .await
        {
            Ok(record) => {
                lines.push(render_backup(&record));
                values.push(json!({
                    "id": record.id,
                    "device": record.device,
                    "retention": record.retention,
                    "checksum": record.checksum,
                    "taken_at": record.taken_at,
                }));
            }
            Err(err) => {
                errors += 1;
                lines.push(format!("error {device}: {err}"));
                values.push(json!({ "device": device, "error": err.kind(), "message": err.to_string() }));
            }
        }
    }
    match args.format {
        OutputFormat::Text => println!("{}", lines.join("\n")),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&values)?),
    }

    if errors > 0 {
        bail!("backup failed: {errors} of {} device(s)", devices.len());
    }
    Ok(())
}

pub async fn run_restore_drill(args: RestoreDrillArgs) -> Result<()> {
    let engine = open_engine(&args.engine)?;
    let report = engine
        .restore_drill(&args.backup, &args.target, &args.actor)
        .await?;
    match args.format {
        OutputFormat::Text => println!(
            "restore drill {} backup={} target={} passed={} ({})",
            report.id, report.backup_id, report.device, report.passed, report.detail
        ),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    if !report.passed {
        bail!("restore drill failed: {}", report.detail);
    }
    Ok(())
}

fn retention_class(class: BackupClass) -> RetentionClass {
    match class {
        BackupClass::Daily => RetentionClass::Daily,
        BackupClass::Weekly => RetentionClass::Weekly,
        BackupClass::Monthly => RetentionClass::Monthly,
    }
}
