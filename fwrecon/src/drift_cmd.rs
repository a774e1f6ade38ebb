use anyhow::{bail, Result};
use fwrecon::drift::DriftSeverity;
use fwrecon::report::render_drift;
use serde_json::json;

use crate::cli::{DriftArgs, OutputFormat};
use crate::workspace::open_engine;

pub async fn run_drift(args: DriftArgs) -> Result<()> {
    let engine = open_engine(&args.engine)?;
    let devices: Vec<String> = if args.device.is_empty() {
        engine
            .fleet()
            .devices()
            .filter(|device| engine.fleet().baseline(&device.id).is_some())
            .map(|device| device.id.clone())
            .collect()
    } else {
        args.device.clone()
    };

    let results = engine.drift_all(&devices, &args.actor).await;

    let mut blocked = 0;
    let mut errors = 0;
    let mut lines = Vec::new();
    let mut values = Vec::new();
    for (device, result) in devices.iter().zip(results) {
        match result {
            Ok(report) => {
                if report.severity == DriftSeverity::Block {
                    blocked += 1;
                }
                lines.push(render_drift(&report));
                values.push(serde_json::to_value(&report)?);
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

    if blocked > 0 {
        bail!("drift failed: {blocked} device(s) with block-severity drift");
    }
    if errors > 0 {
        bail!("drift failed: {errors} run(s) could not complete");
    }
    Ok(())
}
