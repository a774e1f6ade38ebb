use std::sync::Arc;

use anyhow::{bail, Result};
use fwrecon::deploy::CancelHandle;
use fwrecon::report::render_attempt;
use serde_json::json;

use crate::cli::{DeployArgs, OutputFormat};
use crate::load_snapshot;
use crate::workspace::open_engine;

pub async fn run_deploy(args: DeployArgs) -> Result<()> {
    let engine = open_engine(&args.engine)?;
    let target = Arc::new(load_snapshot(&args.target)?);

    let devices: Vec<String> = if args.device.is_empty() {
        engine
            .fleet()
            .members(target.scope())
            .into_iter()
            .map(|device| device.id.clone())
            .collect()
    } else {
        args.device.clone()
    };
    if devices.is_empty() {
        bail!("deploy failed: no fleet devices in {}", target.scope());
    }

    let cancel = CancelHandle::new();
    let signal = cancel.signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling deployments");
            cancel.cancel();
        }
    });

    let results = engine
        .deploy_all(target, &devices, &args.ticket, &args.actor, signal)
        .await;

    let mut failed = 0;
    let mut lines = Vec::new();
    let mut values = Vec::new();
    for (device, result) in devices.iter().zip(results) {
        match result {
            Ok(attempt) => {
                if !attempt.outcome.as_ref().is_some_and(|o| o.succeeded()) {
                    failed += 1;
                }
                lines.push(render_attempt(&attempt));
                values.push(serde_json::to_value(&attempt)?);
            }
            Err(err) => {
                failed += 1;
                lines.push(format!("error {device}: {err}"));
                values.push(json!({ "device": device, "error": err.kind(), "message": err.to_string() }));
            }
        }
    }
    match args.format {
        OutputFormat::Text => println!("{}", lines.join("\n")),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&values)?),
    }

    if failed > 0 {
        bail!(
            "deploy failed: {failed} of {} attempts did not complete",
            devices.len()
        );
    }
    Ok(())
}
