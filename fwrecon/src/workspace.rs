use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fwrecon::adapter::{FileDeviceAdapter, HealthCheckRunner};
use fwrecon::audit::AuditLedger;
use fwrecon::config::load_engine_config_with_source;
use fwrecon::fleet::load_fleet;
use fwrecon::policy::load_policy_with_source;
use fwrecon::store::JsonDirStore;
use fwrecon::Engine;

use crate::cli::EngineArgs;

pub const AUDIT_FILE: &str = "audit.jsonl";

/// Engine over file-backed devices with state persisted under `--state`.
pub fn open_engine(args: &EngineArgs) -> Result<Engine> {
    let fleet = load_fleet(&args.fleet)
        .with_context(|| format!("failed to load fleet {}", args.fleet.display()))?;
    let (config, config_source) = load_engine_config_with_source(args.config.as_deref())?;
    let (policy, policy_source) = load_policy_with_source(args.policy.as_deref())?;
    tracing::debug!(config = %config_source, policy = %policy_source, "engine sources");

    let adapter = Arc::new(FileDeviceAdapter::new(&args.devices));
    let store = JsonDirStore::open(&args.state)
        .with_context(|| format!("failed to open state directory {}", args.state.display()))?;
    let audit = open_ledger(&args.state)?;

    let engine = Engine::builder(fleet, adapter.clone())
        .checks(Arc::new(HealthCheckRunner::new(adapter)))
        .store(Arc::new(store))
        .audit(Arc::new(audit))
        .config(config)
        .policy(policy)
        .build()?;
    engine
        .load_persisted()
        .context("failed to load persisted baselines and locks")?;
    Ok(engine)
}

pub fn open_ledger(state: &Path) -> Result<AuditLedger> {
    let path = state.join(AUDIT_FILE);
    AuditLedger::open(&path).with_context(|| format!("failed to open audit ledger {}", path.display()))
}
