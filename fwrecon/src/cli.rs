use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "fwrecon")]
#[command(about = "Reconcile firewall intent with live devices through staged, guarded deployments")]
pub struct Cli {
    /// Debug-level logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Log as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Canonicalize and diff two intent files.
    Diff(DiffArgs),
    /// Evaluate guardrails for the change from a baseline to a target.
    Check(CheckArgs),
    /// Stage, validate and commit a target on file-backed devices.
    Deploy(DeployArgs),
    /// Compare live device configuration with recorded baselines.
    Drift(DriftArgs),
    /// Capture backups or prune them by retention.
    Backup(BackupArgs),
    /// Replay a backup onto a non-production device.
    RestoreDrill(RestoreDrillArgs),
    /// Query the audit ledger.
    Audit(AuditArgs),
    /// Clear a deployment lock.
    Unlock(UnlockArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum BackupClass {
    Daily,
    Weekly,
    Monthly,
}

/// Fleet, devices and state shared by engine-backed commands.
#[derive(Args, Debug)]
pub struct EngineArgs {
    /// Fleet inventory TOML (`[[device]]` entries).
    #[arg(long)]
    pub fleet: PathBuf,
    /// Directory of `<device>.xml` live configurations.
    #[arg(long, default_value = ".")]
    pub devices: PathBuf,
    /// State directory: persisted records and `audit.jsonl`.
    #[arg(long)]
    pub state: PathBuf,
    /// Engine configuration override.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Guardrail policy override.
    #[arg(long)]
    pub policy: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct DiffArgs {
    pub from: PathBuf,
    pub to: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[arg(long)]
    pub summary: bool,
    /// Leave objects out, as `kind` or `kind:name`.
    #[arg(long)]
    pub ignore: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    pub baseline: PathBuf,
    pub target: PathBuf,
    #[arg(long)]
    pub policy: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Treat warnings as failures.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Parser, Debug)]
pub struct DeployArgs {
    #[command(flatten)]
    pub engine: EngineArgs,
    /// Target intent document.
    #[arg(long)]
    pub target: PathBuf,
    #[arg(long)]
    pub ticket: String,
    #[arg(long)]
    pub actor: String,
    /// Devices to deploy to. Defaults to every fleet member of the target's
    /// environment and group.
    #[arg(long)]
    pub device: Vec<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct DriftArgs {
    #[command(flatten)]
    pub engine: EngineArgs,
    /// Devices to check. Defaults to every device with a baseline.
    #[arg(long)]
    pub device: Vec<String>,
    #[arg(long, default_value = "drift-scheduler")]
    pub actor: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct BackupArgs {
    #[command(flatten)]
    pub engine: EngineArgs,
    /// Devices to back up. Defaults to the whole fleet.
    #[arg(long)]
    pub device: Vec<String>,
    #[arg(long, value_enum, default_value_t = BackupClass::Daily)]
    pub class: BackupClass,
    /// Remove backups past retention instead of capturing.
    #[arg(long)]
    pub prune: bool,
    #[arg(long, default_value = "backup-scheduler")]
    pub actor: String,
    #[arg(long)]
    pub ticket: Option<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct RestoreDrillArgs {
    #[command(flatten)]
    pub engine: EngineArgs,
    #[arg(long)]
    pub backup: String,
    /// Non-production device to restore onto.
    #[arg(long)]
    pub target: String,
    #[arg(long)]
    pub actor: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct AuditArgs {
    #[arg(long)]
    pub state: PathBuf,
    #[arg(long)]
    pub device: Option<String>,
    /// RFC 3339 lower bound.
    #[arg(long, value_parser = parse_time)]
    pub since: Option<DateTime<Utc>>,
    /// RFC 3339 upper bound.
    #[arg(long, value_parser = parse_time)]
    pub until: Option<DateTime<Utc>>,
    /// Show compliance evidence for `--device` instead of entries.
    #[arg(long, requires = "device")]
    pub evidence: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct UnlockArgs {
    #[command(flatten)]
    pub engine: EngineArgs,
    #[arg(long)]
    pub device: String,
    #[arg(long)]
    pub actor: String,
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|err| format!("expected an RFC 3339 timestamp: {err}"))
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Command};

    #[test]
    fn command_definitions_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn device_selection_is_separate_from_the_devices_directory() {
        let cli = Cli::try_parse_from([
            "fwrecon", "deploy", "--fleet", "fleet.toml", "--devices", "devs", "--state", "st",
            "--target", "t.xml", "--ticket", "CHG-1", "--actor", "ci", "--device", "fw1",
            "--device", "fw2",
        ])
        .expect("deploy arguments parse");
        let Command::Deploy(args) = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(args.engine.devices, std::path::PathBuf::from("devs"));
        assert_eq!(args.device, vec!["fw1".to_string(), "fw2".to_string()]);

        for command in ["drift", "backup"] {
            let cli = Cli::try_parse_from([
                "fwrecon", command, "--fleet", "f.toml", "--state", "st", "--device", "fw1",
            ]);
            assert!(cli.is_ok(), "{command}: {:?}", cli.err());
        }
    }
}
