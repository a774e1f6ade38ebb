use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use fwrecon::guardrail::GuardrailEvaluator;
use fwrecon::logging::{self, LogFormat};
use fwrecon::policy::load_policy_with_source;
use fwrecon::report::{render_diff, render_diff_summary, render_verdict};
use intent_core::{diff_with_options, format_json, parse_snapshot, DiffOptions, IntentSnapshot};

mod audit_cmd;
mod backup_cmd;
mod cli;
mod deploy_cmd;
mod drift_cmd;
mod unlock_cmd;
mod workspace;

use cli::{CheckArgs, Cli, Command, DiffArgs, OutputFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    logging::init(format, if cli.verbose { "debug" } else { "warn" });

    match cli.command {
        Command::Diff(args) => run_diff(args),
        Command::Check(args) => run_check(args, cli.verbose),
        Command::Deploy(args) => deploy_cmd::run_deploy(args).await,
        Command::Drift(args) => drift_cmd::run_drift(args).await,
        Command::Backup(args) => backup_cmd::run_backup(args).await,
        Command::RestoreDrill(args) => backup_cmd::run_restore_drill(args).await,
        Command::Audit(args) => audit_cmd::run_audit(args),
        Command::Unlock(args) => unlock_cmd::run_unlock(args),
    }
}

pub(crate) fn load_snapshot(path: &Path) -> Result<IntentSnapshot> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_snapshot(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

fn run_diff(args: DiffArgs) -> Result<()> {
    let from = load_snapshot(&args.from)?;
    let to = load_snapshot(&args.to)?;
    let diff = diff_with_options(&from, &to, &DiffOptions::ignoring(args.ignore));

    if args.summary {
        println!("{}", render_diff_summary(&diff));
        return Ok(());
    }
    match args.format {
        OutputFormat::Text => {
            println!("{}", render_diff(&diff));
            println!("{}", render_diff_summary(&diff));
        }
        OutputFormat::Json => println!("{}", format_json(&diff)),
    }
    Ok(())
}

fn run_check(args: CheckArgs, verbose: bool) -> Result<()> {
    let baseline = load_snapshot(&args.baseline)?;
    let target = load_snapshot(&args.target)?;
    let (policy, source) = load_policy_with_source(args.policy.as_deref())?;
    let evaluator = GuardrailEvaluator::from_policy(policy)?;

    let diff = diff_with_options(&baseline, &target, &DiffOptions::default());
    let verdict = evaluator.evaluate(&diff, &target, &[]);

    match args.format {
        OutputFormat::Text => {
            if verbose {
                println!("policy source={source}");
            }
            println!("{}", render_diff_summary(&diff));
            println!("{}", render_verdict(&verdict));
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&verdict)?),
    }

    if verdict.is_blocked() {
        bail!("check failed: {}", verdict.summary());
    }
    if args.strict && !verdict.violations().is_empty() {
        bail!(
            "check failed in strict mode: {} warnings",
            verdict.violations().len()
        );
    }
    Ok(())
}
