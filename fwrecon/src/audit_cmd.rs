use anyhow::Result;
use fwrecon::audit::AuditQuery;
use fwrecon::report::{render_audit_entry, render_evidence};

use crate::cli::{AuditArgs, OutputFormat};
use crate::workspace::open_ledger;

pub fn run_audit(args: AuditArgs) -> Result<()> {
    let ledger = open_ledger(&args.state)?;

    if args.evidence {
        if let Some(device) = args.device.as_deref() {
            let evidence = ledger.evidence(device);
            match args.format {
                OutputFormat::Text => println!("{}", render_evidence(&evidence)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&evidence)?),
            }
            return Ok(());
        }
    }

    let entries = ledger.query(&AuditQuery {
        device: args.device,
        since: args.since,
        until: args.until,
    });
    match args.format {
        OutputFormat::Text => {
            for entry in &entries {
                println!("{}", render_audit_entry(entry));
            }
            println!("{} entries", entries.len());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
    }
    Ok(())
}
