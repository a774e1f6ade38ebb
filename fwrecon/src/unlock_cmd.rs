use anyhow::{bail, Result};

use crate::cli::UnlockArgs;
use crate::workspace::open_engine;

pub fn run_unlock(args: UnlockArgs) -> Result<()> {
    let engine = open_engine(&args.engine)?;
    match engine.clear_lock(&args.device, &args.actor)? {
        Some(lock) => {
            println!(
                "cleared deployment lock on {} (attempt {}, locked {}): {}",
                lock.device,
                lock.attempt_id,
                lock.locked_at.to_rfc3339(),
                lock.reason
            );
            Ok(())
        }
        None => bail!("unlock failed: {} is not deployment-locked", args.device),
    }
}
