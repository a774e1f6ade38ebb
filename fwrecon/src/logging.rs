//! Tracing subscriber setup for the binary.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Compact,
    /// One JSON object per event.
    Json,
}

static INIT: Once = Once::new();

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable. `RUST_LOG` overrides `default_level`.
/// Later calls are no-ops.
pub fn init(format: LogFormat, default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("fwrecon={default_level}")));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false);
        let installed = match format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        if let Err(err) = installed {
            eprintln!("logging already initialized: {err}");
        }
    });
}
