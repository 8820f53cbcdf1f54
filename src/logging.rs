//! Tracing/logging initialization for the binary.
//!
//! Filtering comes from `RUST_LOG` when set; otherwise `--verbose` selects
//! debug output for this crate and info for everything else.

use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "warn,argentum=debug" } else { "warn,argentum=info" }
}

/// Install the global subscriber. Safe to call multiple times; later calls
/// are no-ops.
pub fn init(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
