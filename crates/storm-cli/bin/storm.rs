//! `storm` binary entry point.
//!
//! Logs go to stderr so that `storm read` can stream file content on stdout.
//! The log level defaults to `warn` and follows `RUST_LOG` when set.

use anyhow::Result;
use std::io::Write;
use storm_cli::{CliConfig, run};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = CliConfig::from_args();
    tracing::debug!("Configuration: {config:?}");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(&config, &mut out)?;
    out.flush()?;

    Ok(())
}
