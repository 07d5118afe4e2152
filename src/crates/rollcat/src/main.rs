//! Copies lines from stdin into a rolling log file.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::CliArgs;
use rolling_log_writer::{RollingWriter, Storage};
use std::io::{self, BufRead};
use tracing::{info, warn};

fn initialize_tracing() {
    use tracing_subscriber::{EnvFilter, prelude::*};

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,rolling_log_writer=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Appends every line of `input` to `log`, returning the number of bytes
/// copied. Sync and prune failures are logged and copying goes on.
fn copy<R: BufRead, S: Storage>(mut input: R, log: &mut RollingWriter<S>) -> Result<u64> {
    let mut line = Vec::new();
    let mut copied = 0u64;

    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            break;
        }

        match log.append(&line) {
            Ok(n) => copied += n as u64,
            Err(e) if !e.is_fatal() => {
                warn!("{}", e);
                copied += line.len() as u64;
            }
            Err(e) => return Err(e).context("Appending to log"),
        }
    }

    Ok(copied)
}

fn main() -> Result<()> {
    initialize_tracing();

    let config = CliArgs::parse().into_config()?;
    let mut log = RollingWriter::open(&config)
        .with_context(|| format!("Opening {}", config.output_path.display()))?;

    let settings = log.settings();
    info!(
        "writing to {} (rotation {} bytes, flush {} bytes, sync {} bytes, {} backups)",
        settings.output_path().display(),
        settings.rotation_size(),
        settings.flush_size(),
        settings.sync_size(),
        settings.max_backups()
    );

    let copied = copy(io::stdin().lock(), &mut log)?;
    log.close().context("Closing log")?;

    info!("copied {} bytes", copied);
    Ok(())
}
