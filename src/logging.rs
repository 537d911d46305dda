//! Log output setup.
//!
//! Everything goes to stderr through an `EnvFilter` (`RUST_LOG`, `info` by
//! default). An error log file, when given, additionally receives every
//! `ERROR` event.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub fn init(error_log: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(filter);

    let errors = match error_log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open error log {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(LevelFilter::ERROR),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(errors)
        .try_init()
        .context("Cannot install log subscriber")?;
    Ok(())
}
