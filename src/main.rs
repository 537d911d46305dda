//! Main entry point for the canonzip CLI application.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use canonzip::batch::{self, Summary};
use canonzip::canon::FatalError;
use canonzip::{Cli, Outcome, logging, migrate};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.error_log.as_deref())?;

    let options = cli.options();
    let semaphore = Arc::new(Semaphore::new(cli.jobs.get()));
    let mut seen = HashSet::new();
    let mut failed = false;
    let mut fatal = false;

    for root in &cli.paths {
        let mut summary = Summary::new(root);
        let mut tasks = JoinSet::new();

        for found in batch::discover(root, cli.is_recursive()) {
            while let Some(done) = tasks.try_join_next() {
                fatal |= finish(done, &mut summary);
            }
            if fatal {
                break;
            }

            let path = match found {
                Ok(path) => path,
                Err(e) => {
                    tracing::error!("Cannot read {}: {e}", root.display());
                    summary.record_error();
                    continue;
                }
            };
            // The same archive reached twice must not be rebuilt twice at once
            let key = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if !seen.insert(key) {
                continue;
            }

            let permit = semaphore.clone().acquire_owned().await?;
            tasks.spawn(async move {
                let outcome = migrate(&path, &options).await;
                drop(permit);
                (path, outcome)
            });
        }

        while let Some(done) = tasks.join_next().await {
            fatal |= finish(done, &mut summary);
        }

        summary.log();
        failed |= summary.has_errors();
        if fatal {
            break;
        }
    }

    Ok(if fatal {
        ExitCode::from(2)
    } else if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Report a finished archive; returns true when the run has to stop.
fn finish(done: Result<(PathBuf, Outcome), JoinError>, summary: &mut Summary) -> bool {
    let (path, outcome) = match done {
        Ok(done) => done,
        Err(e) => {
            tracing::error!("Archive task failed: {e}");
            summary.record_error();
            return false;
        }
    };
    summary.record(&outcome);

    match &outcome {
        Outcome::Skipped | Outcome::Rebuilt(_) => false,
        Outcome::Failed(e) => {
            tracing::error!("{e}");
            false
        }
        Outcome::Fatal(e) => {
            tracing::error!("!!!! {e} !!!!");
            if let FatalError::Replace(replace) = e
                && replace.original_lost()
            {
                tracing::error!("{} is missing until the rebuilt copy is renamed", path.display());
            }
            tracing::error!("Stopping after a fatal error while processing {}", path.display());
            true
        }
    }
}
