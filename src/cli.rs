use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;

use crate::canon::MigrateOptions;

#[derive(Parser, Debug)]
#[command(name = "canonzip")]
#[command(version)]
#[command(
    about = "Rewrite ZIP archives into a deterministic, self-verifying canonical form",
    long_about = None
)]
#[command(after_help = "Examples:\n  \
  canonzip roms/                  rebuild every .zip below roms/\n  \
  canonzip -s -q roms/            only roms/ itself, without skip messages\n  \
  canonzip -d -f game.zip         flatten game.zip and rebuild it even if canonical")]
pub struct Cli {
    /// ZIP files or directories to process
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Strip subdirectories, storing every file under its basename
    #[arg(short = 'd', long = "strip-subdirs")]
    pub strip_subdirs: bool,

    /// Rebuild archives that are already canonical
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Do not report archives that are skipped
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Do not descend into subdirectories
    #[arg(short = 's', long = "no-recursion")]
    pub no_recursion: bool,

    /// Also append every error to this file
    #[arg(short = 'e', long = "error-log", value_name = "FILE")]
    pub error_log: Option<PathBuf>,

    /// Number of archives processed at once
    #[arg(short = 'j', long = "jobs", value_name = "N", default_value = "1")]
    pub jobs: NonZeroUsize,
}

impl Cli {
    pub fn options(&self) -> MigrateOptions {
        MigrateOptions {
            force_rezip: self.force,
            strip_subdirs: self.strip_subdirs,
            quiet: self.quiet,
        }
    }

    pub fn is_recursive(&self) -> bool {
        !self.no_recursion
    }
}
