//! # canonzip
//!
//! Rewrites ZIP archives into a single deterministic form, so that two
//! archives with the same member names and contents end up byte-for-byte
//! identical no matter which tool produced them.
//!
//! A canonical archive has its members in canonical (case-insensitive)
//! order, no directory entries that other members already imply, every
//! member deflated with fixed metadata, and an archive comment binding the
//! archive to a CRC-32 of its own central directory. The comment lets an
//! archive be recognised as canonical by reading the directory alone.
//!
//! ## Features
//!
//! - Detects archives that are already canonical and leaves them alone
//! - Rebuilds everything else beside the original and atomically replaces it
//! - Optional flattening of all subdirectories
//! - ZIP64 support on both the reading and the writing side
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use canonzip::{MigrateOptions, Outcome, migrate};
//!
//! #[tokio::main]
//! async fn main() {
//!     match migrate(Path::new("archive.zip"), &MigrateOptions::default()).await {
//!         Outcome::Skipped => println!("already canonical"),
//!         Outcome::Rebuilt(stats) => println!("rebuilt {} files", stats.files),
//!         Outcome::Failed(e) => eprintln!("{e}"),
//!         Outcome::Fatal(e) => eprintln!("fatal: {e}"),
//!     }
//! }
//! ```

pub mod batch;
pub mod canon;
pub mod cli;
pub mod io;
pub mod logging;
pub mod zip;

pub use canon::{ArchiveStatus, MigrateError, MigrateOptions, Outcome, inspect, migrate};
pub use cli::Cli;
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use zip::{ZipFileEntry, ZipParser, ZipWriter};
