//! Canonicalization engine.
//!
//! An archive is canonical when its members are in canonical order, it
//! holds no redundant directory entries, every member was written by
//! [`ZipWriter`](crate::zip::ZipWriter) and the archive comment carries
//! the CRC-32 of its central directory. [`migrate`] checks an archive
//! against these rules and rebuilds it when any of them fails.

pub mod dirs;
mod error;
pub mod names;
mod options;
pub mod ordering;
mod pipeline;
pub mod signature;
mod status;

pub use error::{CopyError, ErrorKind, FatalError, MigrateError, ReplaceError};
pub use options::MigrateOptions;
pub use ordering::SortMode;
pub use pipeline::{Outcome, RebuildStats, inspect, migrate};
pub use status::{ArchiveStatus, Verdict, classify};
