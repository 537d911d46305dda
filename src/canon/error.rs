use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::zip::EntryError;

/// Broad category of a per-archive failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Format,
    CorruptEntry,
    DuplicateName,
    Copy,
}

/// A failure confined to one archive. The archive is left untouched.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("error opening \"{path}\": {source}", path = path.display())]
    Access {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("\"{path}\" is empty", path = path.display())]
    Empty { path: PathBuf },

    #[error("\"{path}\" is too small ({size} bytes), file may be corrupt", path = path.display())]
    TooSmall { path: PathBuf, size: u64 },

    #[error("error opening \"{path}\", zip format problem: {source}", path = path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("unable to process \"{path}\", it seems to be corrupt", path = path.display())]
    Corrupt { path: PathBuf },

    #[error("\"{path}\" contains more than one file named \"{name}\"", path = path.display())]
    DuplicateName { path: PathBuf, name: String },

    #[error("cannot copy \"{name}\" from \"{path}\": {source}", path = path.display())]
    Copy {
        path: PathBuf,
        name: String,
        #[source]
        source: CopyError,
    },

    #[error("unable to finish the rebuilt archive for \"{path}\": {source}", path = path.display())]
    Finalize {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl MigrateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrateError::Access { .. } | MigrateError::Finalize { .. } => ErrorKind::Io,
            MigrateError::Empty { .. }
            | MigrateError::TooSmall { .. }
            | MigrateError::Format { .. } => ErrorKind::Format,
            MigrateError::Corrupt { .. } => ErrorKind::CorruptEntry,
            MigrateError::DuplicateName { .. } => ErrorKind::DuplicateName,
            MigrateError::Copy { .. } => ErrorKind::Copy,
        }
    }
}

/// Which side of a member copy failed.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("unable to open member: {0}")]
    Open(#[source] anyhow::Error),
    #[error("error while reading: {0}")]
    Read(#[source] EntryError),
    #[error("error while writing to the new archive: {0}")]
    Write(#[source] anyhow::Error),
}

/// Conditions that must stop the whole run.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("error allocating memory")]
    OutOfMemory,

    #[error("couldn't create a unique temporary file in \"{dir}\": {source}", dir = dir.display())]
    TempFile {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Replace(#[from] ReplaceError),
}

/// Failure to move a rebuilt archive over the original.
#[derive(Debug, Error)]
pub enum ReplaceError {
    /// Nothing changed on disk; the temporary file is gone.
    #[error("could not replace \"{target}\": {source}", target = target.display())]
    Unchanged {
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Nothing changed, but the temporary file could not be removed.
    #[error(
        "could not replace \"{target}\" and could not remove \"{temp}\", please remove it manually: {source}",
        target = target.display(),
        temp = temp.display()
    )]
    TempLeftBehind {
        target: PathBuf,
        temp: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The original is deleted and the rebuilt archive still sits at `temp`.
    #[error(
        "\"{target}\" has already been deleted, rename \"{temp}\" to it manually: {source}",
        target = target.display(),
        temp = temp.display()
    )]
    OriginalRemoved {
        target: PathBuf,
        temp: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ReplaceError {
    /// Whether the original archive no longer exists at its path.
    pub fn original_lost(&self) -> bool {
        matches!(self, ReplaceError::OriginalRemoved { .. })
    }
}
