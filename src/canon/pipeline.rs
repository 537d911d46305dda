//! Rebuilding one archive into canonical form.
//!
//! The rebuilt archive is written to a temporary file beside the original
//! and only renamed over it once it is complete, so a failure at any point
//! before the rename leaves the original exactly as it was.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio::io::BufWriter;

use crate::io::LocalFileReader;
use crate::zip::{CentralDirectory, ZipParser, ZipWriter};

use super::dirs;
use super::error::{CopyError, FatalError, MigrateError, ReplaceError};
use super::names::NameBuf;
use super::options::MigrateOptions;
use super::ordering::basename;
use super::signature::{self, COMMENT_LEN};
use super::status::{self, ArchiveStatus, Verdict};

/// Size of the buffer members are copied through.
const TRANSFER_BUFFER: usize = 64 * 1024;

const TEMP_PREFIX: &str = ".canonzip-";
const TEMP_SUFFIX: &str = ".tmp";

/// Numbers describing a successful rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildStats {
    /// Why the archive was rebuilt
    pub status: ArchiveStatus,
    /// Members written to the new archive
    pub files: u64,
    /// Uncompressed bytes written
    pub bytes: u64,
    /// Directory entries dropped
    pub removed_dirs: u64,
}

/// What happened to one archive.
#[derive(Debug)]
pub enum Outcome {
    /// Already canonical, left alone
    Skipped,
    Rebuilt(RebuildStats),
    /// This archive could not be processed; it is unchanged
    Failed(MigrateError),
    /// The run must stop
    Fatal(FatalError),
}

enum Failure {
    Archive(MigrateError),
    Fatal(FatalError),
}

impl From<MigrateError> for Failure {
    fn from(e: MigrateError) -> Self {
        Failure::Archive(e)
    }
}

impl From<FatalError> for Failure {
    fn from(e: FatalError) -> Self {
        Failure::Fatal(e)
    }
}

/// Bring the archive at `path` into canonical form.
///
/// Callers must not run two migrations of the same path at once.
pub async fn migrate(path: &Path, options: &MigrateOptions) -> Outcome {
    match run(path, options).await {
        Ok(outcome) => outcome,
        Err(Failure::Archive(e)) => Outcome::Failed(e),
        Err(Failure::Fatal(e)) => Outcome::Fatal(e),
    }
}

/// Classify the archive at `path` without changing it.
pub async fn inspect(path: &Path, options: &MigrateOptions) -> Result<ArchiveStatus, MigrateError> {
    let (parser, directory) = open(path).await?;
    let verdict = status::classify(&parser, &directory, options).await;
    Ok(verdict.status)
}

/// Check the file can be read and written, then locate its central
/// directory.
async fn open(path: &Path) -> Result<(ZipParser<LocalFileReader>, CentralDirectory), MigrateError> {
    let access = |source| MigrateError::Access {
        path: path.to_path_buf(),
        source,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(access)?;
    match metadata.len() {
        0 => {
            return Err(MigrateError::Empty {
                path: path.to_path_buf(),
            });
        }
        size if size < COMMENT_LEN as u64 => {
            return Err(MigrateError::TooSmall {
                path: path.to_path_buf(),
                size,
            });
        }
        _ => {}
    }
    tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .await
        .map_err(access)?;

    let format = |source| MigrateError::Format {
        path: path.to_path_buf(),
        source,
    };
    let reader = LocalFileReader::new(path).map_err(format)?;
    let parser = ZipParser::new(Arc::new(reader));
    let directory = parser.central_directory().await.map_err(format)?;
    Ok((parser, directory))
}

async fn run(path: &Path, options: &MigrateOptions) -> Result<Outcome, Failure> {
    let (parser, directory) = open(path).await?;

    let verdict = status::classify(&parser, &directory, options).await;
    match verdict.status {
        ArchiveStatus::Ok => {
            if !options.quiet {
                tracing::info!("Skipping, already canonical - {}", path.display());
            }
            return Ok(Outcome::Skipped);
        }
        ArchiveStatus::Error => {
            return Err(MigrateError::Corrupt {
                path: path.to_path_buf(),
            }
            .into());
        }
        ArchiveStatus::AllocError => return Err(FatalError::OutOfMemory.into()),
        status => tracing::info!("Rezipping ({status}) - {}", path.display()),
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(&dir)
        .map_err(|source| FatalError::TempFile { dir, source })?;

    // Dropping `temp` on any error below deletes the partial archive.
    let stats = write_archive(path, &parser, &verdict, &temp, options).await?;
    drop(parser);

    copy_permissions(path, temp.path()).await;
    replace(temp, path).await.map_err(FatalError::from)?;

    tracing::info!(
        "Done - {} ({} files, {} bytes, {} directories removed)",
        path.display(),
        stats.files,
        stats.bytes,
        stats.removed_dirs
    );
    Ok(Outcome::Rebuilt(stats))
}

fn is_removable(index: usize, members: &[NameBuf], options: &MigrateOptions) -> bool {
    let name = members[index].as_bytes();
    if options.strip_subdirs {
        dirs::is_directory(name)
    } else {
        dirs::is_redundant(index, members)
    }
}

async fn write_archive(
    path: &Path,
    parser: &ZipParser<LocalFileReader>,
    verdict: &Verdict,
    temp: &NamedTempFile,
    options: &MigrateOptions,
) -> Result<RebuildStats, MigrateError> {
    let finalize = |source: anyhow::Error| MigrateError::Finalize {
        path: path.to_path_buf(),
        source,
    };

    let file = temp.as_file().try_clone().map_err(|e| finalize(e.into()))?;
    let mut writer = ZipWriter::new(BufWriter::new(tokio::fs::File::from_std(file)));

    let mut stats = RebuildStats {
        status: verdict.status,
        files: 0,
        bytes: 0,
        removed_dirs: 0,
    };
    let mut buf = vec![0u8; TRANSFER_BUFFER];
    let mut previous: Option<&[u8]> = None;
    let members = verdict.members.as_slice();

    for (index, member) in members.iter().enumerate() {
        if is_removable(index, members, options) {
            tracing::info!("Directory {member} removed");
            stats.removed_dirs += 1;
            continue;
        }

        let stored = if options.strip_subdirs {
            basename(member.as_bytes())
        } else {
            member.as_bytes()
        };
        if previous == Some(stored) {
            return Err(MigrateError::DuplicateName {
                path: path.to_path_buf(),
                name: String::from_utf8_lossy(stored).into_owned(),
            });
        }
        previous = Some(stored);

        let entry = &verdict.entries[member.entry()];
        let copy_error = |source| MigrateError::Copy {
            path: path.to_path_buf(),
            name: entry.file_name.clone(),
            source,
        };

        tracing::debug!("Adding - {member} ({} bytes)", entry.uncompressed_size);
        let mut source = parser
            .open_entry(entry)
            .await
            .map_err(|e| copy_error(CopyError::Open(e)))?;
        let mut target = writer
            .start_entry(stored, entry.needs_zip64())
            .await
            .map_err(|e| copy_error(CopyError::Write(e)))?;

        loop {
            let n = source
                .read(&mut buf)
                .await
                .map_err(|e| copy_error(CopyError::Read(e)))?;
            if n == 0 {
                break;
            }
            target
                .write(&buf[..n])
                .await
                .map_err(|e| copy_error(CopyError::Write(e)))?;
        }
        target
            .finish()
            .await
            .map_err(|e| copy_error(CopyError::Write(e)))?;

        stats.files += 1;
        stats.bytes += source.produced();
    }

    let comment = signature::encode(signature::checksum(writer.central_directory()));
    let out = writer.finish(&comment).await.map_err(finalize)?;
    out.into_inner()
        .sync_all()
        .await
        .map_err(|e| finalize(e.into()))?;

    Ok(stats)
}

async fn copy_permissions(from: &Path, to: &Path) {
    let result = match tokio::fs::metadata(from).await {
        Ok(metadata) => tokio::fs::set_permissions(to, metadata.permissions()).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::debug!("cannot copy permissions of {}: {e}", from.display());
    }
}

/// Move the finished temporary archive over `target`.
///
/// A plain rename is tried first. Where the filesystem refuses to rename
/// over an existing file, the original is removed and the rename retried.
async fn replace(temp: NamedTempFile, target: &Path) -> Result<(), ReplaceError> {
    let temp = match temp.persist(target) {
        Ok(_) => return Ok(()),
        Err(e) => {
            tracing::debug!("rename over {} failed: {}", target.display(), e.error);
            e.file
        }
    };

    if let Err(source) = tokio::fs::remove_file(target).await {
        let temp_path = temp.path().to_path_buf();
        return match temp.close() {
            Ok(()) => Err(ReplaceError::Unchanged {
                target: target.to_path_buf(),
                source,
            }),
            Err(_) => Err(ReplaceError::TempLeftBehind {
                target: target.to_path_buf(),
                temp: temp_path,
                source,
            }),
        };
    }

    match temp.persist(target) {
        Ok(_) => Ok(()),
        Err(e) => {
            let source = e.error;
            let temp = match e.file.keep() {
                Ok((_, path)) => path,
                Err(e) => e.file.path().to_path_buf(),
            };
            Err(ReplaceError::OriginalRemoved {
                target: target.to_path_buf(),
                temp,
                source,
            })
        }
    }
}
