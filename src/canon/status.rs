//! Deciding whether an archive needs to be rebuilt.

use std::fmt;

use crate::io::ReadAt;
use crate::zip::{CentralDirectory, ZipFileEntry, ZipParser};

use super::dirs;
use super::names::{NameList, NameListError};
use super::options::MigrateOptions;
use super::signature::{self, COMMENT_LEN};

/// Result of inspecting an archive, in the order the checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveStatus {
    /// Canonical and unchanged since it was last rebuilt
    Ok,
    /// Signature present but the central directory no longer matches it
    OutOfDate,
    /// No signature comment
    BadComment,
    /// Not a readable archive
    Error,
    /// Members are not in canonical order
    WrongOrder,
    /// Directory entries that can be dropped, or any directory at all when
    /// subdirectories are being stripped
    ContainsRedundantDirs,
    /// Canonical, but a rebuild was requested anyway
    ForceRezip,
    /// The member list could not be allocated
    AllocError,
}

impl ArchiveStatus {
    /// Whether the pipeline should produce a new archive.
    pub fn needs_rebuild(self) -> bool {
        !matches!(
            self,
            ArchiveStatus::Ok | ArchiveStatus::Error | ArchiveStatus::AllocError
        )
    }
}

impl fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ArchiveStatus::Ok => "already canonical",
            ArchiveStatus::OutOfDate => "modified since it was last rebuilt",
            ArchiveStatus::BadComment => "no canonical signature",
            ArchiveStatus::Error => "corrupt or not a zip file",
            ArchiveStatus::WrongOrder => "members out of order",
            ArchiveStatus::ContainsRedundantDirs => "redundant directory entries",
            ArchiveStatus::ForceRezip => "rebuild forced",
            ArchiveStatus::AllocError => "out of memory",
        };
        f.write_str(text)
    }
}

/// What the classifier learned about an archive.
#[derive(Debug)]
pub struct Verdict {
    pub status: ArchiveStatus,
    /// Central directory records in physical order
    pub entries: Vec<ZipFileEntry>,
    /// Member names in canonical order for the active sort mode
    pub members: NameList,
}

impl Verdict {
    fn failed(status: ArchiveStatus) -> Self {
        Self {
            status,
            entries: Vec::new(),
            members: NameList::new(),
        }
    }
}

/// Signature check: the comment must decode and match the directory.
async fn signature_status<R: ReadAt>(
    parser: &ZipParser<R>,
    directory: &CentralDirectory,
) -> ArchiveStatus {
    let reader = parser.reader();
    let size = parser.size();

    let mut magic = [0u8; 2];
    if reader.read_exact_at(0, &mut magic).await.is_err() || &magic != b"PK" {
        return ArchiveStatus::Error;
    }

    let Some(comment_offset) = size.checked_sub(COMMENT_LEN as u64) else {
        return ArchiveStatus::Error;
    };
    let mut comment = [0u8; COMMENT_LEN];
    if let Err(e) = reader.read_exact_at(comment_offset, &mut comment).await {
        tracing::debug!("cannot read archive comment: {e:#}");
        return ArchiveStatus::Error;
    }
    let Some(expected) = signature::decode(&comment) else {
        return ArchiveStatus::BadComment;
    };
    if usize::from(directory.comment_len) != COMMENT_LEN {
        return ArchiveStatus::BadComment;
    }

    match signature::checksum_at(reader.as_ref(), directory.offset, directory.size).await {
        Ok(actual) if actual == expected => ArchiveStatus::Ok,
        Ok(actual) => {
            tracing::debug!("central directory checksum {actual:08X}, signature says {expected:08X}");
            ArchiveStatus::OutOfDate
        }
        Err(e) => {
            tracing::debug!("cannot checksum central directory: {e:#}");
            ArchiveStatus::Error
        }
    }
}

fn collect_names(entries: &[ZipFileEntry]) -> Result<NameList, NameListError> {
    let mut members = NameList::new();
    members.ensure_capacity(entries.len())?;
    for (index, entry) in entries.iter().enumerate() {
        members.push(&entry.name, index)?;
    }
    Ok(members)
}

/// Classify the archive behind `parser`.
///
/// Every check after the signature only runs while the archive still
/// looks canonical; the member list is read and sorted regardless, since
/// a rebuild needs it.
pub async fn classify<R: ReadAt>(
    parser: &ZipParser<R>,
    directory: &CentralDirectory,
    options: &MigrateOptions,
) -> Verdict {
    let mut status = signature_status(parser, directory).await;
    if status == ArchiveStatus::Error {
        return Verdict::failed(status);
    }

    let entries = match parser.list_files(directory).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("cannot list members: {e:#}");
            return Verdict::failed(ArchiveStatus::Error);
        }
    };
    let mut members = match collect_names(&entries) {
        Ok(members) => members,
        Err(NameListError::Alloc(e)) => {
            tracing::debug!("{e}");
            return Verdict::failed(ArchiveStatus::AllocError);
        }
        Err(e) => {
            tracing::debug!("bad member name: {e}");
            return Verdict::failed(ArchiveStatus::Error);
        }
    };

    let mode = options.sort_mode();
    if status == ArchiveStatus::Ok && options.force_rezip {
        status = ArchiveStatus::ForceRezip;
    }
    if status == ArchiveStatus::Ok && !members.is_sorted(mode) {
        status = ArchiveStatus::WrongOrder;
    }

    members.sort(mode);

    if status == ArchiveStatus::Ok {
        let has_dirs = if options.strip_subdirs {
            dirs::has_any_subdirectory(members.as_slice())
        } else {
            dirs::has_any_redundant(members.as_slice())
        };
        if has_dirs {
            status = ArchiveStatus::ContainsRedundantDirs;
        }
    }

    Verdict {
        status,
        entries,
        members,
    }
}
