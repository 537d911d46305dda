//! Finding archives to process and keeping score.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::canon::Outcome;
use crate::canon::ordering::canonical_cmp;

/// Whether a file found while walking a directory should be processed.
pub fn is_zip_name(name: &OsStr) -> bool {
    let name = name.as_encoded_bytes();
    name.len() > 4 && name[name.len() - 4..].eq_ignore_ascii_case(b".zip")
}

/// Archives reachable from a command line path.
///
/// A file is returned as is, whatever its name. A directory is walked in
/// canonical name order without following symlinks, yielding regular files
/// with a `.zip` extension; with `recursive` unset only its immediate
/// children are considered.
pub fn discover(
    root: &Path,
    recursive: bool,
) -> impl Iterator<Item = Result<PathBuf, walkdir::Error>> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by(|a, b| {
            canonical_cmp(
                a.file_name().as_encoded_bytes(),
                b.file_name().as_encoded_bytes(),
            )
        });

    walker.into_iter().filter_map(|entry| match entry {
        Ok(entry) if entry.depth() == 0 => {
            entry.file_type().is_file().then(|| Ok(entry.into_path()))
        }
        Ok(entry) => (entry.file_type().is_file() && is_zip_name(entry.file_name()))
            .then(|| Ok(entry.into_path())),
        Err(e) => Some(Err(e)),
    })
}

/// Counts for one command line path.
#[derive(Debug)]
pub struct Summary {
    root: PathBuf,
    pub checked: u64,
    pub rebuilt: u64,
    pub up_to_date: u64,
    pub errors: u64,
    started: Instant,
}

impl Summary {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            checked: 0,
            rebuilt: 0,
            up_to_date: 0,
            errors: 0,
            started: Instant::now(),
        }
    }

    pub fn record(&mut self, outcome: &Outcome) {
        self.checked += 1;
        match outcome {
            Outcome::Skipped => self.up_to_date += 1,
            Outcome::Rebuilt(_) => self.rebuilt += 1,
            Outcome::Failed(_) | Outcome::Fatal(_) => self.errors += 1,
        }
    }

    /// Count a problem that is not tied to a processed archive, such as an
    /// unreadable directory.
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn log(&self) {
        tracing::info!(
            "{}: checked {} zip files in {:.2}s, {} rebuilt, {} already canonical, {} errors",
            self.root.display(),
            self.checked,
            self.elapsed().as_secs_f64(),
            self.rebuilt,
            self.up_to_date,
            self.errors
        );
        if self.has_errors() {
            tracing::warn!("!!!! There were problems! See the output above for details. !!!!");
        }
    }
}
