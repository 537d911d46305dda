use super::ordering::SortMode;

/// Per-run policy passed to every [`migrate`](super::migrate) call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Rebuild even archives that are already canonical
    pub force_rezip: bool,
    /// Store members under their basename only, dropping every directory
    pub strip_subdirs: bool,
    /// Do not narrate archives that are skipped
    pub quiet: bool,
}

impl MigrateOptions {
    pub fn sort_mode(&self) -> SortMode {
        if self.strip_subdirs {
            SortMode::Basename
        } else {
            SortMode::FullPath
        }
    }
}
