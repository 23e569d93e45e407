use std::path::PathBuf;
use time::UtcDateTime;

/// A file in the archive, as seen by a directory listing or `stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from the archive root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    pub modified: UtcDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: UtcDateTime) -> Self {
        Self { path: path.into(), size, modified }
    }
}

/// The outcome of publishing a staged download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub path: PathBuf,
    pub size: u64,
    /// Lowercase hex MD5 of the published content.
    pub hash: String,
}
