//! Path validation for archive-relative paths.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a path relative to the archive root.
///
/// Resolves `.` and `..` lexically and rejects anything that would leave the
/// root, is empty, carries a Windows prefix, or contains a null byte.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use podarc_storage::validate_path;
/// assert!(validate_path("Show/cover.jpg").is_ok());
/// assert!(validate_path("Show/../Other/summary.json").is_ok());
/// assert!(validate_path("../database.db").is_err());
/// assert!(validate_path("Show/../../x").is_err());
/// assert_eq!(
///     validate_path("./Show//episodes/../podcast.xml").unwrap(),
///     Path::new("Show/podcast.xml")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but
                // truncate in syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}
