//! Staged downloads.
//!
//! A download is written to a uniquely named file in the archive's scratch
//! directory while its MD5 is computed on the fly. The destination is only
//! ever reached by an atomic rename in [`Staged::publish`]; dropping a
//! [`Staged`] (including when the task owning it is cancelled) deletes the
//! temporary file.

use crate::archive::Archive;
use crate::error::{ErrorKind, Result};
use crate::models::Published;
use md5::{Digest, Md5};
use std::path::Path;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

pub struct Staged {
    archive: Archive,
    file: tokio::fs::File,
    path: TempPath,
    hasher: Md5,
    written: u64,
}

impl std::fmt::Debug for Staged {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Staged").field("path", &self.path).field("written", &self.written).finish()
    }
}

impl Staged {
    pub(crate) fn create(archive: Archive, scratch: &Path) -> Result<Self> {
        let named = tempfile::Builder::new()
            .prefix("fetch-")
            .suffix(".part")
            .tempfile_in(scratch)
            .map_err(|e| Archive::map_io_error(e, scratch))?;
        let (file, path) = named.into_parts();
        Ok(Self {
            archive,
            file: tokio::fs::File::from_std(file),
            path,
            hasher: Md5::new(),
            written: 0,
        })
    }

    /// Absolute path of the temporary file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.file.write_all(chunk).await.map_err(ErrorKind::Io)?;
        self.hasher.update(chunk);
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flush to disk and atomically move the staged file to `destination`
    /// (relative to the archive root), replacing whatever was there.
    #[tracing::instrument(skip_all, fields(destination = %destination.as_ref().display()))]
    pub async fn publish(self, destination: impl AsRef<Path>) -> Result<Published> {
        let Self { archive, mut file, path, hasher, written } = self;
        let destination = destination.as_ref();
        let target = archive.absolute_path(destination)?;

        file.flush().await.map_err(ErrorKind::Io)?;
        file.sync_all().await.map_err(ErrorKind::Io)?;
        drop(file);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| Archive::map_io_error(e, destination))?;
        }
        // `persist` is a plain rename within the same filesystem. On failure
        // the returned `TempPath` is dropped, deleting the staged file.
        path.persist(&target).map_err(|e| Archive::map_io_error(e.error, destination))?;

        let published = Published {
            path: crate::path::validate(destination)?,
            size: written,
            hash: format!("{:x}", hasher.finalize()),
        };
        tracing::debug!(size = published.size, hash = %published.hash, "published");
        Ok(published)
    }
}
