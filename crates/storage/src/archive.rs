//! Local archive access.
//!
//! Every path handed to [`Archive`] is relative to the archive root and is
//! validated before use; nothing can be read or written outside the root.

use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::validate as validate_path;
use crate::stage::Staged;
use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, TryStreamExt};
use md5::{Digest, Md5};
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use time::UtcDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tokio::fs::{self, DirEntry};
use tokio::io::AsyncReadExt;

pub type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Directory (relative to the archive root) that holds in-flight downloads.
pub const SCRATCH_DIR: &str = ".scratch";

const BACKUP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]-[hour][minute][second]");
// "_" + "YYYYMMDD-HHMMSS"
const BACKUP_SUFFIX_LEN: usize = 16;
const HASH_BUFFER: usize = 64 * 1024;

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// The on-disk archive: one directory per show plus archive-wide files.
///
/// # Examples
///
/// ```no_run
/// use podarc_storage::Archive;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let archive = Archive::new("/srv/podcasts/archive")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
}

impl Archive {
    /// Open (creating if needed) the archive at an absolute path.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once at startup; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate a relative path and join it onto the archive root.
    pub fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute
            .strip_prefix(&self.root)
            .or_raise(|| ErrorKind::InvalidPath(absolute.to_path_buf()))?;
        validate_path(relative)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(path, metadata.len(), UtcDateTime::from(modified)))
    }

    pub(crate) fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Per-entry work of the directory walk, pulled out so that `?` can be
    /// used; the stream body can only yield errors.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }

    /// Stream every file under an optional prefix, depth-first, in no
    /// particular order. A prefix that doesn't exist yields nothing.
    pub fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        // Start from the parent of the prefix so that a prefix naming a file,
        // or a directory that doesn't exist yet, isn't an error.
        let start_dir = validated_prefix
            .as_ref()
            .map(|prefix| self.root.join(prefix).parent().unwrap_or(&self.root).to_path_buf())
            .unwrap_or_else(|| self.root.clone());
        let mut stack = vec![start_dir];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    pub async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    pub async fn exists(&self, path: impl AsRef<Path>) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    /// Size of a regular file, or `None` if there is nothing at `path`.
    pub async fn size(&self, path: impl AsRef<Path>) -> Result<Option<u64>> {
        let path = path.as_ref();
        let abs_path = self.absolute_path(path)?;
        match fs::metadata(&abs_path).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::map_io_error(e, path).into()),
        }
    }

    pub async fn read(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    /// Write a whole file, creating parent directories as needed.
    pub async fn write(&self, path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let abs_path = self.absolute_path(path)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        Ok(fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    pub async fn create_dir(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let abs_path = self.absolute_path(path)?;
        Ok(fs::create_dir_all(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    pub async fn delete(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    /// Rename within the archive, replacing any existing destination.
    pub async fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
        let (from, to) = (from.as_ref(), to.as_ref());
        let from_path = self.absolute_path(from)?;
        let to_path = self.absolute_path(to)?;
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, to))?;
        }
        Ok(fs::rename(&from_path, &to_path).await.map_err(|e| Self::map_io_error(e, from))?)
    }

    /// Move an existing file aside to `{stem}_{YYYYMMDD-HHMMSS}{ext}` next to
    /// itself. Returns the backup's path, or `None` if there was nothing to
    /// back up.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn backup(&self, path: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        let path = validate_path(path.as_ref())?;
        if self.size(&path).await?.is_none() {
            return Ok(None);
        }
        let stamp = UtcDateTime::now().format(BACKUP_FORMAT).or_raise(|| ErrorKind::InvalidPath(path.clone()))?;
        let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        let name = match path.extension() {
            Some(ext) => format!("{stem}_{stamp}.{}", ext.to_string_lossy()),
            None => format!("{stem}_{stamp}"),
        };
        let target = path.with_file_name(name);
        self.rename(&path, &target).await?;
        tracing::debug!(backup = %target.display(), "backed up");
        Ok(Some(target))
    }

    /// Remove everything inside a directory, leaving it empty (and creating it
    /// if it didn't exist).
    pub async fn clear_dir(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let abs_path = self.absolute_path(path)?;
        match fs::remove_dir_all(&abs_path).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => exn::bail!(Self::map_io_error(e, path)),
        }
        self.create_dir(path).await
    }

    /// Lowercase hex MD5 of a file's content.
    pub async fn md5(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let abs_path = self.absolute_path(path)?;
        let mut file = fs::File::open(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; HASH_BUFFER];
        loop {
            let read = file.read(&mut buffer).await.map_err(ErrorKind::Io)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Open a uniquely named temporary file in the scratch directory.
    ///
    /// The file is deleted when the returned [`Staged`] is dropped, unless it
    /// is published first.
    pub async fn stage(&self) -> Result<Staged> {
        let scratch = self.absolute_path(SCRATCH_DIR)?;
        fs::create_dir_all(&scratch).await.map_err(|e| Self::map_io_error(e, Path::new(SCRATCH_DIR)))?;
        Staged::create(self.clone(), &scratch)
    }

    /// Whether `path` names a backup written by [`Archive::backup`].
    pub fn is_backup(path: impl AsRef<Path>) -> bool {
        let Some(stem) = path.as_ref().file_stem().and_then(|s| s.to_str()) else {
            return false;
        };
        let Some(suffix) = stem.len().checked_sub(BACKUP_SUFFIX_LEN).and_then(|at| stem.get(at..)) else {
            return false;
        };
        suffix.bytes().enumerate().all(|(i, b)| match i {
            0 => b == b'_',
            9 => b == b'-',
            _ => b.is_ascii_digit(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive() -> (tempfile::TempDir, Archive) {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::new(dir.path()).unwrap();
        (dir, archive)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Archive::new(dir.path()).is_ok());
        assert!(Archive::new("relative/path").is_err());
    }

    #[test]
    fn test_new_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("archive");
        Archive::new(&root).unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_write_read_and_size() {
        let (_dir, archive) = archive();
        assert_eq!(archive.size("Show/episode.mp3").await.unwrap(), None);
        archive.write("Show/episode.mp3", b"audio").await.unwrap();
        assert_eq!(archive.read("Show/episode.mp3").await.unwrap(), b"audio");
        assert_eq!(archive.size("Show/episode.mp3").await.unwrap(), Some(5));
        // Directories are not files.
        assert_eq!(archive.size("Show").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_dir, archive) = archive();
        assert!(archive.read("../etc/passwd").await.is_err());
        assert!(archive.write("Show/../../x", b"data").await.is_err());
        assert!(archive.delete("../../file").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (_dir, archive) = archive();
        let err = archive.delete("missing.txt").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_md5() {
        let (_dir, archive) = archive();
        archive.write("a.txt", b"a").await.unwrap();
        assert_eq!(archive.md5("a.txt").await.unwrap(), "0cc175b9c0f1b6a831c399e269772661");
        archive.write("empty.txt", b"").await.unwrap();
        assert_eq!(archive.md5("empty.txt").await.unwrap(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[tokio::test]
    async fn test_backup_moves_file_aside() {
        let (_dir, archive) = archive();
        assert_eq!(archive.backup("Show/podcast.xml").await.unwrap(), None);

        archive.write("Show/podcast.xml", b"<rss/>").await.unwrap();
        let backup = archive.backup("Show/podcast.xml").await.unwrap().unwrap();
        assert!(!archive.exists("Show/podcast.xml").await.unwrap());
        assert_eq!(archive.read(&backup).await.unwrap(), b"<rss/>");
        assert_eq!(backup.parent(), Some(Path::new("Show")));
        assert_eq!(backup.extension().unwrap(), "xml");
        assert!(Archive::is_backup(&backup));
    }

    #[test]
    fn test_is_backup() {
        assert!(Archive::is_backup("Show/podcast_20240305-100000.xml"));
        assert!(Archive::is_backup("all_mp3s_20240305-100000.txt"));
        assert!(!Archive::is_backup("Show/podcast.xml"));
        assert!(!Archive::is_backup("Show/2024-03-05 10:00:00 - Title.mp3"));
        assert!(!Archive::is_backup("x"));
    }

    #[tokio::test]
    async fn test_clear_dir() {
        let (_dir, archive) = archive();
        archive.write(".scratch/stale.part", b"junk").await.unwrap();
        archive.write(".scratch/nested/stale.part", b"junk").await.unwrap();
        archive.clear_dir(SCRATCH_DIR).await.unwrap();
        assert!(archive.list(Some(Path::new(SCRATCH_DIR))).await.unwrap().is_empty());
        assert!(archive.absolute_path(SCRATCH_DIR).unwrap().is_dir());
        // Clearing a directory that doesn't exist creates it.
        archive.clear_dir("fresh").await.unwrap();
        assert!(archive.absolute_path("fresh").unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let (_dir, archive) = archive();
        archive.write("One/a.mp3", b"1").await.unwrap();
        archive.write("One/b.mp3", b"2").await.unwrap();
        archive.write("Onesie/c.mp3", b"3").await.unwrap();
        archive.write("all_mp3s.txt", b"").await.unwrap();

        assert_eq!(archive.list(None).await.unwrap().len(), 4);
        let mut paths: Vec<_> =
            archive.list(Some(Path::new("One"))).await.unwrap().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("One/a.mp3"), PathBuf::from("One/b.mp3")]);
        assert!(archive.list(Some(Path::new("Missing"))).await.unwrap().is_empty());
    }
}
