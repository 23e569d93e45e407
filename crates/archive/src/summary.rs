//! Per-show manifests and the archive-wide listing.
//!
//! `{show}/summary.json` is what the sync side reads to map feed entries to
//! local files; `all_mp3s.txt` is only for humans. Both are backed up before
//! being overwritten.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use podarc_storage::Archive;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::instrument;

pub const MANIFEST_FILENAME: &str = "summary.json";
pub const LISTING_FILENAME: &str = "all_mp3s.txt";

/// One resolved episode of a show, as recorded in its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    /// Normalized identity.
    pub guid: String,
    pub local_filename: String,
    pub podcast_name: String,
    /// Length declared by the feed, `-1` if it didn't say.
    pub reported_length: i64,
    /// Size on disk after the run, `-1` if there is no file.
    pub actual_length: i64,
    /// Where the episode still has to be fetched from; empty if nothing is pending.
    #[serde(skip)]
    pub remote_url: String,
}

impl FileSummary {
    pub fn has_file(&self) -> bool {
        self.actual_length >= 0
    }
}

pub fn manifest_path(show: &str) -> PathBuf {
    Path::new(show).join(MANIFEST_FILENAME)
}

/// Replace a show's manifest, keeping the previous one as a backup.
#[instrument(skip(archive, summaries), fields(entries = summaries.len()))]
pub async fn write_manifest(archive: &Archive, show: &str, summaries: &[FileSummary]) -> Result<PathBuf> {
    let path = manifest_path(show);
    let json = serde_json::to_vec_pretty(summaries).or_raise(|| ErrorKind::Manifest(show.to_string()))?;
    archive.backup(&path).await.or_raise(|| ErrorKind::Storage)?;
    archive.write(&path, &json).await.or_raise(|| ErrorKind::Storage)?;
    tracing::info!(path = %path.display(), "wrote manifest");
    Ok(path)
}

/// A show's manifest, or `None` if it has never been archived.
pub async fn read_manifest(archive: &Archive, show: &str) -> Result<Option<Vec<FileSummary>>> {
    let path = manifest_path(show);
    if archive.size(&path).await.or_raise(|| ErrorKind::Storage)?.is_none() {
        return Ok(None);
    }
    let json = archive.read(&path).await.or_raise(|| ErrorKind::Storage)?;
    let summaries = serde_json::from_slice(&json).or_raise(|| ErrorKind::Manifest(show.to_string()))?;
    Ok(Some(summaries))
}

/// Regenerate `all_mp3s.txt`: a `# {show}` header followed by one filename
/// per line, for every show in the order given.
#[instrument(skip_all, fields(shows = shows.len()))]
pub async fn write_listing(archive: &Archive, shows: &[(String, Vec<String>)]) -> Result<PathBuf> {
    let mut text = String::new();
    for (show, filenames) in shows {
        // Infallible: writing to a String.
        let _ = writeln!(text, "# {show}");
        for filename in filenames {
            let _ = writeln!(text, "{filename}");
        }
        text.push('\n');
    }
    let path = PathBuf::from(LISTING_FILENAME);
    archive.backup(&path).await.or_raise(|| ErrorKind::Storage)?;
    archive.write(&path, text.as_bytes()).await.or_raise(|| ErrorKind::Storage)?;
    Ok(path)
}
