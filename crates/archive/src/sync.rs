//! Mirroring an archived show to the remote store.
//!
//! Every content file of the show is probed on the remote: the storage
//! front-end answers with a redirect to where the object really lives, and
//! that location answers `404` (missing) or `200` with an ETag that is the
//! object's MD5. Missing or different files are handed to the [`Uploader`].
//! Before probing, the feed snapshot is rewritten into `podcast.rss` so that
//! it points at the mirrored episodes.

use crate::Context;
use crate::error::{ErrorKind, Result};
use crate::show::{FEED_FILENAME, cover_url, url_extension};
use crate::summary::{FileSummary, read_manifest};
use crate::upload::Uploader;
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use podarc_config::Podcast;
use podarc_feed::{Identity, RemoteEnclosure, Rewrite, parse_feed, rewrite_feed};
use podarc_storage::Archive;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::instrument;
use url::Url;

/// The rewritten feed, published next to the episodes.
pub const RSS_FILENAME: &str = "podcast.rss";

const EXCLUDED_EXTENSIONS: &[&str] = &["xml", "csv", "sh", "json"];
const EXCLUDED_NAMES: &[&str] = &[".DS_Store", RSS_FILENAME];

/// Where mirrored items are served from and probed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    /// Public download front-end, e.g. `https://archive.org/download`.
    pub download_base: String,
    /// Front-end used for probing, e.g. `https://s3.us.archive.org`.
    pub probe_base: String,
}

impl Mirror {
    pub fn new(download_base: impl Into<String>, probe_base: impl Into<String>) -> Self {
        Self { download_base: download_base.into(), probe_base: probe_base.into() }
    }

    /// ```
    /// use podarc_archive::Mirror;
    /// let mirror = Mirror::new("https://archive.org/download/", "https://s3.us.archive.org");
    /// assert_eq!(
    ///     mirror.download_url("item", "2024-01-01 08:00:00 - Title (x).mp3"),
    ///     "https://archive.org/download/item/2024-01-01%2008%3A00%3A00%20-%20Title%20%28x%29.mp3"
    /// );
    /// ```
    pub fn download_url(&self, identifier: &str, filename: &str) -> String {
        Self::join(&self.download_base, identifier, filename)
    }

    pub fn probe_url(&self, identifier: &str, filename: &str) -> String {
        Self::join(&self.probe_base, identifier, filename)
    }

    fn join(base: &str, identifier: &str, filename: &str) -> String {
        format!("{}/{identifier}/{}", base.trim_end_matches('/'), urlencoding::encode(filename))
    }
}

/// What one show's sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub show: String,
    /// Items rewritten to point at the mirror.
    pub rewritten: usize,
    pub probed: usize,
    /// Files that could not be probed; they are not uploaded.
    pub unresolved: usize,
    /// Files handed to the uploader: content files sorted by path, then
    /// `podcast.rss` last.
    pub pending: Vec<PathBuf>,
    pub uploaded: usize,
    pub failed: usize,
}

/// Rewrite a show's feed for the mirror, then upload whatever the mirror is
/// missing or holds a different copy of.
///
/// Fails if the show has no remote identifier or no manifest; everything
/// per-file is logged and counted instead.
#[instrument(skip_all, fields(show = %podcast.name))]
pub async fn sync_show(ctx: &Context, mirror: &Mirror, uploader: &dyn Uploader, podcast: &Podcast) -> Result<SyncReport> {
    let show = podcast.name.as_str();
    let identifier = podcast.ia_identifier.trim();
    if identifier.is_empty() {
        exn::bail!(ErrorKind::NotConfigured(show.to_string()));
    }
    let manifest = read_manifest(&ctx.archive, show).await?.ok_or_raise(|| ErrorKind::Manifest(show.to_string()))?;
    let mut report = SyncReport { show: show.to_string(), ..SyncReport::default() };

    report.rewritten = write_rss(ctx, mirror, identifier, show, &manifest).await?;

    let mut files = content_files(&ctx.archive, show).await?;
    files.sort();
    // Reconciled on its own, after the content it points at.
    files.push(Path::new(show).join(RSS_FILENAME));

    let concurrency = ctx.concurrency();
    let probes: Vec<_> = futures::stream::iter(files)
        .map(|path| async move {
            let result = needs_upload(ctx, mirror, identifier, &path).await;
            (path, result)
        })
        .buffered(concurrency)
        .collect()
        .await;

    for (path, result) in probes {
        report.probed += 1;
        match result {
            Ok(true) => report.pending.push(path),
            Ok(false) => tracing::debug!(path = %path.display(), "remote copy is current"),
            Err(error) => {
                tracing::warn!(path = %path.display(), ?error, "could not probe remote copy");
                report.unresolved += 1;
            },
        }
    }

    tracing::info!(pending = report.pending.len(), "files to upload");
    if report.pending.is_empty() {
        return Ok(report);
    }
    for path in &report.pending {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        tracing::info!("{} -> {}", path.display(), mirror.download_url(identifier, &name));
    }

    let uploads: Vec<_> = futures::stream::iter(report.pending.clone())
        .map(|path| async move {
            let result = upload(ctx, uploader, identifier, &path).await;
            (path, result)
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;
    for (path, result) in uploads {
        match result {
            Ok(()) => {
                tracing::info!(path = %path.display(), "uploaded");
                report.uploaded += 1;
            },
            Err(error) => {
                tracing::error!(path = %path.display(), ?error, "upload failed");
                report.failed += 1;
            },
        }
    }
    Ok(report)
}

/// Write `{show}/podcast.rss` from the feed snapshot. Returns the number of
/// items now pointing at the mirror.
async fn write_rss(ctx: &Context, mirror: &Mirror, identifier: &str, show: &str, manifest: &[FileSummary]) -> Result<usize> {
    let snapshot = ctx.archive.read(Path::new(show).join(FEED_FILENAME)).await.or_raise(|| ErrorKind::Storage)?;
    let feed = parse_feed(&snapshot).or_raise(|| ErrorKind::Feed)?;

    let mut enclosures = HashMap::with_capacity(manifest.len());
    for summary in manifest {
        if !summary.has_file() {
            tracing::warn!(guid = %summary.guid, filename = %summary.local_filename, "episode has no local file; leaving it out of the mirror feed");
            continue;
        }
        let Ok(identity) = Identity::normalize(&summary.guid, &summary.local_filename) else {
            tracing::warn!(guid = %summary.guid, "manifest entry has an unusable guid");
            continue;
        };
        let url = mirror.download_url(identifier, &summary.local_filename);
        enclosures.insert(identity, RemoteEnclosure { url, length: summary.actual_length });
    }

    let cover = match cover_url(&feed) {
        Some(url) => {
            let name = format!("cover{}", url_extension(&url));
            let present = ctx.archive.exists(Path::new(show).join(&name)).await.or_raise(|| ErrorKind::Storage)?;
            present.then(|| mirror.download_url(identifier, &name))
        },
        None => None,
    };
    let feed_url = mirror.download_url(identifier, RSS_FILENAME);
    let rewrite = Rewrite { feed_url: &feed_url, cover_url: cover.as_deref(), enclosures: &enclosures };
    let (rss, outcome) = rewrite_feed(&snapshot, &rewrite).or_raise(|| ErrorKind::Feed)?;
    for skipped in &outcome.skipped {
        tracing::warn!(item = %skipped, "item not in manifest; left pointing at its origin");
    }

    ctx.archive.write(Path::new(show).join(RSS_FILENAME), &rss).await.or_raise(|| ErrorKind::Storage)?;
    Ok(outcome.rewritten)
}

/// Top-level files of the show that belong on the mirror.
async fn content_files(archive: &Archive, show: &str) -> Result<Vec<PathBuf>> {
    let dir = Path::new(show);
    let files = archive.list(Some(dir)).await.or_raise(|| ErrorKind::Storage)?;
    Ok(files.into_iter().map(|f| f.path).filter(|p| p.parent() == Some(dir) && is_content(p)).collect())
}

fn is_content(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).unwrap_or_default();
    !EXCLUDED_NAMES.contains(&name) && !EXCLUDED_EXTENSIONS.contains(&extension.as_str()) && !Archive::is_backup(path)
}

/// Follow the front-end's redirect once and decide from the final answer.
#[instrument(skip(ctx, mirror, identifier))]
async fn needs_upload(ctx: &Context, mirror: &Mirror, identifier: &str, path: &Path) -> Result<bool> {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let url = mirror.probe_url(identifier, &name);
    let first = ctx.remote.get(&url).await.or_raise(|| ErrorKind::Request(url.clone()))?;
    let (url, response) = match first.location.clone().filter(|_| first.is_redirect()) {
        Some(location) => {
            let target = Url::parse(&url).and_then(|base| base.join(&location)).or_raise(|| ErrorKind::Request(url.clone()))?;
            let target = target.to_string();
            let response = ctx.remote.get(&target).await.or_raise(|| ErrorKind::Request(target.clone()))?;
            (target, response)
        },
        None => (url, first),
    };

    match response.status {
        404 => Ok(true),
        200 => match response.etag_unquoted() {
            Some(etag) => {
                let hash = ctx.archive.md5(path).await.or_raise(|| ErrorKind::Storage)?;
                Ok(!etag.eq_ignore_ascii_case(&hash))
            },
            None => {
                tracing::warn!(%url, "remote copy has no ETag; not uploading");
                Ok(false)
            },
        },
        status => exn::bail!(ErrorKind::Status { url, status }),
    }
}

async fn upload(ctx: &Context, uploader: &dyn Uploader, identifier: &str, path: &Path) -> Result<()> {
    let absolute = ctx.archive.absolute_path(path).or_raise(|| ErrorKind::Storage)?;
    uploader.upload(identifier, &absolute).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::write_manifest;
    use crate::testing::{Harness, RecordingUploader, feed, item, md5_hex};
    use podarc_storage::remote::MockRoute;
    use rstest::rstest;

    const ITEM: &str = "show-mirror";
    const ONE: &str = "00000000-0000-0000-0000-000000000001";
    const TWO: &str = "00000000-0000-0000-0000-000000000002";

    fn mirror() -> Mirror {
        Mirror::new("https://archive.example.org/download", "https://s3.example.org")
    }

    fn podcast() -> Podcast {
        Podcast { ia_identifier: ITEM.to_string(), ..Podcast::new("Show") }
    }

    fn probe(name: &str) -> String {
        mirror().probe_url(ITEM, name)
    }

    fn storage(name: &str) -> String {
        format!("https://ia800.example.org/0/items/{ITEM}/{name}")
    }

    fn summary(guid: &str, filename: &str, actual: i64) -> FileSummary {
        FileSummary {
            guid: guid.to_string(),
            local_filename: filename.to_string(),
            podcast_name: "Show".to_string(),
            reported_length: 3,
            actual_length: actual,
            remote_url: String::new(),
        }
    }

    /// A show with two downloaded episodes and cover art, plus files that
    /// never go to the mirror.
    async fn archived(harness: &Harness) {
        let archive = &harness.ctx.archive;
        let xml = feed(&[
            item(TWO, "Two", "Tue, 02 Jan 2024 08:00:00 +0000", "https://cdn.example.com/two.mp3", Some(3)),
            item(ONE, "One", "Mon, 01 Jan 2024 08:00:00 +0000", "https://cdn.example.com/one.mp3", Some(3)),
        ]);
        archive.write("Show/podcast.xml", xml.as_bytes()).await.unwrap();
        archive.write("Show/podcast_20240101-000000.xml", b"old snapshot").await.unwrap();
        archive.write("Show/one.mp3", b"one").await.unwrap();
        archive.write("Show/two.mp3", b"two").await.unwrap();
        archive.write("Show/cover.jpg", b"art").await.unwrap();
        archive.write("Show/.DS_Store", b"").await.unwrap();
        archive.write("Show/upload.sh", b"").await.unwrap();
        write_manifest(archive, "Show", &[summary(ONE, "one.mp3", 3), summary(TWO, "two.mp3", 3)]).await.unwrap();
    }

    async fn redirect(harness: &Harness, name: &str, target: MockRoute) {
        harness.remote.set_route(probe(name), MockRoute::redirect(storage(name))).await;
        harness.remote.set_route(storage(name), target).await;
    }

    #[tokio::test]
    async fn test_uploads_missing_and_changed_files() {
        let harness = Harness::new().await;
        archived(&harness).await;
        redirect(&harness, "one.mp3", MockRoute::status(404)).await;
        redirect(&harness, "two.mp3", MockRoute::ok("").with_etag(format!("\"{}\"", md5_hex(b"two")))).await;
        redirect(&harness, "cover.jpg", MockRoute::ok("").with_etag("\"ffffffffffffffffffffffffffffffff\"")).await;
        // No route: the probe front-end answers 404 directly.
        let uploader = RecordingUploader::default();

        let report = sync_show(&harness.ctx, &mirror(), &uploader, &podcast()).await.unwrap();
        assert_eq!(report.probed, 4);
        let expected: Vec<PathBuf> = ["Show/cover.jpg", "Show/one.mp3", "Show/podcast.rss"].map(PathBuf::from).into();
        assert_eq!(report.pending, expected);
        assert_eq!(report.uploaded, 3);
        assert_eq!(report.failed, 0);

        let mut uploads = uploader.uploads();
        uploads.sort();
        let root = harness.ctx.archive.root();
        assert_eq!(
            uploads,
            [
                (ITEM.to_string(), root.join("Show/cover.jpg")),
                (ITEM.to_string(), root.join("Show/one.mp3")),
                (ITEM.to_string(), root.join("Show/podcast.rss")),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_content_files_are_never_probed() {
        let harness = Harness::new().await;
        archived(&harness).await;
        let uploader = RecordingUploader::default();

        sync_show(&harness.ctx, &mirror(), &uploader, &podcast()).await.unwrap();
        let probed = harness.remote.requests().await;
        for name in ["podcast.xml", "podcast_20240101-000000.xml", "summary.json", ".DS_Store", "upload.sh"] {
            assert!(!probed.contains(&probe(name)), "{name} was probed");
        }
        assert!(probed.contains(&probe("podcast.rss")));
    }

    #[tokio::test]
    async fn test_rss_points_at_mirror() {
        let harness = Harness::new().await;
        archived(&harness).await;

        let report = sync_show(&harness.ctx, &mirror(), &RecordingUploader::default(), &podcast()).await.unwrap();
        assert_eq!(report.rewritten, 2);
        let rss = String::from_utf8(harness.ctx.archive.read("Show/podcast.rss").await.unwrap()).unwrap();
        assert!(rss.contains(&format!("https://archive.example.org/download/{ITEM}/podcast.rss")));
        assert!(rss.contains(&format!("https://archive.example.org/download/{ITEM}/cover.jpg")));
        assert!(rss.contains(&format!("https://archive.example.org/download/{ITEM}/one.mp3")));
        assert!(!rss.contains("cdn.example.com"));
    }

    #[tokio::test]
    async fn test_episode_without_file_is_left_alone() {
        let harness = Harness::new().await;
        archived(&harness).await;
        write_manifest(&harness.ctx.archive, "Show", &[summary(ONE, "one.mp3", 3), summary(TWO, "two.mp3", -1)])
            .await
            .unwrap();

        let report = sync_show(&harness.ctx, &mirror(), &RecordingUploader::default(), &podcast()).await.unwrap();
        assert_eq!(report.rewritten, 1);
        let rss = String::from_utf8(harness.ctx.archive.read("Show/podcast.rss").await.unwrap()).unwrap();
        assert!(rss.contains("https://cdn.example.com/two.mp3"));
    }

    #[rstest]
    #[case::no_etag(MockRoute::ok(""))]
    #[case::server_error(MockRoute::status(500))]
    #[tokio::test]
    async fn test_inconclusive_probe_does_not_upload(#[case] target: MockRoute) {
        let harness = Harness::new().await;
        archived(&harness).await;
        redirect(&harness, "one.mp3", target).await;
        let uploader = RecordingUploader::default();

        let report = sync_show(&harness.ctx, &mirror(), &uploader, &podcast()).await.unwrap();
        assert!(!report.pending.contains(&PathBuf::from("Show/one.mp3")));
        assert!(uploader.uploads().iter().all(|(_, path)| !path.ends_with("one.mp3")));
    }

    #[tokio::test]
    async fn test_upload_failures_are_counted() {
        let harness = Harness::new().await;
        archived(&harness).await;
        let uploader = RecordingUploader::failing(["two.mp3"]);

        let report = sync_show(&harness.ctx, &mirror(), &uploader, &podcast()).await.unwrap();
        // Nothing is on the mirror yet.
        assert_eq!(report.pending.len(), 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.uploaded, 3);
    }

    #[tokio::test]
    async fn test_relative_redirect() {
        let harness = Harness::new().await;
        archived(&harness).await;
        let relative = format!("/0/items/{ITEM}/one.mp3");
        harness.remote.set_route(probe("one.mp3"), MockRoute::redirect(relative)).await;
        let absolute = format!("https://s3.example.org/0/items/{ITEM}/one.mp3");
        harness.remote.set_route(&absolute, MockRoute::ok("").with_etag(format!("\"{}\"", md5_hex(b"one")))).await;

        let report = sync_show(&harness.ctx, &mirror(), &RecordingUploader::default(), &podcast()).await.unwrap();
        assert!(!report.pending.contains(&PathBuf::from("Show/one.mp3")));
        assert_eq!(harness.remote.request_count(&absolute).await, 1);
    }

    #[tokio::test]
    async fn test_requires_identifier() {
        let harness = Harness::new().await;
        archived(&harness).await;
        let podcast = Podcast::new("Show");
        let err = sync_show(&harness.ctx, &mirror(), &RecordingUploader::default(), &podcast).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NotConfigured("Show".to_string()));
    }

    #[tokio::test]
    async fn test_requires_manifest() {
        let harness = Harness::new().await;
        let err = sync_show(&harness.ctx, &mirror(), &RecordingUploader::default(), &podcast()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Manifest("Show".to_string()));
    }

    #[rstest]
    #[case("Show/2024-01-01 08:00:00 - Title (x).mp3", true)]
    #[case("Show/cover.jpg", true)]
    #[case("Show/cover_original.png", true)]
    #[case("Show/podcast.xml", false)]
    #[case("Show/podcast.rss", false)]
    #[case("Show/summary.json", false)]
    #[case("Show/summary_20240101-101010.json", false)]
    #[case("Show/upload.csv", false)]
    #[case("Show/upload.sh", false)]
    #[case("Show/.DS_Store", false)]
    #[case("Show/cover_20240101-101010.jpg", false)]
    fn test_is_content(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_content(Path::new(path)), expected);
    }
}
