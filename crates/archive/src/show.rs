//! The per-show archive pipeline.

use crate::Context;
use crate::error::{ErrorKind, Result};
use crate::fetch::{FetchEvent, FetchJob, FetchOutcome, fetch_all, persist_record, publish_body};
use crate::reconcile::{Decision, decide};
use crate::summary::{FileSummary, write_manifest};
use exn::ResultExt;
use futures::StreamExt;
use podarc_config::Podcast;
use podarc_feed::models::Feed;
use podarc_feed::{Resolved, Resolver, parse_feed};
use std::collections::HashSet;
use std::path::Path;
use std::pin::pin;
use time::UtcDateTime;
use tracing::instrument;
use url::Url;

/// Raw snapshot of the show's feed, as last fetched.
pub const FEED_FILENAME: &str = "podcast.xml";

/// What one show's archive pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowReport {
    pub show: String,
    /// Resolved filenames, oldest episode first.
    pub filenames: Vec<String>,
    /// Entries that could not be resolved.
    pub skipped: usize,
    pub downloaded: usize,
    pub failed: usize,
}

/// Archive one show: refresh its feed, fetch cover art, bring every episode
/// up to date and write its manifest.
///
/// Returns `None` if the feed could not be fetched; the show is left as it
/// was. Per-episode problems are logged and counted, never returned. An error
/// means the show could not be processed at all, or that the ledger's
/// bookkeeping is broken ([`ErrorKind::InvariantViolation`]).
#[instrument(skip_all, fields(show = %podcast.name))]
pub async fn archive_show(ctx: &Context, resolver: &Resolver, podcast: &Podcast) -> Result<Option<ShowReport>> {
    let show = podcast.name.as_str();
    let run_started = UtcDateTime::now();

    let bytes = match fetch_feed(ctx, &podcast.url).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(url = %podcast.url, ?error, "could not refresh feed; skipping show");
            return Ok(None);
        },
    };
    let snapshot = Path::new(show).join(FEED_FILENAME);
    ctx.archive.backup(&snapshot).await.or_raise(|| ErrorKind::Storage)?;
    ctx.archive.write(&snapshot, &bytes).await.or_raise(|| ErrorKind::Storage)?;
    let feed = parse_feed(&bytes).or_raise(|| ErrorKind::Feed)?;

    fetch_covers(ctx, show, &feed).await;

    let mut report = ShowReport { show: show.to_string(), ..ShowReport::default() };
    let mut summaries = Vec::new();
    let mut jobs = Vec::new();
    let mut queued = HashSet::new();
    let tolerate = resolver.table().tolerates_length_mismatch(show);

    for entry in feed.chronological() {
        let Resolved { descriptor, filename } = match resolver.resolve(show, entry) {
            Ok(resolved) => resolved,
            Err(error) if error.is_entry_scoped() => {
                tracing::warn!(guid = entry.guid.as_deref(), title = entry.title.as_deref(), %error, "skipping entry");
                report.skipped += 1;
                continue;
            },
            Err(error) => return Err(error.raise(ErrorKind::Feed)),
        };
        let identity = descriptor.identity.as_str();
        let path = Path::new(show).join(&filename);

        let mut record = ctx.ledger.get_or_create(show, identity, &filename).await.or_raise(|| ErrorKind::Ledger)?;
        let local_size = ctx.archive.size(&path).await.or_raise(|| ErrorKind::Storage)?;
        let decision = decide(local_size, descriptor.declared_length, tolerate);
        tracing::debug!(identity, %filename, %decision, "reconciled");

        if let (Decision::SkipUpToDate, Some(size)) = (decision, local_size)
            && record.size < 0
        {
            record.size = i64::try_from(size).unwrap_or(i64::MAX);
            persist_record(ctx, &record).await?;
        }

        let remote_url = match decision {
            Decision::NeedsDownload => descriptor.enclosure_url.clone(),
            _ => String::new(),
        };
        // The same file listed twice in one feed is only fetched once.
        if !remote_url.is_empty() && queued.insert(path.clone()) {
            jobs.push(FetchJob {
                show: show.to_string(),
                identity: identity.to_string(),
                filename: filename.clone(),
                url: remote_url.clone(),
                declared_length: descriptor.declared_length,
            });
        }
        summaries.push(FileSummary {
            guid: identity.to_string(),
            local_filename: filename,
            podcast_name: show.to_string(),
            reported_length: descriptor.declared_length,
            actual_length: -1,
            remote_url,
        });
    }

    let mut events = pin!(fetch_all(ctx, jobs, run_started));
    while let Some(event) = events.next().await {
        match event {
            FetchEvent::Started(0) | FetchEvent::Complete => {},
            FetchEvent::Started(count) => tracing::info!(episodes = count, "fetching"),
            FetchEvent::Fetched(_, FetchOutcome::Downloaded(_)) => report.downloaded += 1,
            FetchEvent::Fetched(..) => {},
            FetchEvent::Failed(job, error) if *error == ErrorKind::InvariantViolation => {
                tracing::error!(identity = %job.identity, ?error, "ledger bookkeeping is broken; abandoning show");
                return Err(error);
            },
            FetchEvent::Failed(job, error) => {
                tracing::warn!(identity = %job.identity, url = %job.url, ?error, "fetch failed");
                report.failed += 1;
            },
        }
    }

    for summary in &mut summaries {
        let path = Path::new(show).join(&summary.local_filename);
        let size = ctx.archive.size(&path).await.or_raise(|| ErrorKind::Storage)?;
        summary.actual_length = size.and_then(|s| i64::try_from(s).ok()).unwrap_or(-1);
    }
    write_manifest(&ctx.archive, show, &summaries).await?;

    report.filenames = summaries.into_iter().map(|s| s.local_filename).collect();
    tracing::info!(
        episodes = report.filenames.len(),
        downloaded = report.downloaded,
        failed = report.failed,
        skipped = report.skipped,
        "show archived"
    );
    Ok(Some(report))
}

async fn fetch_feed(ctx: &Context, url: &str) -> Result<Vec<u8>> {
    let response = ctx.remote.get(url).await.or_raise(|| ErrorKind::Request(url.to_string()))?;
    if !response.is_success() {
        exn::bail!(ErrorKind::Status { url: url.to_string(), status: response.status });
    }
    response.bytes().await.or_raise(|| ErrorKind::Request(url.to_string()))
}

/// Extension of the last segment of a URL path, with its dot, or empty.
pub(crate) fn url_extension(url: &Url) -> String {
    let last = url.path().rsplit('/').next().unwrap_or_default();
    match last.rfind('.') {
        Some(idx) if idx + 1 < last.len() => last[idx..].to_string(),
        _ => String::new(),
    }
}

/// The channel artwork URL, preferring the RSS `<image>` over iTunes'.
pub(crate) fn cover_url(feed: &Feed) -> Option<Url> {
    feed.image_url.as_deref().or(feed.itunes_image.as_deref()).and_then(|url| Url::parse(url.trim()).ok())
}

/// `cover{ext}`, and `cover_original{ext}` without the query string if the
/// URL has one (hosts use it to serve resized copies). Only fetched when
/// missing; failures are logged.
async fn fetch_covers(ctx: &Context, show: &str, feed: &Feed) {
    let Some(url) = cover_url(feed) else {
        tracing::debug!("feed has no cover art");
        return;
    };
    let ext = url_extension(&url);
    let mut covers = vec![(url.clone(), Path::new(show).join(format!("cover{ext}")))];
    if url.query().is_some() {
        let mut original = url;
        original.set_query(None);
        covers.push((original, Path::new(show).join(format!("cover_original{ext}"))));
    }
    for (url, path) in covers {
        match fetch_if_missing(ctx, &url, &path).await {
            Ok(true) => tracing::info!(path = %path.display(), "fetched cover art"),
            Ok(false) => {},
            Err(error) => tracing::warn!(%url, ?error, "could not fetch cover art"),
        }
    }
}

async fn fetch_if_missing(ctx: &Context, url: &Url, path: &Path) -> Result<bool> {
    if ctx.archive.exists(path).await.or_raise(|| ErrorKind::Storage)? {
        return Ok(false);
    }
    let response = ctx.remote.get(url.as_str()).await.or_raise(|| ErrorKind::Request(url.to_string()))?;
    if !response.is_success() {
        exn::bail!(ErrorKind::Status { url: url.to_string(), status: response.status });
    }
    publish_body(ctx, response, url.as_str(), path).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_manifest;
    use crate::testing::{Harness, feed, item, md5_hex};
    use podarc_config::ShowTable;
    use podarc_feed::FilenameGenerator;
    use podarc_storage::Archive;
    use podarc_storage::remote::MockRoute;
    use rstest::rstest;
    use std::sync::Arc;
    use time::Duration;

    const FEED_URL: &str = "https://feeds.example.com/show.rss";
    const NEW: &str = "00000000-0000-0000-0000-000000000001";
    const UNCHANGED: &str = "00000000-0000-0000-0000-000000000002";
    const CHANGED: &str = "00000000-0000-0000-0000-000000000003";

    fn resolver(table: ShowTable) -> Resolver {
        Resolver::new(Arc::new(table), FilenameGenerator::default())
    }

    fn podcast() -> Podcast {
        Podcast { url: FEED_URL.to_string(), ..Podcast::new("Show") }
    }

    fn url(identity: &str) -> String {
        format!("https://cdn.example.com/{identity}.mp3")
    }

    fn three_episodes() -> String {
        feed(&[
            item(NEW, "Third", "Wed, 03 Jan 2024 08:00:00 +0000", &url(NEW), Some(3)),
            item(CHANGED, "Second", "Tue, 02 Jan 2024 08:00:00 +0000", &url(CHANGED), Some(8)),
            item(UNCHANGED, "First", "Mon, 01 Jan 2024 08:00:00 +0000", &url(UNCHANGED), Some(5)),
        ])
    }

    /// Filename each identity resolves to within `xml`.
    fn filenames(resolver: &Resolver, xml: &str) -> Vec<(String, String)> {
        let parsed = parse_feed(xml.as_bytes()).unwrap();
        parsed
            .chronological()
            .map(|entry| resolver.resolve("Show", entry).unwrap())
            .map(|r| (r.descriptor.identity.as_str().to_string(), r.filename))
            .collect()
    }

    fn filename_of<'a>(names: &'a [(String, String)], identity: &str) -> &'a str {
        names.iter().find(|(id, _)| id == identity).map(|(_, name)| name.as_str()).unwrap()
    }

    /// One new episode, one already downloaded, one whose declared length
    /// moved on since it was downloaded.
    async fn seeded(harness: &Harness, resolver: &Resolver) -> Vec<(String, String)> {
        let xml = three_episodes();
        let names = filenames(resolver, &xml);
        harness.remote.set_route(FEED_URL, MockRoute::ok(xml)).await;
        harness.remote.set_route(url(NEW), MockRoute::ok("new")).await;
        harness.remote.set_route(url(UNCHANGED), MockRoute::ok("same!")).await;
        harness.remote.set_route(url(CHANGED), MockRoute::ok("extended")).await;

        let yesterday = UtcDateTime::now() - Duration::days(1);
        for (identity, content) in [(UNCHANGED, "same!"), (CHANGED, "old")] {
            let name = filename_of(&names, identity);
            harness.ctx.archive.write(Path::new("Show").join(name), content.as_bytes()).await.unwrap();
            let mut record = harness.record("Show", identity, name).await;
            record.downloaded(name, content.len() as u64, md5_hex(content.as_bytes()), yesterday);
            harness.ctx.ledger.update(&record).await.unwrap();
        }
        names
    }

    #[tokio::test]
    async fn test_three_episode_run() {
        let harness = Harness::new().await;
        let resolver = resolver(ShowTable::default());
        let names = seeded(&harness, &resolver).await;
        let before = harness.ctx.ledger.get("Show", CHANGED).await.unwrap().unwrap();

        let report = archive_show(&harness.ctx, &resolver, &podcast()).await.unwrap().unwrap();
        assert_eq!(report.downloaded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.skipped, 0);

        assert_eq!(harness.ctx.ledger.count().await.unwrap(), 3);
        let manifest = read_manifest(&harness.ctx.archive, "Show").await.unwrap().unwrap();
        assert_eq!(manifest.len(), 3);
        assert!(manifest.iter().all(|s| s.actual_length == s.reported_length));

        let after = harness.ctx.ledger.get("Show", CHANGED).await.unwrap().unwrap();
        assert_ne!(after.hash, before.hash);
        assert_eq!(after.hash, md5_hex(b"extended"));
        assert_eq!(harness.remote.request_count(&url(UNCHANGED)).await, 0);

        let changed = Path::new("Show").join(filename_of(&names, CHANGED));
        assert_eq!(harness.ctx.archive.read(changed).await.unwrap(), b"extended");
        assert!(harness.scratch_is_empty().await);
    }

    #[tokio::test]
    async fn test_manifest_and_report_are_oldest_first() {
        let harness = Harness::new().await;
        let resolver = resolver(ShowTable::default());
        seeded(&harness, &resolver).await;

        let report = archive_show(&harness.ctx, &resolver, &podcast()).await.unwrap().unwrap();
        let manifest = read_manifest(&harness.ctx.archive, "Show").await.unwrap().unwrap();
        let guids: Vec<_> = manifest.iter().map(|s| s.guid.as_str()).collect();
        assert_eq!(guids, [UNCHANGED, CHANGED, NEW]);
        assert!(report.filenames[0].contains("First"));
        assert!(report.filenames[2].contains("Third"));
    }

    #[tokio::test]
    async fn test_second_run_downloads_nothing() {
        let harness = Harness::new().await;
        let resolver = resolver(ShowTable::default());
        seeded(&harness, &resolver).await;

        archive_show(&harness.ctx, &resolver, &podcast()).await.unwrap();
        let report = archive_show(&harness.ctx, &resolver, &podcast()).await.unwrap().unwrap();
        assert_eq!(report.downloaded, 0);
        assert_eq!(harness.remote.request_count(&url(NEW)).await, 1);
        assert_eq!(harness.ctx.ledger.count().await.unwrap(), 3);

        // The first snapshot was backed up rather than overwritten.
        let files = harness.ctx.archive.list(Some(Path::new("Show"))).await.unwrap();
        let snapshots = files.iter().filter(|f| f.path.extension().is_some_and(|e| e == "xml"));
        assert_eq!(snapshots.filter(|f| Archive::is_backup(&f.path)).count(), 1);
    }

    #[tokio::test]
    async fn test_tolerated_length_mismatch_is_not_fetched() {
        let harness = Harness::new().await;
        let table = ShowTable::from_toml("[shows.\"Show\"]\ntolerate_length_mismatch = true\n").unwrap();
        let resolver = resolver(table);
        seeded(&harness, &resolver).await;

        let report = archive_show(&harness.ctx, &resolver, &podcast()).await.unwrap().unwrap();
        assert_eq!(report.downloaded, 1);
        assert_eq!(harness.remote.request_count(&url(CHANGED)).await, 0);
        let manifest = read_manifest(&harness.ctx.archive, "Show").await.unwrap().unwrap();
        let changed = manifest.iter().find(|s| s.guid == CHANGED).unwrap();
        assert_eq!((changed.reported_length, changed.actual_length), (8, 3));
    }

    #[rstest]
    #[case(MockRoute::status(404))]
    #[case(MockRoute::status(503))]
    #[tokio::test]
    async fn test_unavailable_feed_skips_show(#[case] route: MockRoute) {
        let harness = Harness::new().await;
        harness.remote.set_route(FEED_URL, route).await;

        let report = archive_show(&harness.ctx, &resolver(ShowTable::default()), &podcast()).await.unwrap();
        assert_eq!(report, None);
        assert!(harness.ctx.archive.list(Some(Path::new("Show"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_feed_is_an_error() {
        let harness = Harness::new().await;
        harness.remote.set_route(FEED_URL, MockRoute::ok("this is not a feed")).await;

        let err = archive_show(&harness.ctx, &resolver(ShowTable::default()), &podcast()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Feed);
    }

    #[tokio::test]
    async fn test_bad_entries_are_skipped() {
        let harness = Harness::new().await;
        let xml = feed(&[
            item("not-a-number", "Bad identity", "Mon, 01 Jan 2024 08:00:00 +0000", &url(NEW), Some(3)),
            item(NEW, "Good", "Mon, 01 Jan 2024 08:00:00 +0000", &url(NEW), Some(3)),
            item(UNCHANGED, "No date", "", &url(UNCHANGED), Some(3)),
        ]);
        harness.remote.set_route(FEED_URL, MockRoute::ok(xml)).await;
        harness.remote.set_route(url(NEW), MockRoute::ok("new")).await;

        let report = archive_show(&harness.ctx, &resolver(ShowTable::default()), &podcast()).await.unwrap().unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(report.downloaded, 1);
        assert_eq!(harness.ctx.ledger.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_episode_still_gets_manifest_entry() {
        let harness = Harness::new().await;
        let xml = feed(&[item(NEW, "Gone", "Mon, 01 Jan 2024 08:00:00 +0000", &url(NEW), Some(3))]);
        harness.remote.set_route(FEED_URL, MockRoute::ok(xml)).await;
        harness.remote.set_route(url(NEW), MockRoute::status(500)).await;

        let report = archive_show(&harness.ctx, &resolver(ShowTable::default()), &podcast()).await.unwrap().unwrap();
        assert_eq!(report.failed, 1);
        let manifest = read_manifest(&harness.ctx.archive, "Show").await.unwrap().unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].actual_length, -1);
    }

    #[tokio::test]
    async fn test_reissued_episode_is_kept_twice() {
        // The provider sometimes republishes an episode under a new guid.
        // Both copies are archived as separate episodes.
        let harness = Harness::new().await;
        let xml = feed(&[
            item(NEW, "Episode", "Mon, 01 Jan 2024 08:00:00 +0000", &url(NEW), Some(3)),
            item(CHANGED, "Episode", "Mon, 01 Jan 2024 08:00:00 +0000", &url(CHANGED), Some(3)),
        ]);
        harness.remote.set_route(FEED_URL, MockRoute::ok(xml)).await;
        harness.remote.set_route(url(NEW), MockRoute::ok("one")).await;
        harness.remote.set_route(url(CHANGED), MockRoute::ok("two")).await;

        let report = archive_show(&harness.ctx, &resolver(ShowTable::default()), &podcast()).await.unwrap().unwrap();
        assert_eq!(report.downloaded, 2);
        assert_eq!(harness.ctx.ledger.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_covers() {
        let harness = Harness::new().await;
        let xml = feed(&[]).replace("cover.jpg</url>", "cover.jpg?w=300</url>");
        harness.remote.set_route(FEED_URL, MockRoute::ok(xml)).await;
        harness.remote.set_route("https://img.example.com/cover.jpg?w=300", MockRoute::ok("small")).await;
        harness.remote.set_route("https://img.example.com/cover.jpg", MockRoute::ok("large")).await;

        archive_show(&harness.ctx, &resolver(ShowTable::default()), &podcast()).await.unwrap().unwrap();
        assert_eq!(harness.ctx.archive.read("Show/cover.jpg").await.unwrap(), b"small");
        assert_eq!(harness.ctx.archive.read("Show/cover_original.jpg").await.unwrap(), b"large");

        // Present covers are not fetched again.
        archive_show(&harness.ctx, &resolver(ShowTable::default()), &podcast()).await.unwrap().unwrap();
        assert_eq!(harness.remote.request_count("https://img.example.com/cover.jpg").await, 1);
    }

    #[tokio::test]
    async fn test_missing_cover_is_not_fatal() {
        let harness = Harness::new().await;
        harness.remote.set_route(FEED_URL, MockRoute::ok(feed(&[]))).await;
        let report = archive_show(&harness.ctx, &resolver(ShowTable::default()), &podcast()).await.unwrap();
        assert!(report.is_some());
        assert!(!harness.ctx.archive.exists("Show/cover.jpg").await.unwrap());
    }

    #[rstest]
    #[case("https://img.example.com/art/cover.png?w=1", ".png")]
    #[case("https://img.example.com/cover", "")]
    #[case("https://img.example.com/a.b/cover", "")]
    fn test_url_extension(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(url_extension(&Url::parse(url).unwrap()), expected);
    }
}
