//! Whole-run drivers: every configured show, one after another.

use crate::Context;
use crate::error::{ErrorKind, Result};
use crate::show::{ShowReport, archive_show};
use crate::summary::{read_manifest, write_listing};
use crate::sync::{Mirror, SyncReport, sync_show};
use crate::upload::Uploader;
use exn::ResultExt;
use podarc_config::{Podcast, Podcasts};
use podarc_feed::Resolver;
use podarc_storage::SCRATCH_DIR;

/// Archive every archivable show and write the listing of all episode files.
///
/// A show that fails is logged and left as it was; the listing then carries
/// its last manifest. Only a broken ledger stops the run.
pub async fn archive_all(ctx: &Context, resolver: &Resolver, podcasts: &Podcasts) -> Result<Vec<ShowReport>> {
    // Leftovers from an interrupted run.
    ctx.archive.clear_dir(SCRATCH_DIR).await.or_raise(|| ErrorKind::Storage)?;

    let mut reports = Vec::new();
    let mut listing = Vec::new();
    for podcast in podcasts.iter() {
        if !podcast.is_archivable() {
            tracing::info!(show = %podcast.name, "show is disabled or has no feed url; skipping");
            continue;
        }
        match archive_show(ctx, resolver, podcast).await {
            Ok(Some(report)) => {
                listing.push((report.show.clone(), report.filenames.clone()));
                reports.push(report);
            },
            Ok(None) => listing.push((podcast.name.clone(), previous_filenames(ctx, podcast).await)),
            Err(error) if *error == ErrorKind::InvariantViolation => return Err(error),
            Err(error) => {
                tracing::error!(show = %podcast.name, ?error, "could not archive show");
                listing.push((podcast.name.clone(), previous_filenames(ctx, podcast).await));
            },
        }
    }

    let path = write_listing(&ctx.archive, &listing).await?;
    tracing::info!(path = %path.display(), shows = listing.len(), "wrote episode listing");
    Ok(reports)
}

async fn previous_filenames(ctx: &Context, podcast: &Podcast) -> Vec<String> {
    match read_manifest(&ctx.archive, &podcast.name).await {
        Ok(Some(manifest)) => manifest.into_iter().map(|summary| summary.local_filename).collect(),
        Ok(None) => Vec::new(),
        Err(error) => {
            tracing::warn!(show = %podcast.name, ?error, "could not read previous manifest");
            Vec::new()
        },
    }
}

/// Mirror every show that has a remote identifier.
pub async fn sync_all(ctx: &Context, mirror: &Mirror, uploader: &dyn Uploader, podcasts: &Podcasts) -> Result<Vec<SyncReport>> {
    let mut reports = Vec::new();
    for podcast in podcasts.iter() {
        if podcast.ia_identifier.trim().is_empty() {
            tracing::debug!(show = %podcast.name, "no remote identifier; skipping");
            continue;
        }
        match sync_show(ctx, mirror, uploader, podcast).await {
            Ok(report) => {
                if report.pending.is_empty() {
                    tracing::info!(show = %report.show, "nothing to upload");
                } else {
                    tracing::info!(show = %report.show, uploaded = report.uploaded, failed = report.failed, "show synced");
                }
                reports.push(report);
            },
            Err(error) => tracing::error!(show = %podcast.name, ?error, "could not sync show"),
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{FileSummary, LISTING_FILENAME, write_manifest};
    use crate::testing::{Harness, RecordingUploader, feed, item};
    use podarc_config::ShowTable;
    use podarc_feed::FilenameGenerator;
    use podarc_storage::remote::MockRoute;
    use std::path::Path;
    use std::sync::Arc;

    const EPISODE: &str = "00000000-0000-0000-0000-000000000001";

    fn resolver() -> Resolver {
        Resolver::new(Arc::new(ShowTable::default()), FilenameGenerator::default())
    }

    fn podcast(name: &str, url: &str) -> Podcast {
        Podcast { url: url.to_string(), ..Podcast::new(name) }
    }

    fn summary(show: &str, filename: &str) -> FileSummary {
        FileSummary {
            guid: EPISODE.to_string(),
            local_filename: filename.to_string(),
            podcast_name: show.to_string(),
            reported_length: 3,
            actual_length: 3,
            remote_url: String::new(),
        }
    }

    #[tokio::test]
    async fn test_archive_all() {
        let harness = Harness::new().await;
        let xml = feed(&[item(EPISODE, "One", "Mon, 01 Jan 2024 08:00:00 +0000", "https://cdn.example.com/one.mp3", Some(3))]);
        harness.remote.set_route("https://feeds.example.com/live.rss", MockRoute::ok(xml)).await;
        harness.remote.set_route("https://cdn.example.com/one.mp3", MockRoute::ok("one")).await;
        // Archived on an earlier run; its feed is gone now.
        write_manifest(&harness.ctx.archive, "Gone", &[summary("Gone", "old.mp3")]).await.unwrap();
        harness.ctx.archive.write(".scratch/leftover", b"partial").await.unwrap();

        let podcasts = Podcasts::from(vec![
            podcast("Live", "https://feeds.example.com/live.rss"),
            podcast("Gone", "https://feeds.example.com/gone.rss"),
            Podcast { enabled: false, ..podcast("Disabled", "https://feeds.example.com/disabled.rss") },
            podcast("Unconfigured", ""),
        ]);
        let reports = archive_all(&harness.ctx, &resolver(), &podcasts).await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].show, "Live");
        assert_eq!(reports[0].downloaded, 1);
        assert!(harness.scratch_is_empty().await);
        let requested = harness.remote.requests().await;
        assert!(!requested.iter().any(|url| url.contains("disabled")));

        let listing = String::from_utf8(harness.ctx.archive.read(LISTING_FILENAME).await.unwrap()).unwrap();
        let expected = format!("# Live\n{}\n\n# Gone\nold.mp3\n\n", reports[0].filenames[0]);
        assert_eq!(listing, expected);
    }

    #[tokio::test]
    async fn test_sync_all_skips_shows_without_identifier() {
        let harness = Harness::new().await;
        let mirror = Mirror::new("https://archive.example.org/download", "https://s3.example.org");
        let uploader = RecordingUploader::default();
        // Configured, but never archived: logged and skipped.
        let podcasts = Podcasts::from(vec![
            Podcast { ia_identifier: "item".to_string(), ..Podcast::new("Missing") },
            Podcast::new("Local only"),
        ]);

        let reports = sync_all(&harness.ctx, &mirror, &uploader, &podcasts).await.unwrap();
        assert!(reports.is_empty());
        assert!(uploader.uploads().is_empty());
        assert!(harness.remote.requests().await.is_empty());
        assert!(!harness.ctx.archive.exists(Path::new("Local only")).await.unwrap());
    }
}
