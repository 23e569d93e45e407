//! Shared fixtures for unit tests.

use crate::Context;
use crate::error::ErrorKind;
use crate::upload::Uploader;
use async_trait::async_trait;
use podarc_ledger::{Database, Ledger, LedgerRecord};
use podarc_storage::remote::MockRemote;
use podarc_storage::{Archive, SCRATCH_DIR};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) struct Harness {
    // Removed when the harness is dropped.
    _dir: tempfile::TempDir,
    pub ctx: Context,
    pub remote: Arc<MockRemote>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_concurrency(crate::DEFAULT_CONCURRENCY).await
    }

    pub async fn with_concurrency(concurrency: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::new(dir.path()).unwrap();
        let db = Database::connect_in_memory().await.unwrap();
        let remote = Arc::new(MockRemote::default());
        let ctx = Context::new(archive, Ledger::from(&db), remote.clone()).with_concurrency(concurrency);
        Self { _dir: dir, ctx, remote }
    }

    pub async fn record(&self, show: &str, identity: &str, filename: &str) -> LedgerRecord {
        self.ctx.ledger.get_or_create(show, identity, filename).await.unwrap()
    }

    pub async fn scratch_is_empty(&self) -> bool {
        self.ctx.archive.list(Some(Path::new(SCRATCH_DIR))).await.unwrap().is_empty()
    }
}

pub(crate) fn md5_hex(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    format!("{:x}", Md5::digest(data))
}

/// An RSS item; `length` is left out when `None`.
pub(crate) fn item(guid: &str, title: &str, published: &str, url: &str, length: Option<usize>) -> String {
    let length = length.map(|l| format!(r#" length="{l}""#)).unwrap_or_default();
    format!(
        r#"<item>
      <title>{title}</title>
      <guid isPermaLink="false">{guid}</guid>
      <pubDate>{published}</pubDate>
      <enclosure url="{url}"{length} type="audio/mpeg"/>
    </item>"#
    )
}

/// A whole feed around `items`, newest first as feeds usually are.
pub(crate) fn feed(items: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Show</title>
    <atom:link href="https://feeds.example.com/show.rss" rel="self" type="application/rss+xml"/>
    <itunes:image href="https://img.example.com/cover.jpg"/>
    <image>
      <url>https://img.example.com/cover.jpg</url>
    </image>
    {}
  </channel>
</rss>"#,
        items.join("\n    ")
    )
}

/// Records uploads instead of running a tool. Files whose name is in
/// `failing` are rejected.
#[derive(Default)]
pub(crate) struct RecordingUploader {
    uploads: std::sync::Mutex<Vec<(String, PathBuf)>>,
    failing: HashSet<String>,
}

impl RecordingUploader {
    pub fn failing<const N: usize>(names: [&str; N]) -> Self {
        Self { failing: names.into_iter().map(String::from).collect(), ..Self::default() }
    }

    pub fn uploads(&self) -> Vec<(String, PathBuf)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(&self, identifier: &str, file: &Path) -> crate::error::Result<()> {
        let name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if self.failing.contains(&name) {
            exn::bail!(ErrorKind::Upload(file.display().to_string()));
        }
        self.uploads.lock().unwrap().push((identifier.to_string(), file.to_path_buf()));
        Ok(())
    }
}
