//! The podarc pipelines.
//!
//! Archiving walks each configured show in turn: refresh the feed snapshot,
//! fetch cover art, resolve every entry to a filename, decide what needs
//! downloading, download it with bounded concurrency, and write the show's
//! manifest. Syncing mirrors the result to the remote archive, uploading only
//! what the remote doesn't already hold.

pub mod error;
mod fetch;
mod reconcile;
mod run;
mod show;
mod summary;
mod sync;
#[cfg(test)]
mod testing;
mod upload;

pub use crate::fetch::{FetchEvent, FetchJob, FetchOutcome, fetch_all};
pub use crate::reconcile::{Decision, decide};
pub use crate::run::{archive_all, sync_all};
pub use crate::show::{ShowReport, archive_show};
pub use crate::summary::{FileSummary, LISTING_FILENAME, MANIFEST_FILENAME, read_manifest, write_listing, write_manifest};
pub use crate::sync::{RSS_FILENAME, Mirror, SyncReport, sync_show};
pub use crate::upload::{IaUploader, Uploader};
use podarc_ledger::Ledger;
use podarc_storage::{Archive, RemoteHandle};

/// Default number of episodes fetched (or uploaded) at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Everything a pipeline needs, constructed once per run.
#[derive(Clone)]
pub struct Context {
    pub archive: Archive,
    pub ledger: Ledger,
    pub remote: RemoteHandle,
    concurrency: usize,
}

impl Context {
    pub fn new(archive: Archive, ledger: Ledger, remote: RemoteHandle) -> Self {
        Self { archive, ledger, remote, concurrency: DEFAULT_CONCURRENCY }
    }

    /// Worker width; `0` is treated as `1`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}
