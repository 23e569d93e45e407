//! The fetch executor.
//!
//! Episodes the reconciler flagged for download are fetched on their own
//! tasks, at most [`Context::concurrency`] at a time. Each one is streamed
//! into a staged file and only reaches its destination through an atomic
//! rename, so a failed or cancelled fetch never leaves a half-written episode
//! behind. Dropping the event stream aborts every fetch still running.

use crate::Context;
use crate::error::{Error, ErrorKind, Result};
use async_stream::stream;
use exn::{Exn, OptionExt, ResultExt};
use futures::{Stream, StreamExt};
use podarc_ledger::LedgerRecord;
use podarc_storage::{Published, Response};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::task::{Id, JoinSet};
use tracing::instrument;

/// One episode to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub show: String,
    pub identity: String,
    pub filename: String,
    pub url: String,
    pub declared_length: i64,
}

impl FetchJob {
    /// Destination, relative to the archive root.
    pub fn path(&self) -> PathBuf {
        Path::new(&self.show).join(&self.filename)
    }
}

/// How a job that didn't fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The episode was transferred and published.
    Downloaded(Published),
    /// The ledger already records a download of this file; nothing was requested.
    AlreadySatisfied,
    /// The remote confirmed the local file is current; the transfer was abandoned.
    Revalidated,
}

/// Progress events emitted by [`fetch_all`].
///
/// [`Started`](Self::Started) comes first and [`Complete`](Self::Complete)
/// last, each exactly once. In between there is one
/// [`Fetched`](Self::Fetched) or [`Failed`](Self::Failed) per job, in
/// completion order.
#[derive(Debug)]
pub enum FetchEvent {
    /// Carries the number of jobs.
    Started(usize),
    Fetched(FetchJob, FetchOutcome),
    Failed(FetchJob, Error),
    Complete,
}

/// Streams [`FetchEvent`]s while downloading every job.
///
/// A failed job never stops the others. Downloads the ledger records from
/// before `run_started` only count as current if they match the length the
/// feed declares now.
pub fn fetch_all(ctx: &Context, jobs: Vec<FetchJob>, run_started: UtcDateTime) -> impl Stream<Item = FetchEvent> + use<> {
    let ctx = ctx.clone();
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        yield FetchEvent::Started(jobs.len());

        let mut queue: VecDeque<FetchJob> = jobs.into();
        let mut running = Running::default();
        while running.len() < ctx.concurrency()
            && let Some(job) = queue.pop_front()
        {
            running.spawn(&ctx, job, run_started);
        }
        while let Some(event) = running.join_next().await {
            yield event;
            // Pop-n-push, but FIFO instead of LIFO.
            if let Some(job) = queue.pop_front() {
                running.spawn(&ctx, job, run_started);
            }
        }

        yield FetchEvent::Complete;
    })
}

/// Fetch tasks in flight, with the job each one is working on.
#[derive(Default)]
struct Running {
    tasks: JoinSet<FetchEvent>,
    jobs: HashMap<Id, FetchJob>,
}

impl Running {
    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn spawn(&mut self, ctx: &Context, job: FetchJob, run_started: UtcDateTime) {
        let handle = self.tasks.spawn(fetch_job(ctx.clone(), job.clone(), run_started));
        self.jobs.insert(handle.id(), job);
    }

    /// The next job to finish. A task that panicked reports its job as failed.
    async fn join_next(&mut self) -> Option<FetchEvent> {
        loop {
            match self.tasks.join_next_with_id().await? {
                Ok((id, event)) => {
                    self.jobs.remove(&id);
                    return Some(event);
                },
                Err(error) => {
                    if let Some(job) = self.jobs.remove(&error.id()) {
                        return Some(FetchEvent::Failed(job, Exn::new(error).raise(ErrorKind::TaskFailed)));
                    }
                },
            }
        }
    }
}

async fn fetch_job(ctx: Context, job: FetchJob, run_started: UtcDateTime) -> FetchEvent {
    match fetch_one(&ctx, &job, run_started).await {
        Ok(outcome) => FetchEvent::Fetched(job, outcome),
        Err(error) => FetchEvent::Failed(job, error),
    }
}

#[instrument(skip_all, fields(show = %job.show, identity = %job.identity))]
async fn fetch_one(ctx: &Context, job: &FetchJob, run_started: UtcDateTime) -> Result<FetchOutcome> {
    let path = job.path();
    let mut record = ctx
        .ledger
        .get(&job.show, &job.identity)
        .await
        .or_raise(|| ErrorKind::Ledger)?
        .ok_or_raise(|| ErrorKind::InvariantViolation)?;
    let local_size = ctx.archive.size(&path).await.or_raise(|| ErrorKind::Storage)?;

    if is_satisfied(&record, job, local_size, run_started) {
        tracing::debug!(filename = %job.filename, "already downloaded");
        return Ok(FetchOutcome::AlreadySatisfied);
    }

    let mut response = ctx.remote.get(&job.url).await.or_raise(|| ErrorKind::Request(job.url.clone()))?;
    if !response.is_success() {
        exn::bail!(ErrorKind::Status { url: job.url.clone(), status: response.status });
    }

    if let Some(size) = local_size
        && let Some(hash) = revalidate(ctx, &path, size, &mut response).await?
    {
        tracing::info!(filename = %job.filename, "local copy is current");
        record.downloaded(&job.filename, size, hash, UtcDateTime::now());
        persist_record(ctx, &record).await?;
        return Ok(FetchOutcome::Revalidated);
    }

    tracing::info!(filename = %job.filename, url = %job.url, "downloading");
    let published = publish_body(ctx, response, &job.url, &path).await?;

    record.downloaded(&job.filename, published.size, &published.hash, UtcDateTime::now());
    persist_record(ctx, &record).await?;
    Ok(FetchOutcome::Downloaded(published))
}

/// Stream a response body into the scratch directory, then move it to `path`.
pub(crate) async fn publish_body(ctx: &Context, response: Response, url: &str, path: &Path) -> Result<Published> {
    let mut body = response.into_body();
    // Dropping `staged` on any early return deletes the temporary file.
    let mut staged = ctx.archive.stage().await.or_raise(|| ErrorKind::Storage)?;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.or_raise(|| ErrorKind::Request(url.to_string()))?;
        staged.write(&chunk).await.or_raise(|| ErrorKind::Storage)?;
    }
    staged.publish(path).await.or_raise(|| ErrorKind::Storage)
}

/// The ledger says this exact file was downloaded and it is still on disk at
/// the recorded size, and that download either matches what the feed
/// declares now or happened during this run.
fn is_satisfied(record: &LedgerRecord, job: &FetchJob, local_size: Option<u64>, run_started: UtcDateTime) -> bool {
    let Some(local_size) = local_size.and_then(|size| i64::try_from(size).ok()) else {
        return false;
    };
    // The ledger stores whole seconds.
    let run_started = run_started.replace_nanosecond(0).unwrap_or(run_started);
    record.has_download()
        && record.filename == job.filename
        && record.size == local_size
        && (record.size == job.declared_length || record.date_last_downloaded >= run_started)
}

/// Compare the response headers with the local file: the ETag against its
/// MD5 if there is one, otherwise the Content-Length against its size.
/// Returns the local hash on a match.
async fn revalidate(ctx: &Context, path: &Path, local_size: u64, response: &mut Response) -> Result<Option<String>> {
    match response.etag_unquoted() {
        Some(etag) => {
            let hash = ctx.archive.md5(path).await.or_raise(|| ErrorKind::Storage)?;
            Ok(etag.eq_ignore_ascii_case(&hash).then_some(hash))
        },
        None if response.content_length == Some(local_size) => {
            Ok(Some(ctx.archive.md5(path).await.or_raise(|| ErrorKind::Storage)?))
        },
        None => Ok(None),
    }
}

pub(crate) async fn persist_record(ctx: &Context, record: &LedgerRecord) -> Result<()> {
    match ctx.ledger.update(record).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_invariant_violation() => Err(err.raise(ErrorKind::InvariantViolation)),
        Err(err) => Err(err.raise(ErrorKind::Ledger)),
    }
}
