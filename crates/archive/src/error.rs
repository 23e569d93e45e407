//! Archive Error Types
//!
//! Errors raised here wrap the storage, ledger and feed errors underneath
//! them, so the `Debug` output of an [`Error`] is the whole tree.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("archive storage error")]
    Storage,
    #[display("ledger error")]
    Ledger,
    #[display("feed error")]
    Feed,
    /// Our own bookkeeping is wrong; never swallowed.
    #[display("ledger invariant violated")]
    InvariantViolation,
    #[display("fetch task failed")]
    TaskFailed,
    #[display("request for {_0} failed")]
    Request(#[error(not(source))] String),
    #[display("unexpected HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[display("no usable manifest for show {_0}")]
    Manifest(#[error(not(source))] String),
    #[display("show {_0} is not configured for sync")]
    NotConfigured(#[error(not(source))] String),
    #[display("upload of {_0} failed")]
    Upload(#[error(not(source))] String),
    #[display("upload tool unavailable: {_0}")]
    ToolUnavailable(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Request(_) | Self::Status { .. } | Self::Upload(_))
    }
}
