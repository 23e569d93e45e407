//! Ledger Error Types

use derive_more::{Display, Error};

/// A ledger error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// An update was attempted for a key that was never created. This is a
    /// bookkeeping bug, not bad input.
    #[display("ledger record not found: {_0}")]
    RecordNotFound(#[error(not(source))] String),
    #[display("invalid ledger data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }

    /// Returns `true` for errors that indicate a defect in the caller.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::RecordNotFound(_))
    }
}
