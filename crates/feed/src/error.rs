//! Feed Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A feed error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for feed operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// Everything except [`Malformed`](Self::Malformed) and
/// [`Template`](Self::Template) is scoped to a single entry: log it, skip the
/// entry, carry on with the rest of the feed.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The document is not well-formed XML, or is not an RSS document at all.
    #[display("malformed feed document")]
    Malformed,
    /// The raw identifier is neither a 36-character identity nor a 32-bit integer.
    #[display("invalid identifier {raw:?} for episode {title:?}")]
    InvalidIdentifier { raw: String, title: String },
    /// A field required to archive an entry is absent or empty.
    #[display("missing required field: {_0}")]
    MissingField(#[error(not(source))] &'static str),
    /// A field was found but could not be parsed.
    #[display("failed to parse field '{field}', found value: {value}")]
    ParseError {
        /// The field that failed to parse.
        field: &'static str,
        /// The offending value.
        value: String,
    },
    /// The filename template failed to compile or render, or rendered
    /// something that is not a single path component.
    #[display("issue with filename generation from template")]
    Template,
}

impl ErrorKind {
    /// Returns `true` if the entry should be skipped rather than aborting the
    /// whole feed.
    pub fn is_entry_scoped(&self) -> bool {
        !matches!(self, Self::Malformed | Self::Template)
    }
}
