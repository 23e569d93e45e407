//! SQLite-backed sync ledger.
//!
//! One record per archived episode, keyed by `"{show}_{identity}"`. A record
//! remembers the filename the episode was last written under, its size and
//! MD5, and when it was last successfully downloaded. Records are created on
//! first sighting and only ever updated in place; nothing is ever deleted.
//!
//! The database lives alongside the archive (`{archive}/database.db`) and is
//! the only state that survives between runs apart from the files themselves.

mod db;
pub mod error;
mod ledger;
mod models;

pub use crate::db::Database;
pub use crate::ledger::Ledger;
pub use crate::models::{LedgerRecord, record_key};

/// Filename of the ledger database inside the archive directory.
pub const DATABASE_FILENAME: &str = "database.db";
