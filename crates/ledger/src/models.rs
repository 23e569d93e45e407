use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use time::UtcDateTime;

/// The ledger key for an episode of a show.
pub fn record_key(show: &str, identity: &str) -> String {
    format!("{show}_{identity}")
}

/// Persistent per-episode bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub show: String,
    pub identity: String,
    /// Name the episode was last written under.
    pub filename: String,
    /// Size in bytes of the last download, `-1` if never downloaded.
    pub size: i64,
    /// Lowercase hex MD5 of the last download, empty if never downloaded.
    pub hash: String,
    pub date_added: UtcDateTime,
    /// [`UtcDateTime::UNIX_EPOCH`] means never.
    pub date_last_downloaded: UtcDateTime,
}

impl LedgerRecord {
    pub fn key(&self) -> String {
        record_key(&self.show, &self.identity)
    }

    /// Whether a download has ever completed for this record.
    pub fn has_download(&self) -> bool {
        self.date_last_downloaded > UtcDateTime::UNIX_EPOCH && self.size >= 0
    }

    /// Record a completed download.
    pub fn downloaded(&mut self, filename: impl Into<String>, size: u64, hash: impl Into<String>, at: UtcDateTime) {
        self.filename = filename.into();
        self.size = i64::try_from(size).unwrap_or(i64::MAX);
        self.hash = hash.into();
        // Stored with second precision; truncate now so that the in-memory
        // record compares equal to what a later read returns.
        self.date_last_downloaded = at.replace_nanosecond(0).unwrap_or(at);
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RecordRow {
    pub episode_key: String,
    pub show: String,
    pub identity: String,
    pub filename: String,
    pub size: i64,
    pub hash: String,
    pub date_added: i64,
    pub date_last_downloaded: i64,
}

impl TryFrom<RecordRow> for LedgerRecord {
    type Error = Error;
    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        if row.episode_key != record_key(&row.show, &row.identity) {
            exn::bail!(ErrorKind::InvalidData("record key"));
        }
        Ok(Self {
            show: row.show,
            identity: row.identity,
            filename: row.filename,
            size: row.size,
            hash: row.hash,
            date_added: UtcDateTime::from_unix_timestamp(row.date_added)
                .or_raise(|| ErrorKind::InvalidData("date added"))?,
            date_last_downloaded: UtcDateTime::from_unix_timestamp(row.date_last_downloaded)
                .or_raise(|| ErrorKind::InvalidData("date last downloaded"))?,
        })
    }
}
