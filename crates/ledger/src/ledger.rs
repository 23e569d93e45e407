//! Point lookups and updates against the `episodes` table.
//!
//! Episode workers run concurrently, so the read-then-insert in
//! [`Ledger::get_or_create`] and every update are serialized behind a single
//! async lock. The lock is only held for the duration of one statement pair;
//! no network or file I/O ever happens while holding it.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{LedgerRecord, RecordRow, record_key};
use exn::ResultExt;
use sqlx::SqlitePool;
use std::sync::Arc;
use time::UtcDateTime;
use tokio::sync::Mutex;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
    lock: Arc<Mutex<()>>,
}

impl From<&Database> for Ledger {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, lock: Arc::new(Mutex::new(())) }
    }

    pub async fn get(&self, show: &str, identity: &str) -> Result<Option<LedgerRecord>> {
        self.fetch(&record_key(show, identity)).await
    }

    async fn fetch(&self, key: &str) -> Result<Option<LedgerRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(include_str!("../queries/get_record.sql"))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(LedgerRecord::try_from).transpose()
    }

    /// Return the record for `(show, identity)`, creating it with `filename`
    /// if this is the first sighting. Concurrent callers with the same key all
    /// observe the same single record.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, show: &str, identity: &str, filename: &str) -> Result<LedgerRecord> {
        let key = record_key(show, identity);
        let _guard = self.lock.lock().await;
        if let Some(existing) = self.fetch(&key).await? {
            return Ok(existing);
        }
        sqlx::query(include_str!("../queries/insert_record.sql"))
            .bind(&key)
            .bind(show)
            .bind(identity)
            .bind(filename)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(%key, "created ledger record");
        // Read back rather than construct, so the caller sees exactly what a
        // later lookup would.
        match self.fetch(&key).await? {
            Some(record) => Ok(record),
            None => exn::bail!(ErrorKind::RecordNotFound(key)),
        }
    }

    /// Persist the download state of an existing record.
    ///
    /// Fails with [`ErrorKind::RecordNotFound`] if the record was never
    /// created through [`Ledger::get_or_create`].
    #[instrument(skip_all, fields(key = %record.key()))]
    pub async fn update(&self, record: &LedgerRecord) -> Result<()> {
        let key = record.key();
        let _guard = self.lock.lock().await;
        let result = sqlx::query(include_str!("../queries/update_record.sql"))
            .bind(&record.filename)
            .bind(record.size)
            .bind(&record.hash)
            .bind(record.date_last_downloaded.unix_timestamp())
            .bind(&key)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::RecordNotFound(key));
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(include_str!("../queries/count_records.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("record count"))
    }
}
