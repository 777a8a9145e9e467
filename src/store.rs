use crate::{
    cache::LinkCache,
    models::{now_epoch, Record},
};
use anyhow::Context;
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

/// Durable source of truth for code -> target bindings.
///
/// Expiry is native to the store: once a record has expired it no longer
/// comes back from [`LinkStore::scan`], whatever the in-memory cache still
/// holds. The boundary is the one of [`Record::is_expired_at`].
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Durably bind `record.code` to `record.target` with the record's own
    /// absolute expiry.
    async fn put(&self, record: &Record) -> Result<(), sqlx::Error>;

    /// Every record that has not yet expired.
    async fn scan(&self) -> Result<Vec<Record>, sqlx::Error>;

    /// Flush and release the underlying resources.
    async fn close(&self);
}

/// [`LinkStore`] on top of a SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database, apply migrations and drop rows
    /// that expired while the process was down.
    pub async fn open(database_url: &str) -> anyhow::Result<Self> {
        let options = database_url
            .parse::<SqliteConnectOptions>()
            .with_context(|| format!("invalid database url '{database_url}'"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database '{database_url}'"))?;

        // Run embedded migrations (files in migrations/)
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply database migrations")?;
        tracing::info!("Database migrations applied");

        let store = Self { pool };
        let purged = store.purge_expired().await?;
        if purged > 0 {
            tracing::info!("Purged {} expired link(s) from the database", purged);
        }
        Ok(store)
    }

    /// Physically delete rows whose expiry has passed.
    pub async fn purge_expired(&self) -> Result<u64, sqlx::Error> {
        self.purge_expired_at(now_epoch()).await
    }

    async fn purge_expired_at(&self, now: u64) -> Result<u64, sqlx::Error> {
        let affected = sqlx::query("DELETE FROM links WHERE expires_at != 0 AND expires_at < ?1")
            .bind(to_column(now))
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(affected)
    }

    async fn scan_at(&self, now: u64) -> Result<Vec<Record>, sqlx::Error> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT code, target, expires_at FROM links
             WHERE expires_at = 0 OR expires_at >= ?1",
        )
        .bind(to_column(now))
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .into_iter()
            .map(|(code, target, expires_at)| Record {
                code,
                target,
                expires_at: u64::try_from(expires_at).unwrap_or(0),
            })
            .collect();

        Ok(records)
    }
}

/// Epoch seconds as stored in the `expires_at` column. Anything past the
/// column's range is pinned to its maximum.
fn to_column(epoch: u64) -> i64 {
    i64::try_from(epoch).unwrap_or(i64::MAX)
}

#[async_trait]
impl LinkStore for SqliteStore {
    async fn put(&self, record: &Record) -> Result<(), sqlx::Error> {
        // A row may survive past its expiry until the next purge, so a code
        // that is free again in memory has to be able to take it over.
        sqlx::query(
            "INSERT INTO links (code, target, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(code) DO UPDATE SET target = excluded.target,
                                             expires_at = excluded.expires_at",
        )
        .bind(record.code.as_str())
        .bind(record.target.as_str())
        .bind(to_column(record.expires_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn scan(&self) -> Result<Vec<Record>, sqlx::Error> {
        self.scan_at(now_epoch()).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

// ── Warm-up ────────────────────────────────────────────────────────────────

/// Load every live record into the in-memory cache at startup.
pub async fn warm_cache(store: &dyn LinkStore, cache: &LinkCache) -> anyhow::Result<usize> {
    let records = store
        .scan()
        .await
        .context("failed to scan the link store")?;

    let count = records.len();
    for record in records {
        cache.load(record);
    }

    tracing::info!("Cache warmed with {} live link(s)", count);
    Ok(count)
}
