//! SQLite-backed channel store.
//!
//! Timestamps are stored as `INTEGER` Unix epoch milliseconds (UTC).

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{FromRow, SqlitePool};
use tracing::{info, warn};

use super::model::{ChannelHeader, ChannelRecord, Namespace, PersistedCatalog, PersistedChannel};
use super::store::ChannelStore;
use crate::error::{CatalogError, Result};

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS channels (
        provider TEXT NOT NULL,
        instance TEXT NOT NULL,
        uid TEXT NOT NULL,
        enabled INTEGER NOT NULL,
        display_name TEXT NOT NULL,
        number INTEGER NOT NULL,
        callsign TEXT NOT NULL,
        is_hd INTEGER NOT NULL,
        thumbnail TEXT,
        thumbnail_size INTEGER,
        ref_url TEXT,
        header TEXT,
        uses_date_key INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (provider, instance, uid)
    )",
    "CREATE TABLE IF NOT EXISTS instances (
        provider TEXT NOT NULL,
        instance TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (provider, instance)
    )",
];

/// Channel database model.
#[derive(Debug, Clone, FromRow)]
struct ChannelDbModel {
    uid: String,
    enabled: bool,
    display_name: String,
    number: i64,
    callsign: String,
    is_hd: bool,
    thumbnail: Option<String>,
    thumbnail_size: Option<i64>,
    ref_url: Option<String>,
    /// JSON object of header name to value.
    header: Option<String>,
    uses_date_key: bool,
}

impl ChannelDbModel {
    fn into_persisted(self) -> PersistedChannel {
        let header = self.header.as_deref().and_then(|raw| {
            serde_json::from_str::<ChannelHeader>(raw)
                .inspect_err(|e| warn!(uid = %self.uid, error = %e, "Discarding unreadable channel header"))
                .ok()
        });
        PersistedChannel {
            number: u32::try_from(self.number).unwrap_or(0),
            thumbnail_size: self.thumbnail_size.and_then(|s| u64::try_from(s).ok()),
            header,
            uid: self.uid,
            enabled: self.enabled,
            display_name: self.display_name,
            callsign: self.callsign,
            is_hd: self.is_hd,
            thumbnail: self.thumbnail,
            ref_url: self.ref_url,
            uses_date_key: self.uses_date_key,
        }
    }
}

/// [`ChannelStore`] over a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteChannelStore {
    pool: SqlitePool,
}

impl SqliteChannelStore {
    /// Open (or create) the database at `database_url` and ensure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
            .create_if_missing(true);

        // Every connection to an in-memory database is a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!(database_url, "Channel store ready");
        Ok(store)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelStore for SqliteChannelStore {
    async fn get_channels(&self, namespace: &Namespace) -> Result<PersistedCatalog> {
        let rows = sqlx::query_as::<_, ChannelDbModel>(
            "SELECT * FROM channels WHERE provider = ? AND instance = ?",
        )
        .bind(&namespace.provider)
        .bind(&namespace.instance)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.uid.clone(), row.into_persisted()))
            .collect())
    }

    async fn get_channel(
        &self,
        id: &str,
        namespace: &Namespace,
    ) -> Result<Option<PersistedChannel>> {
        let row = sqlx::query_as::<_, ChannelDbModel>(
            "SELECT * FROM channels WHERE provider = ? AND instance = ? AND uid = ?",
        )
        .bind(&namespace.provider)
        .bind(&namespace.instance)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ChannelDbModel::into_persisted))
    }

    async fn update_channel_hd_flag(
        &self,
        id: &str,
        namespace: &Namespace,
        is_hd: bool,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE channels SET is_hd = ?, updated_at = ? WHERE provider = ? AND instance = ? AND uid = ?",
        )
        .bind(is_hd)
        .bind(Utc::now().timestamp_millis())
        .bind(&namespace.provider)
        .bind(&namespace.instance)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::store(format!(
                "channel {id} not found in {namespace}"
            )));
        }
        Ok(())
    }

    async fn save_instance(&self, namespace: &Namespace, channels: &[ChannelRecord]) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO instances (provider, instance, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(provider, instance) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(&namespace.provider)
        .bind(&namespace.instance)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for record in channels {
            let header = record.header.as_ref().map(serde_json::to_string).transpose()?;
            sqlx::query(
                "INSERT INTO channels (
                    provider, instance, uid, enabled, display_name, number, callsign, is_hd,
                    thumbnail, thumbnail_size, ref_url, header, uses_date_key, updated_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(provider, instance, uid) DO UPDATE SET
                    enabled = excluded.enabled,
                    display_name = excluded.display_name,
                    number = excluded.number,
                    callsign = excluded.callsign,
                    is_hd = excluded.is_hd,
                    thumbnail = excluded.thumbnail,
                    thumbnail_size = excluded.thumbnail_size,
                    ref_url = excluded.ref_url,
                    header = excluded.header,
                    uses_date_key = excluded.uses_date_key,
                    updated_at = excluded.updated_at",
            )
            .bind(&namespace.provider)
            .bind(&namespace.instance)
            .bind(&record.id)
            .bind(record.enabled)
            .bind(&record.name)
            .bind(i64::from(record.number))
            .bind(&record.callsign)
            .bind(record.is_hd)
            .bind(&record.thumbnail)
            .bind(record.thumbnail_size.and_then(|s| i64::try_from(s).ok()))
            .bind(&record.ref_url)
            .bind(header)
            .bind(record.uses_date_key)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
