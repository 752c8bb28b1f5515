//! Local store trait and the SQLite implementation.

use crate::error::{LocalError, LocalResult};
use crate::models::{CardStateRow, EntryRow, ReviewLogRow};
use crate::repos::sync_state::SYNC_META_KEY;
use crate::repos::{CardStateRepo, EntryRepo, ReviewLogRepo, SyncStateRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use vocasync_core::{
    CardState, CardStates, LocalSyncMeta, PartitionKey, ReviewLogEntry, VocabEntry,
    month_key_for,
};

/// Combined local store trait.
#[async_trait]
pub trait LocalStore: EntryRepo + CardStateRepo + ReviewLogRepo + SyncStateRepo + Send + Sync {
    /// Create or upgrade the schema.
    async fn migrate(&self) -> LocalResult<()>;

    /// Check store health.
    async fn health_check(&self) -> LocalResult<()>;
}

/// SQLite-based local store, the relational cache of the mobile client.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) a SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> LocalResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // One writer process per device; a single connection keeps writes serialized.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

fn keys_from(rows: Vec<String>, parse: fn(&str) -> vocasync_core::Result<PartitionKey>)
-> LocalResult<Vec<PartitionKey>> {
    rows.iter()
        .map(|s| parse(s).map_err(LocalError::from))
        .collect()
}

fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn migrate(&self) -> LocalResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> LocalResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl EntryRepo for SqliteStore {
    async fn entries_for_day(&self, day: &PartitionKey) -> LocalResult<Vec<VocabEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            "SELECT id, day, timestamp, body FROM vocab_entries WHERE day = ? ORDER BY id",
        )
        .bind(day.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EntryRow::into_record).collect()
    }

    async fn replace_entries_for_day(
        &self,
        day: &PartitionKey,
        entries: &[VocabEntry],
    ) -> LocalResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM vocab_entries WHERE day = ?")
            .bind(day.as_str())
            .execute(&mut *tx)
            .await?;
        for entry in entries {
            sqlx::query(UPSERT_ENTRY_SQL)
                .bind(&entry.id)
                .bind(day.as_str())
                .bind(entry.timestamp)
                .bind(serde_json::to_string(entry)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_entry(&self, entry: &VocabEntry) -> LocalResult<PartitionKey> {
        let day = entry.partition_key()?;
        sqlx::query(UPSERT_ENTRY_SQL)
            .bind(&entry.id)
            .bind(day.as_str())
            .bind(entry.timestamp)
            .bind(serde_json::to_string(entry)?)
            .execute(&self.pool)
            .await?;
        Ok(day)
    }

    async fn delete_entry(&self, id: &str) -> LocalResult<Option<PartitionKey>> {
        let day: Option<String> = sqlx::query_scalar("SELECT day FROM vocab_entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(day) = day else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM vocab_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(Some(PartitionKey::day(&day)?))
    }

    async fn entry_days(&self) -> LocalResult<Vec<PartitionKey>> {
        let days: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT day FROM vocab_entries ORDER BY day")
                .fetch_all(&self.pool)
                .await?;
        keys_from(days, PartitionKey::day)
    }

    async fn count_entries(&self) -> LocalResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vocab_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count(n))
    }
}

#[async_trait]
impl CardStateRepo for SqliteStore {
    async fn card_states_for_month(&self, month: &PartitionKey) -> LocalResult<CardStates> {
        let rows = sqlx::query_as::<_, CardStateRow>(
            "SELECT vocab_id, month, body FROM card_states WHERE month = ?",
        )
        .bind(month.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CardStateRow::into_record).collect()
    }

    async fn replace_card_states_for_month(
        &self,
        month: &PartitionKey,
        states: &CardStates,
    ) -> LocalResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM card_states WHERE month = ?")
            .bind(month.as_str())
            .execute(&mut *tx)
            .await?;
        for (vocab_id, state) in states {
            sqlx::query(
                r#"
                INSERT INTO card_states (vocab_id, month, body) VALUES (?, ?, ?)
                ON CONFLICT(vocab_id) DO UPDATE SET month = excluded.month, body = excluded.body
                "#,
            )
            .bind(vocab_id)
            .bind(month.as_str())
            .bind(serde_json::to_string(state)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_card_state(
        &self,
        vocab_id: &str,
        state: &CardState,
    ) -> LocalResult<PartitionKey> {
        let existing: Option<String> =
            sqlx::query_scalar("SELECT month FROM card_states WHERE vocab_id = ?")
                .bind(vocab_id)
                .fetch_optional(&self.pool)
                .await?;
        let month = match existing {
            Some(month) => PartitionKey::month(&month)?,
            None => month_key_for(state.due)?,
        };
        sqlx::query(
            r#"
            INSERT INTO card_states (vocab_id, month, body) VALUES (?, ?, ?)
            ON CONFLICT(vocab_id) DO UPDATE SET body = excluded.body
            "#,
        )
        .bind(vocab_id)
        .bind(month.as_str())
        .bind(serde_json::to_string(state)?)
        .execute(&self.pool)
        .await?;
        Ok(month)
    }

    async fn delete_card_state(&self, vocab_id: &str) -> LocalResult<Option<PartitionKey>> {
        let month: Option<String> =
            sqlx::query_scalar("SELECT month FROM card_states WHERE vocab_id = ?")
                .bind(vocab_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(month) = month else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM card_states WHERE vocab_id = ?")
            .bind(vocab_id)
            .execute(&self.pool)
            .await?;
        Ok(Some(PartitionKey::month(&month)?))
    }

    async fn card_state_months(&self) -> LocalResult<Vec<PartitionKey>> {
        let months: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT month FROM card_states ORDER BY month")
                .fetch_all(&self.pool)
                .await?;
        keys_from(months, PartitionKey::month)
    }

    async fn count_card_states(&self) -> LocalResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM card_states")
            .fetch_one(&self.pool)
            .await?;
        Ok(count(n))
    }
}

#[async_trait]
impl ReviewLogRepo for SqliteStore {
    async fn review_logs_for_month(
        &self,
        month: &PartitionKey,
    ) -> LocalResult<Vec<ReviewLogEntry>> {
        let rows = sqlx::query_as::<_, ReviewLogRow>(
            r#"
            SELECT vocab_id, reviewed_at, month, body FROM review_logs
            WHERE month = ? ORDER BY reviewed_at, vocab_id
            "#,
        )
        .bind(month.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReviewLogRow::into_record).collect()
    }

    async fn replace_review_logs_for_month(
        &self,
        month: &PartitionKey,
        logs: &[ReviewLogEntry],
    ) -> LocalResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM review_logs WHERE month = ?")
            .bind(month.as_str())
            .execute(&mut *tx)
            .await?;
        for log in logs {
            sqlx::query(UPSERT_REVIEW_LOG_SQL)
                .bind(&log.vocab_id)
                .bind(log.reviewed_at)
                .bind(month.as_str())
                .bind(serde_json::to_string(log)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn append_review_log(&self, log: &ReviewLogEntry) -> LocalResult<PartitionKey> {
        let month = month_key_for(log.reviewed_at)?;
        sqlx::query(UPSERT_REVIEW_LOG_SQL)
            .bind(&log.vocab_id)
            .bind(log.reviewed_at)
            .bind(month.as_str())
            .bind(serde_json::to_string(log)?)
            .execute(&self.pool)
            .await?;
        Ok(month)
    }

    async fn review_log_months(&self) -> LocalResult<Vec<PartitionKey>> {
        let months: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT month FROM review_logs ORDER BY month")
                .fetch_all(&self.pool)
                .await?;
        keys_from(months, PartitionKey::month)
    }

    async fn count_review_logs(&self) -> LocalResult<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count(n))
    }
}

#[async_trait]
impl SyncStateRepo for SqliteStore {
    async fn load_sync_meta(&self) -> LocalResult<LocalSyncMeta> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv WHERE key = ?")
            .bind(SYNC_META_KEY)
            .fetch_optional(&self.pool)
            .await?;
        match value {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(LocalSyncMeta::default()),
        }
    }

    async fn save_sync_meta(&self, meta: &LocalSyncMeta) -> LocalResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(SYNC_META_KEY)
        .bind(serde_json::to_string(meta)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const UPSERT_ENTRY_SQL: &str = r#"
INSERT INTO vocab_entries (id, day, timestamp, body) VALUES (?, ?, ?, ?)
ON CONFLICT(id) DO UPDATE SET
    day = excluded.day,
    timestamp = excluded.timestamp,
    body = excluded.body
"#;

const UPSERT_REVIEW_LOG_SQL: &str = r#"
INSERT INTO review_logs (vocab_id, reviewed_at, month, body) VALUES (?, ?, ?, ?)
ON CONFLICT(vocab_id, reviewed_at) DO UPDATE SET
    month = excluded.month,
    body = excluded.body
"#;

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS vocab_entries (
    id TEXT PRIMARY KEY,
    day TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_vocab_entries_day ON vocab_entries(day);

CREATE TABLE IF NOT EXISTS card_states (
    vocab_id TEXT PRIMARY KEY,
    month TEXT NOT NULL,
    body TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_card_states_month ON card_states(month);

CREATE TABLE IF NOT EXISTS review_logs (
    vocab_id TEXT NOT NULL,
    reviewed_at INTEGER NOT NULL,
    month TEXT NOT NULL,
    body TEXT NOT NULL,
    PRIMARY KEY (vocab_id, reviewed_at)
);
CREATE INDEX IF NOT EXISTS idx_review_logs_month ON review_logs(month);

CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
