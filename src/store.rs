//! SQLite sink for recorded API access entries
//!
//! This module provides:
//! - The [`RecordSink`] seam used by the batch accumulator and retention sweeper
//! - [`LogStore`], a pooled SQLite implementation with automatic migrations
//! - Transactional batch inserts (a batch is written completely or not at all)

use crate::error::StoreError;
use crate::record::LogRecord;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

/// Destination for matched records
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Write all records as one atomic multi-row write
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<(), StoreError>;

    /// Delete every row whose date precedes `cutoff`, returning the row count
    async fn delete_older_than(&self, cutoff: NaiveDate) -> Result<u64, StoreError>;
}

const INSERT_SQL: &str = "INSERT INTO api_access_log
     (server, program, date, time, status_code, duration, ip, method, api_path)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// Pooled SQLite store handle
#[derive(Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    /// Open (creating if missing) the database and run migrations
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = LogStore::connect("sqlite:./data/api_access.db", 5).await?;
    /// ```
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .pragma("synchronous", "NORMAL");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations completed");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Total number of stored rows
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_access_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Most recently inserted rows, newest first
    pub async fn recent(&self, limit: i64) -> Result<Vec<LogRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT server, program, date, time, status_code, duration, ip, method, api_path
             FROM api_access_log
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(|row| LogRecord {
                server: row.get("server"),
                program: row.get("program"),
                date: row.get("date"),
                time: row.get("time"),
                status_code: row.get("status_code"),
                duration: row.get("duration"),
                client_ip: row.get("ip"),
                http_method: row.get("method"),
                api_path: row.get("api_path"),
            })
            .collect();

        Ok(records)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RecordSink for LogStore {
    async fn insert_batch(&self, records: &[LogRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        if self.pool.is_closed() {
            return Err(StoreError::Unavailable("database pool is closed".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(INSERT_SQL)
                .bind(&record.server)
                .bind(&record.program)
                .bind(&record.date)
                .bind(&record.time)
                .bind(&record.status_code)
                .bind(&record.duration)
                .bind(&record.client_ip)
                .bind(&record.http_method)
                .bind(&record.api_path)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn delete_older_than(&self, cutoff: NaiveDate) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM api_access_log WHERE date < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_store() -> LogStore {
        LogStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    fn record(date: &str, path: &str) -> LogRecord {
        LogRecord {
            server: "web-01".to_string(),
            program: "user-service".to_string(),
            date: date.to_string(),
            time: "10:00:00".to_string(),
            status_code: "200".to_string(),
            duration: "15ms".to_string(),
            client_ip: "1.2.3.4".to_string(),
            http_method: "GET".to_string(),
            api_path: path.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_batch_and_read_back() {
        let store = create_test_store().await;

        let records = vec![
            record("2024-01-02", "/api/v1/users"),
            record("2024-01-02", "/api/v1/orders"),
        ];
        store.insert_batch(&records).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], records[1]);
        assert_eq!(recent[1], records[0]);
    }

    #[tokio::test]
    async fn test_insert_empty_batch_is_noop() {
        let store = create_test_store().await;
        store.insert_batch(&[]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let store = create_test_store().await;
        store
            .insert_batch(&[record("2024-01-01", "/api/v1/users")])
            .await
            .unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_bad_path BEFORE INSERT ON api_access_log
             WHEN NEW.api_path = '/reject'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let batch = vec![
            record("2024-01-02", "/api/v1/users"),
            record("2024-01-02", "/reject"),
        ];
        assert!(store.insert_batch(&batch).await.is_err());

        // The first row of the failed batch was rolled back
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_after_close_is_unavailable() {
        let store = create_test_store().await;
        store.close().await;

        let result = store.insert_batch(&[record("2024-01-02", "/a")]).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let store = create_test_store().await;
        store
            .insert_batch(&[
                record("2024-01-01", "/a"),
                record("2024-01-08", "/b"),
                record("2024-01-09", "/c"),
                record("2024-02-01", "/d"),
            ])
            .await
            .unwrap();

        let cutoff = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        let deleted = store.delete_older_than(cutoff).await.unwrap();

        assert_eq!(deleted, 2);
        let remaining: Vec<String> = store
            .recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.api_path)
            .collect();
        assert_eq!(remaining, vec!["/d", "/c"]);
    }
}
