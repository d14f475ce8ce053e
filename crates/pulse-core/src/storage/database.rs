//! Transactional database-backed metric storage

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::error::{PulseError, PulseResult};
use crate::metric::{MetricValue, Record};
use crate::sched::Migrator;
use crate::storage::MetricStorage;

/// Metric storage over a relational `metrics` table.
///
/// Every push runs in its own transaction; a batch is a single
/// transaction. The connection lives behind a mutex whose RAII guard pairs
/// every acquire with a release on all exit paths, and blocking SQL work
/// runs off the async runtime.
pub struct DatabaseStorage {
    conn: Arc<Mutex<Connection>>,
}

impl DatabaseStorage {
    /// Open (or create) the database at the configured DSN
    pub async fn open(dsn: &str) -> PulseResult<Self> {
        let dsn = dsn.to_string();
        let conn = tokio::task::spawn_blocking(move || Connection::open(dsn))
            .await
            .map_err(|e| PulseError::unexpected(format!("database open task failed: {}", e)))?
            .map_err(|e| PulseError::database(format!("open database: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-process database, used by tests
    pub fn open_in_memory() -> PulseResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PulseError::database(format!("open database: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Migrator bound to this storage's connection
    pub fn migrator(&self) -> SqliteMigrator {
        SqliteMigrator {
            conn: self.conn.clone(),
        }
    }

    /// Liveness check, delegated to the connection
    #[instrument(skip(self))]
    pub async fn ping(&self) -> PulseResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(PulseError::from)?;
            Ok(())
        })
        .await
    }

    async fn with_conn<T, F>(&self, op: F) -> PulseResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> PulseResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| PulseError::unexpected("database connection lock poisoned"))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| PulseError::unexpected(format!("database task failed: {}", e)))?
    }

    fn fetch(conn: &Connection, key: &str) -> PulseResult<Option<Record>> {
        let row = conn
            .query_row(
                "SELECT name, kind, value FROM metrics WHERE id = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(name, kind, value)| Self::decode(name, &kind, &value))
            .transpose()
    }

    /// Row decoding switches on the stored kind column; an unknown kind is
    /// a decode error, never silently skipped.
    fn decode(name: String, kind: &str, value: &str) -> PulseResult<Record> {
        let kind = kind.parse()?;
        Ok(Record::new(name, MetricValue::parse(kind, value)?))
    }

    fn upsert(conn: &Connection, key: &str, record: &Record) -> PulseResult<()> {
        conn.execute(
            "INSERT INTO metrics (id, name, kind, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET value = excluded.value",
            params![
                key,
                record.name(),
                record.kind().as_str(),
                record.value().to_string()
            ],
        )?;
        Ok(())
    }

    fn merge_and_upsert(conn: &Connection, key: &str, record: Record) -> PulseResult<()> {
        let merged = match Self::fetch(conn, key)? {
            Some(existing) => existing.merged_with(&record),
            None => record,
        };
        Self::upsert(conn, key, &merged)
    }
}

#[async_trait]
impl MetricStorage for DatabaseStorage {
    async fn push(&self, key: &str, record: Record) -> PulseResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            // Dropping an uncommitted transaction rolls it back.
            let tx = conn.transaction()?;
            Self::merge_and_upsert(&tx, &key, record)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn push_batch(&self, batch: HashMap<String, Record>) -> PulseResult<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for (key, record) in batch {
                Self::merge_and_upsert(&tx, &key, record)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> PulseResult<Option<Record>> {
        let key = key.to_string();
        self.with_conn(move |conn| Self::fetch(conn, &key)).await
    }

    async fn get_all(&self) -> PulseResult<Vec<Record>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT name, kind, value FROM metrics ORDER BY name ASC")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            let mut records = Vec::new();
            for row in rows {
                let (name, kind, value) = row?;
                records.push(Self::decode(name, &kind, &value)?);
            }
            Ok(records)
        })
        .await
    }

    async fn close(&self) -> PulseResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Creates the metrics schema; re-running against an up-to-date database
/// is success, not an error.
pub struct SqliteMigrator {
    conn: Arc<Mutex<Connection>>,
}

#[async_trait]
impl Migrator for SqliteMigrator {
    async fn migrate(&self) -> PulseResult<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| PulseError::unexpected("database connection lock poisoned"))?;
            guard.execute_batch(
                "CREATE TABLE IF NOT EXISTS metrics (
                    id    TEXT PRIMARY KEY,
                    name  TEXT NOT NULL,
                    kind  TEXT NOT NULL,
                    value TEXT NOT NULL
                )",
            )?;
            Ok(())
        })
        .await
        .map_err(|e| PulseError::unexpected(format!("migration task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_migrated() -> DatabaseStorage {
        let storage = DatabaseStorage::open_in_memory().unwrap();
        storage.migrator().migrate().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn counter_pushes_accumulate() {
        let storage = open_migrated().await;
        for delta in [10, 5] {
            let record = Record::new("PollCount", MetricValue::Counter(delta));
            storage.push(&record.storage_key(), record).await.unwrap();
        }
        let stored = storage.get("PollCount_counter").await.unwrap().unwrap();
        assert_eq!(stored.value(), MetricValue::Counter(15));
    }

    #[tokio::test]
    async fn gauge_pushes_overwrite() {
        let storage = open_migrated().await;
        for value in [11.123, 9.0] {
            let record = Record::new("Alloc", MetricValue::Gauge(value));
            storage.push(&record.storage_key(), record).await.unwrap();
        }
        let stored = storage.get("Alloc_gauge").await.unwrap().unwrap();
        assert_eq!(stored.value(), MetricValue::Gauge(9.0));
    }

    #[tokio::test]
    async fn get_all_orders_by_name() {
        let storage = open_migrated().await;
        for record in [
            Record::new("Zulu", MetricValue::Counter(1)),
            Record::new("Alpha", MetricValue::Gauge(2.0)),
            Record::new("Mike", MetricValue::Counter(3)),
        ] {
            storage.push(&record.storage_key(), record).await.unwrap();
        }
        let names: Vec<_> = storage
            .get_all()
            .await
            .unwrap()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, ["Alpha", "Mike", "Zulu"]);
    }

    #[tokio::test]
    async fn batch_is_one_transaction() {
        let storage = open_migrated().await;
        let mut batch = HashMap::new();
        let counter = Record::new("PollCount", MetricValue::Counter(10));
        let gauge = Record::new("Alloc", MetricValue::Gauge(11.123));
        batch.insert(counter.storage_key(), counter);
        batch.insert(gauge.storage_key(), gauge);
        storage.push_batch(batch).await.unwrap();

        let all = storage.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn unknown_stored_kind_is_a_decode_error() {
        let storage = open_migrated().await;
        storage
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO metrics (id, name, kind, value) VALUES (?1, ?2, ?3, ?4)",
                    params!["X_summary", "X", "summary", "1"],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(matches!(
            storage.get("X_summary").await,
            Err(PulseError::MetricNotImplemented { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_key_is_not_an_error() {
        let storage = open_migrated().await;
        assert!(storage.get("Missing_counter").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ping_succeeds_on_a_live_connection() {
        let storage = open_migrated().await;
        storage.ping().await.unwrap();
    }
}
