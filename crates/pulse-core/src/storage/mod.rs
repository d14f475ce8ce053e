//! Pluggable persistence for metric records.
//!
//! Three backends satisfy the same capability contract: an in-memory map,
//! a file-backed store with crash-safe snapshotting, and a transactional
//! database store. Callers reach them only through [`MetricStorage`];
//! optional capabilities (dump loop, liveness ping) are exposed through the
//! [`StorageBackend`] construction-time view instead of widening the trait.

mod database;
mod file;
mod memory;

pub use database::{DatabaseStorage, SqliteMigrator};
pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{PulseError, PulseResult};
use crate::metric::{MetricValue, Record};
use crate::sched::migrate_with_retry;

/// Capability contract every storage backend satisfies.
///
/// `get` on an unknown key is not an error; it returns `None`. Batch pushes
/// must never expose a partially-applied state to a concurrent snapshot
/// read.
#[async_trait]
pub trait MetricStorage: Send + Sync {
    /// Upsert one record under its composite key, applying the per-kind
    /// merge rule (counters accumulate, gauges overwrite).
    async fn push(&self, key: &str, record: Record) -> PulseResult<()>;

    /// Apply a set of upserts atomically with respect to snapshot reads.
    async fn push_batch(&self, records: HashMap<String, Record>) -> PulseResult<()>;

    /// Fetch the record stored under a composite key.
    async fn get(&self, key: &str) -> PulseResult<Option<Record>>;

    /// All stored records. Order is implementation-defined for the
    /// in-process backends and ascending by name for the database.
    async fn get_all(&self) -> PulseResult<Vec<Record>>;

    /// Release resources. The file backend forces a final dump.
    async fn close(&self) -> PulseResult<()>;

    /// For downcasting to concrete backends.
    fn as_any(&self) -> &dyn Any;
}

/// One record in the snapshot file.
///
/// The value is stored as its canonical string encoding, not a raw number,
/// so floating-point formatting survives the round trip exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub name: String,
    pub kind: String,
    pub value: String,
}

/// Snapshot file format: composite key to record triple
pub type Snapshot = BTreeMap<String, SnapshotEntry>;

impl SnapshotEntry {
    pub fn from_record(record: &Record) -> Self {
        Self {
            name: record.name().to_string(),
            kind: record.kind().to_string(),
            value: record.value().to_string(),
        }
    }

    /// Decode back into a record; an unknown kind is `MetricNotImplemented`
    pub fn to_record(&self) -> PulseResult<Record> {
        let kind = self.kind.parse()?;
        Ok(Record::new(
            self.name.clone(),
            MetricValue::parse(kind, &self.value)?,
        ))
    }
}

/// Construction-time view over the selected backend.
///
/// Carries the typed handle the optional capabilities need: the dump loop
/// only exists for the file backend, liveness pings only for the database.
#[derive(Clone)]
pub enum StorageBackend {
    Memory(Arc<MemoryStorage>),
    File(Arc<FileStorage>),
    Database(Arc<DatabaseStorage>),
}

impl StorageBackend {
    /// Select and initialize a backend from configuration.
    ///
    /// Policy: a database DSN wins over a store path, which wins over plain
    /// memory. The database path runs schema migration with the startup
    /// retry budget; the file path restores prior state when configured.
    pub async fn open(config: &ServerConfig) -> PulseResult<Self> {
        if let Some(dsn) = &config.database_dsn {
            let storage = DatabaseStorage::open(dsn).await?;
            let migrator = storage.migrator();
            migrate_with_retry(&migrator).await?;
            info!(dsn = %dsn, "using database storage");
            return Ok(Self::Database(Arc::new(storage)));
        }
        if let Some(path) = &config.store_path {
            let storage = FileStorage::new(path, config.sync_mode());
            if config.restore {
                storage.restore().await?;
            }
            info!(path = %path.display(), sync = config.sync_mode(), "using file storage");
            return Ok(Self::File(Arc::new(storage)));
        }
        info!("using in-memory storage");
        Ok(Self::Memory(Arc::new(MemoryStorage::new())))
    }

    /// The backend as the caller-facing capability contract
    pub fn store(&self) -> Arc<dyn MetricStorage> {
        match self {
            Self::Memory(s) => s.clone(),
            Self::File(s) => s.clone(),
            Self::Database(s) => s.clone(),
        }
    }

    /// The file backend handle, if that is what was selected
    pub fn file(&self) -> Option<Arc<FileStorage>> {
        match self {
            Self::File(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Liveness check; only the database backend supports one
    pub async fn ping(&self) -> PulseResult<()> {
        match self {
            Self::Database(s) => s.ping().await,
            _ => Err(PulseError::HealthCheckNotSupported),
        }
    }
}
