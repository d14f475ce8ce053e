//! File-backed metric storage with crash-safe snapshotting

use std::any::Any;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::{PulseError, PulseResult};
use crate::metric::Record;
use crate::storage::{MemoryStorage, MetricStorage, Snapshot, SnapshotEntry};

/// In-memory storage that persists full snapshots to a JSON file.
///
/// In sync mode every push is followed by a dump before it reports
/// success (durability over throughput); otherwise dumps happen on the
/// scheduler's store-interval ticks and on `close`.
pub struct FileStorage {
    inner: MemoryStorage,
    store_path: PathBuf,
    sync_mode: bool,
    dump_lock: tokio::sync::Mutex<()>,
}

impl FileStorage {
    /// Create a file-backed store over the given snapshot path
    pub fn new(store_path: impl AsRef<Path>, sync_mode: bool) -> Self {
        Self {
            inner: MemoryStorage::new(),
            store_path: store_path.as_ref().to_path_buf(),
            sync_mode,
            dump_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Snapshot file location
    pub fn path(&self) -> &Path {
        &self.store_path
    }

    /// Deep copy of the current state
    pub fn snapshot(&self) -> HashMap<String, Record> {
        self.inner.snapshot()
    }

    /// Serialize the current snapshot and rewrite the store file.
    ///
    /// Truncate-and-rewrite. The dump lock is held from snapshot-taking
    /// through the write, so concurrent dumps land on disk in snapshot
    /// order and a stale snapshot can never overwrite a newer one.
    #[instrument(skip(self), fields(path = %self.store_path.display()))]
    pub async fn dump(&self) -> PulseResult<()> {
        let _guard = self.dump_lock.lock().await;
        let snapshot: Snapshot = self
            .inner
            .snapshot()
            .iter()
            .map(|(key, record)| (key.clone(), SnapshotEntry::from_record(record)))
            .collect();
        let payload = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| PulseError::storage(format!("encode snapshot: {}", e)))?;

        if let Some(parent) = self.store_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PulseError::io(format!("create store directory: {}", e)))?;
        }
        fs::write(&self.store_path, payload)
            .await
            .map_err(|e| PulseError::io(format!("write snapshot: {}", e)))?;

        tracing::debug!(records = snapshot.len(), "snapshot dumped");
        Ok(())
    }

    /// Load the snapshot file into the store, replacing current state.
    ///
    /// A missing file is a cold start, not an error; any other I/O or
    /// decode failure propagates.
    #[instrument(skip(self), fields(path = %self.store_path.display()))]
    pub async fn restore(&self) -> PulseResult<()> {
        let payload = match fs::read(&self.store_path).await {
            Ok(payload) => payload,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no snapshot file, starting empty");
                return Ok(());
            }
            Err(e) => return Err(PulseError::io(format!("read snapshot: {}", e))),
        };

        let snapshot: Snapshot = serde_json::from_slice(&payload)
            .map_err(|e| PulseError::storage(format!("decode snapshot: {}", e)))?;
        let mut records = HashMap::with_capacity(snapshot.len());
        for (key, entry) in &snapshot {
            records.insert(key.clone(), entry.to_record()?);
        }

        info!(records = records.len(), "snapshot restored");
        self.inner.replace(records);
        Ok(())
    }
}

#[async_trait]
impl MetricStorage for FileStorage {
    async fn push(&self, key: &str, record: Record) -> PulseResult<()> {
        self.inner.push(key, record).await?;
        if self.sync_mode {
            self.dump().await?;
        }
        Ok(())
    }

    async fn push_batch(&self, batch: HashMap<String, Record>) -> PulseResult<()> {
        self.inner.push_batch(batch).await?;
        if self.sync_mode {
            self.dump().await?;
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> PulseResult<Option<Record>> {
        self.inner.get(key).await
    }

    async fn get_all(&self) -> PulseResult<Vec<Record>> {
        self.inner.get_all().await
    }

    async fn close(&self) -> PulseResult<()> {
        self.dump().await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
