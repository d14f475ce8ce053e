//! In-memory metric storage

use std::any::Any;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::PulseResult;
use crate::metric::Record;
use crate::storage::MetricStorage;

/// Key-to-record map behind a single exclusive lock.
///
/// The lock covers the whole read-modify-write of a push, so counter
/// accumulation never loses updates under concurrent callers, and a batch
/// is applied in one critical section so snapshot reads never observe it
/// half-done.
pub struct MemoryStorage {
    records: Mutex<HashMap<String, Record>>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Deep, independent copy of the current state
    pub fn snapshot(&self) -> HashMap<String, Record> {
        self.records.lock().clone()
    }

    /// Replace the whole map, used by snapshot restore
    pub(super) fn replace(&self, records: HashMap<String, Record>) {
        *self.records.lock() = records;
    }

    fn merge_into(map: &mut HashMap<String, Record>, key: &str, record: Record) {
        let merged = match map.get(key) {
            Some(existing) => existing.merged_with(&record),
            None => record,
        };
        map.insert(key.to_string(), merged);
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricStorage for MemoryStorage {
    async fn push(&self, key: &str, record: Record) -> PulseResult<()> {
        let mut records = self.records.lock();
        Self::merge_into(&mut records, key, record);
        Ok(())
    }

    async fn push_batch(&self, batch: HashMap<String, Record>) -> PulseResult<()> {
        let mut records = self.records.lock();
        for (key, record) in batch {
            Self::merge_into(&mut records, &key, record);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> PulseResult<Option<Record>> {
        Ok(self.records.lock().get(key).cloned())
    }

    async fn get_all(&self) -> PulseResult<Vec<Record>> {
        Ok(self.records.lock().values().cloned().collect())
    }

    async fn close(&self) -> PulseResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
