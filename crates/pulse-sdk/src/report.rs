//! Report-loop glue between storage and the HTTP exporter

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use pulse_core::error::PulseResult;
use pulse_core::sched::Reporter;
use pulse_core::storage::MetricStorage;

use crate::exporter::HttpExporter;

/// Ships the current contents of storage as one batch per report tick.
///
/// The exporter is always reset after a terminal state so the next cycle
/// starts from an empty buffer on the same connection.
pub struct ReportTask {
    storage: Arc<dyn MetricStorage>,
    exporter: Mutex<HttpExporter>,
    deadline: Duration,
}

impl ReportTask {
    pub fn new(storage: Arc<dyn MetricStorage>, exporter: HttpExporter, deadline: Duration) -> Self {
        Self {
            storage,
            exporter: Mutex::new(exporter),
            deadline,
        }
    }
}

#[async_trait]
impl Reporter for ReportTask {
    async fn report(&self) -> PulseResult<()> {
        let records = self.storage.get_all().await?;
        if records.is_empty() {
            debug!("nothing accumulated, skipping report tick");
            return Ok(());
        }

        let mut exporter = self.exporter.lock().await;
        for record in &records {
            exporter.add(record.name(), record.value());
        }
        let result = exporter.send(self.deadline).await;
        exporter.reset();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::metric::{MetricValue, Record};
    use pulse_core::storage::MemoryStorage;

    #[tokio::test]
    async fn empty_storage_skips_the_tick() {
        let storage = Arc::new(MemoryStorage::new());
        let task = ReportTask::new(
            storage,
            HttpExporter::new("127.0.0.1:1").unwrap(),
            Duration::from_secs(1),
        );
        task.report().await.unwrap();
    }

    #[tokio::test]
    async fn failed_report_still_resets_the_exporter() {
        let storage = Arc::new(MemoryStorage::new());
        let record = Record::new("PollCount", MetricValue::Counter(1));
        storage.push(&record.storage_key(), record).await.unwrap();

        let task = ReportTask::new(
            storage,
            HttpExporter::new("127.0.0.1:1").unwrap(),
            Duration::from_secs(1),
        );
        assert!(task.report().await.is_err());

        let exporter = task.exporter.lock().await;
        assert!(exporter.error().is_none());
        assert_eq!(exporter.buffered(), 0);
    }
}
