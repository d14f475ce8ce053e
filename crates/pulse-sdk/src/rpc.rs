//! RPC batch exporter over an injected typed transport

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use pulse_core::error::{PulseError, PulseResult};
use pulse_core::metric::{MetricValue, Record, RecordWire};

/// Typed batch transport the RPC exporter ships through.
///
/// The concrete RPC stack lives outside this crate; implementations own
/// their connection and its lifetime, handed in at construction.
#[async_trait]
pub trait BatchRpc: Send + Sync {
    async fn send_batch(&self, batch: Vec<RecordWire>) -> PulseResult<()>;
}

/// Fail-fast batch accumulator over a typed RPC transport.
///
/// Same accumulate/fail-fast/send contract as [`HttpExporter`], without
/// compression or encryption; the transport provides its own wire
/// efficiency and security.
///
/// [`HttpExporter`]: crate::HttpExporter
pub struct RpcExporter<T: BatchRpc> {
    transport: T,
    buffer: Vec<RecordWire>,
    error: Option<PulseError>,
}

impl<T: BatchRpc> RpcExporter<T> {
    /// Create an exporter owning the given transport handle
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: Vec::new(),
            error: None,
        }
    }

    /// Append one update request; a no-op after the first failure
    pub fn add(&mut self, name: &str, value: MetricValue) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        self.buffer.push(Record::new(name, value).to_wire(None));
        self
    }

    /// Issue one batch call bounded by `deadline`
    pub async fn send(&mut self, deadline: Duration) -> PulseResult<()> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let result = self.try_send(deadline).await;
        if let Err(err) = &result {
            self.error = Some(err.clone());
        }
        result
    }

    async fn try_send(&self, deadline: Duration) -> PulseResult<()> {
        if self.buffer.is_empty() {
            return Err(PulseError::incomplete("export batch is empty"));
        }
        match timeout(deadline, self.transport.send_batch(self.buffer.clone())).await {
            Ok(result) => result,
            Err(_) => Err(PulseError::timeout(deadline.as_secs())),
        }
    }

    /// The first recorded error, wrapped in the terminal export form
    pub fn error(&self) -> Option<PulseError> {
        self.error.clone().map(PulseError::export)
    }

    /// Clear buffer and error state; the transport handle stays open
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRpc {
        batches: Mutex<Vec<Vec<RecordWire>>>,
        fail: bool,
    }

    #[async_trait]
    impl BatchRpc for RecordingRpc {
        async fn send_batch(&self, batch: Vec<RecordWire>) -> PulseResult<()> {
            if self.fail {
                return Err(PulseError::transport("rpc channel closed"));
            }
            self.batches.lock().unwrap().push(batch);
            Ok(())
        }
    }

    #[tokio::test]
    async fn ships_one_batch_call() {
        let mut exporter = RpcExporter::new(RecordingRpc::default());
        exporter
            .add("PollCount", MetricValue::Counter(10))
            .add("Alloc", MetricValue::Gauge(11.123));
        exporter.send(Duration::from_secs(1)).await.unwrap();

        let batches = exporter.transport.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][1].value, Some(11.123));
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let mut exporter = RpcExporter::new(RecordingRpc::default());
        assert!(matches!(
            exporter.send(Duration::from_secs(1)).await,
            Err(PulseError::IncompleteRequest(_))
        ));
    }

    #[tokio::test]
    async fn failure_short_circuits_until_reset() {
        let mut exporter = RpcExporter::new(RecordingRpc {
            batches: Mutex::new(Vec::new()),
            fail: true,
        });
        exporter.add("PollCount", MetricValue::Counter(1));
        assert!(exporter.send(Duration::from_secs(1)).await.is_err());

        exporter.add("Alloc", MetricValue::Gauge(1.0));
        assert_eq!(exporter.buffer.len(), 1);
        assert!(exporter
            .error()
            .unwrap()
            .to_string()
            .starts_with("metrics export failed"));

        exporter.reset();
        assert!(exporter.error().is_none());
        assert!(exporter.buffer.is_empty());
    }
}
