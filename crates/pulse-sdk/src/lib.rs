//! Pulse SDK
//!
//! Agent-side batch exporters for the Pulse metrics engine: an HTTP+JSON
//! client with signing, gzip compression and optional RSA encryption, and
//! an RPC variant over an injected typed transport.

pub mod exporter;
pub mod report;
pub mod rpc;

pub use exporter::HttpExporter;
pub use report::ReportTask;
pub use rpc::{BatchRpc, RpcExporter};

// Re-export commonly used types from core
pub use pulse_core::{
    error::{PulseError, PulseResult},
    metric::{MetricKind, MetricValue, Record, RecordWire},
};
