//! Pulse Core Library
//!
//! Core of the Pulse secure metrics engine: the metric value model and its
//! wire encoding, pluggable storage backends, the signing/encryption
//! protocol for data in flight, and the background scheduling that drives
//! polling, reporting and persistence.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod health;
pub mod metric;
pub mod net;
pub mod sched;
pub mod storage;

// Re-export commonly used types
pub use config::{AgentConfig, ServerConfig};
pub use crypto::{Decrypter, Encrypter, Signer};
pub use error::{PulseError, PulseResult};
pub use health::HealthChecker;
pub use metric::{MetricKind, MetricValue, Record, RecordWire};
pub use net::TrustedSubnet;
pub use sched::{Migrator, Reporter, Sampler, Scheduler};
pub use storage::{
    DatabaseStorage, FileStorage, MemoryStorage, MetricStorage, StorageBackend,
};
