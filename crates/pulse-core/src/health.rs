//! Storage health verification for the request-handling layer

use std::time::Duration;

use tokio::time::timeout;

use crate::error::{PulseError, PulseResult};
use crate::storage::StorageBackend;

/// Delegates liveness checks to backends that support them.
pub struct HealthChecker {
    backend: StorageBackend,
}

impl HealthChecker {
    pub fn new(backend: StorageBackend) -> Self {
        Self { backend }
    }

    /// Ping the storage backend under a deadline.
    ///
    /// Memory and file backends report `HealthCheckNotSupported`; the
    /// database backend's ping failure or an expired deadline propagates.
    pub async fn check_storage(&self, deadline: Duration) -> PulseResult<()> {
        match timeout(deadline, self.backend.ping()).await {
            Ok(result) => result,
            Err(_) => Err(PulseError::timeout(deadline.as_secs())),
        }
    }
}
