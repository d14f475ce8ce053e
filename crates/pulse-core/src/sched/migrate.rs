//! Start-up schema migration with a fixed retry budget

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{PulseError, PulseResult};

/// Attempts before giving up on the migrator connection
pub const MIGRATE_ATTEMPTS: u32 = 20;

/// Fixed pause between attempts
pub const MIGRATE_BACKOFF: Duration = Duration::from_secs(1);

/// Applies pending schema migrations. Nothing pending is success.
#[async_trait]
pub trait Migrator: Send + Sync {
    async fn migrate(&self) -> PulseResult<()>;
}

/// Run migration under the standard start-up budget.
///
/// Exhausting the budget is a fatal start-up error for the caller.
pub async fn migrate_with_retry(migrator: &dyn Migrator) -> PulseResult<()> {
    migrate_with_budget(migrator, MIGRATE_ATTEMPTS, MIGRATE_BACKOFF).await
}

/// Retry loop with an explicit budget, split out for tests
pub async fn migrate_with_budget(
    migrator: &dyn Migrator,
    attempts: u32,
    backoff: Duration,
) -> PulseResult<()> {
    let mut last_error = PulseError::database("migration never attempted");
    for attempt in 1..=attempts {
        match migrator.migrate().await {
            Ok(()) => {
                info!(attempt, "database migration complete");
                return Ok(());
            }
            Err(err) => {
                warn!(attempt, error = %err, "database migration attempt failed");
                last_error = err;
                if attempt < attempts {
                    sleep(backoff).await;
                }
            }
        }
    }
    Err(PulseError::database(format!(
        "migration failed after {} attempts: {}",
        attempts, last_error
    )))
}
