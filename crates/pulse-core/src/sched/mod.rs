//! Background loops driving polling, reporting and persistence.
//!
//! Each loop runs on its own fixed-interval timer in an independent task,
//! shares one cancellation signal for shutdown, and contains faults at the
//! tick boundary: one bad tick is logged, the loop keeps ticking.

mod migrate;

pub use migrate::{
    migrate_with_budget, migrate_with_retry, Migrator, MIGRATE_ATTEMPTS, MIGRATE_BACKOFF,
};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::{PulseError, PulseResult};
use crate::storage::FileStorage;

/// Samples current metric readings into storage. The actual process/OS
/// sampling lives outside this crate; the scheduler only drives it.
#[async_trait]
pub trait Sampler: Send + Sync {
    async fn sample(&self) -> PulseResult<()>;
}

/// Builds and ships one batch of accumulated metrics.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self) -> PulseResult<()>;
}

/// Owns the background tasks and their shared cancellation signal.
pub struct Scheduler {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Token shared with every loop; cancelling it stops all ticking
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Poll loop: run the sampler every `period`, bounded by `tick_timeout`
    pub fn spawn_poll(
        &mut self,
        sampler: Arc<dyn Sampler>,
        period: Duration,
        tick_timeout: Duration,
    ) {
        self.spawn_loop("poll", period, move || {
            let sampler = sampler.clone();
            async move { bounded(tick_timeout, sampler.sample()).await }
        });
    }

    /// Report loop: ship a batch every `period`, bounded by `tick_timeout`
    pub fn spawn_report(
        &mut self,
        reporter: Arc<dyn Reporter>,
        period: Duration,
        tick_timeout: Duration,
    ) {
        self.spawn_loop("report", period, move || {
            let reporter = reporter.clone();
            async move { bounded(tick_timeout, reporter.report()).await }
        });
    }

    /// Dump loop for file-backed storage: snapshot to disk every `period`
    pub fn spawn_dump(&mut self, storage: Arc<FileStorage>, period: Duration) {
        self.spawn_loop("dump", period, move || {
            let storage = storage.clone();
            async move { storage.dump().await }
        });
    }

    fn spawn_loop<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = PulseResult<()>> + Send,
    {
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first interval tick completes immediately; consume it so
            // the loop fires one period after start, like a wall ticker.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => supervise(name, tick()).await,
                }
            }
        });
        self.tasks.push(handle);
    }

    /// Stop ticking and wait up to `grace` for in-flight ticks to finish;
    /// whatever is still running past that point is abandoned.
    pub async fn shutdown(mut self, grace: Duration) {
        self.cancel.cancel();
        let aborts: Vec<_> = self.tasks.iter().map(|t| t.abort_handle()).collect();
        let joined = futures::future::join_all(self.tasks.drain(..));
        if timeout(grace, joined).await.is_err() {
            warn!("background loops exceeded the shutdown grace period, aborting");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Bound a tick body by its timeout budget
async fn bounded<F>(budget: Duration, fut: F) -> PulseResult<()>
where
    F: Future<Output = PulseResult<()>>,
{
    match timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(PulseError::timeout(budget.as_secs())),
    }
}

/// Run one tick body, converting any failure or runtime fault into a log
/// line local to this tick.
async fn supervise<F>(name: &'static str, fut: F)
where
    F: Future<Output = PulseResult<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(task = name, error = %err, "tick failed"),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(task = name, panic = %message, "tick panicked");
        }
    }
}
