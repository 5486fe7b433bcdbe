//! Fixed-interval trigger loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::{Pipeline, RunOutcome};

/// Default trigger interval (every ten minutes)
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);

/// Counters over the scheduler's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Calls [`Pipeline::run_once`] immediately and then every interval
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, interval: Duration) -> Self {
        Self {
            pipeline,
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> SchedulerStats {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves. A run in progress is abandoned at that
    /// point; the registry keeps its last complete write.
    pub async fn run_until<F>(&self, shutdown: F) -> SchedulerStats
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut stats = SchedulerStats::default();
        info!("Scheduler started, running every {}s", self.interval.as_secs());

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Shutdown requested during a run");
                    break;
                }
                result = self.pipeline.run_once() => match result {
                    Ok(RunOutcome::Completed(_)) => stats.completed += 1,
                    Ok(RunOutcome::Skipped) => stats.skipped += 1,
                    Err(e) => {
                        stats.failed += 1;
                        error!("Run failed: {}", e);
                    }
                },
            }
        }

        info!(
            "Scheduler stopped: {} completed, {} skipped, {} failed",
            stats.completed, stats.skipped, stats.failed
        );
        stats
    }
}
