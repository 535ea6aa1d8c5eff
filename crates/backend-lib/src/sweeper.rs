// ============================
// crates/backend-lib/src/sweeper.rs
// ============================
//! Periodic eviction of stale queue entries.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use metrics::counter;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::leave::{LeaveHandler, LeaveOutcome};
use crate::metrics::QUEUE_EVICTED;
use crate::queue::QueueStore;

/// Counters from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub evicted: usize,
    pub dissolved: usize,
}

pub struct CleanupSweeper {
    queue: QueueStore,
    leave: Arc<LeaveHandler>,
    ttl: TimeDelta,
    interval: Duration,
}

impl CleanupSweeper {
    pub fn new(queue: QueueStore, leave: Arc<LeaveHandler>, ttl: TimeDelta, interval: Duration) -> Self {
        Self {
            queue,
            leave,
            ttl,
            interval,
        }
    }

    /// Evict every entry that joined more than the TTL before `now`.
    ///
    /// Each eviction is conditional on the entry being unchanged since the
    /// scan, and is followed by the leave cascade so no partner is left
    /// connected to an evicted user.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let mut report = SweepReport::default();
        let Some(cutoff) = now.checked_sub_signed(self.ttl) else {
            warn!(ttl_secs = self.ttl.num_seconds(), "queue ttl out of range, sweep skipped");
            return Ok(report);
        };

        for entry in self.queue.snapshot().await? {
            report.scanned += 1;
            if entry.joined_at >= cutoff {
                continue;
            }
            if !self.queue.evict(&entry).await? {
                debug!(uid = %entry.uid, "entry changed during sweep, kept");
                continue;
            }
            report.evicted += 1;
            counter!(QUEUE_EVICTED).increment(1);

            match self.leave.on_queue_entry_deleted(&entry.uid).await {
                Ok(LeaveOutcome::Dissolved { .. }) => report.dissolved += 1,
                Ok(LeaveOutcome::Unmatched) => {},
                Err(e) => warn!(uid = %entry.uid, error = %e, "cascade after eviction failed"),
            }
        }

        Ok(report)
    }

    /// Sweep on every interval tick until `shutdown` flips
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => match self.sweep_once(Utc::now()).await {
                    Ok(report) if report.evicted > 0 => {
                        info!(evicted = report.evicted, dissolved = report.dissolved, "queue sweep finished");
                    },
                    Ok(_) => debug!("queue sweep found nothing stale"),
                    Err(e) => warn!(error = %e, "queue sweep failed"),
                },
            }
        }
        debug!("cleanup sweeper stopped");
    }
}
