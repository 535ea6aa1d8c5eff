// ============================
// crates/backend-lib/src/engine.rs
// ============================
//! Partner selection.
//!
//! Selection is strictly positional: candidates are scanned in queue
//! insertion order and the first acceptable one wins. Early arrivals are
//! therefore preferred and nothing prevents a late arrival from waiting
//! while newer compatible users keep pairing up.
use std::sync::Arc;

use metrics::counter;
use roulette_common::{QueueEntry, QueueStatus};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::lifecycle::{MatchLifecycle, MatchOutcome};
use crate::metrics::MATCH_NO_CANDIDATE;
use crate::queue::QueueStore;

/// Whether two ages are within `max_gap` years of each other
pub fn ages_compatible(a: u32, b: u32, max_gap: u32) -> bool {
    a.abs_diff(b) <= max_gap
}

/// Whether two users share at least one interest
pub fn shares_interest(a: &QueueEntry, b: &QueueEntry) -> bool {
    a.interests.iter().any(|i| b.interests.contains(i))
}

/// Pick a partner for `user`.
///
/// `candidates` must exclude `user` and hold only searching entries. The
/// strict pass wants age and a shared interest; the relaxed pass wants age
/// only. Both scan the same order.
pub fn select_partner<'a>(
    user: &QueueEntry,
    candidates: &'a [QueueEntry],
    max_age_gap: u32,
) -> Option<&'a QueueEntry> {
    let age_ok = |c: &&QueueEntry| ages_compatible(user.age, c.age, max_age_gap);

    candidates
        .iter()
        .filter(age_ok)
        .find(|c| shares_interest(user, c))
        .or_else(|| candidates.iter().find(age_ok))
}

/// Runs a matching attempt for every queue write
pub struct Matchmaker {
    queue: QueueStore,
    lifecycle: Arc<MatchLifecycle>,
    max_age_gap: u32,
}

impl Matchmaker {
    pub fn new(queue: QueueStore, lifecycle: Arc<MatchLifecycle>, max_age_gap: u32) -> Self {
        Self {
            queue,
            lifecycle,
            max_age_gap,
        }
    }

    /// React to a queue write. Anything but a searching entry is ignored.
    pub async fn on_queue_entry_write(
        &self,
        uid: &str,
        entry: Option<&QueueEntry>,
    ) -> Result<Option<MatchOutcome>, AppError> {
        let Some(user) = entry.filter(|e| e.status == QueueStatus::Searching) else {
            return Ok(None);
        };

        let candidates = self.queue.candidates_for(uid).await?;
        let Some(partner) = select_partner(user, &candidates, self.max_age_gap) else {
            debug!(uid, waiting = candidates.len(), "no compatible partner yet");
            counter!(MATCH_NO_CANDIDATE).increment(1);
            return Ok(None);
        };

        let outcome = self.lifecycle.create_match(user, partner).await?;
        match &outcome {
            MatchOutcome::Created { chat_id, session_ready } => {
                info!(uid, partner = %partner.uid, chat_id, session_ready, "match created");
            },
            MatchOutcome::Contended => {
                debug!(uid, partner = %partner.uid, "match lost to a concurrent attempt");
            },
        }
        Ok(Some(outcome))
    }

    /// Event entry point: failures are logged and the attempt is dropped
    pub async fn handle_write(&self, uid: &str, entry: Option<&QueueEntry>) {
        if let Err(e) = self.on_queue_entry_write(uid, entry).await {
            warn!(uid, error = %e, "matching attempt failed");
        }
    }
}
