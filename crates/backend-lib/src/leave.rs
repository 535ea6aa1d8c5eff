// ============================
// crates/backend-lib/src/leave.rs
// ============================
//! Cascade run when a queue entry disappears.
use std::sync::Arc;

use roulette_common::Uid;
use tracing::{info, warn};

use crate::chats::ChatSessionStore;
use crate::error::AppError;
use crate::lifecycle::MatchLifecycle;
use crate::queue::QueueStore;

/// What a departure did to the departed user's match
#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    /// The user was not matched
    Unmatched,
    /// The match was dissolved and the partner returned to searching
    Dissolved {
        partner_uid: Uid,
        chat_id: String,
        session_discarded: bool,
    },
}

pub struct LeaveHandler {
    queue: QueueStore,
    lifecycle: Arc<MatchLifecycle>,
    chats: Arc<ChatSessionStore>,
}

impl LeaveHandler {
    pub fn new(
        queue: QueueStore,
        lifecycle: Arc<MatchLifecycle>,
        chats: Arc<ChatSessionStore>,
    ) -> Self {
        Self {
            queue,
            lifecycle,
            chats,
        }
    }

    /// Dissolve the match of a user whose queue entry was deleted.
    ///
    /// If the user already rejoined, only a match older than the new entry
    /// is dissolved.
    pub async fn on_queue_entry_deleted(&self, uid: &str) -> Result<LeaveOutcome, AppError> {
        let rejoined_at = self.queue.entry(uid).await?.map(|e| e.joined_at);

        let Some(record) = self.lifecycle.teardown(uid, false, rejoined_at).await? else {
            return Ok(LeaveOutcome::Unmatched);
        };

        let session_discarded = self.chats.discard_temporary(&record.chat_id).await?;
        info!(
            uid,
            partner = %record.partner_uid,
            chat_id = %record.chat_id,
            session_discarded,
            "partner returned to queue after departure"
        );
        Ok(LeaveOutcome::Dissolved {
            partner_uid: record.partner_uid,
            chat_id: record.chat_id,
            session_discarded,
        })
    }

    /// Event entry point: failures are logged and dropped
    pub async fn handle_delete(&self, uid: &str) {
        if let Err(e) = self.on_queue_entry_deleted(uid).await {
            warn!(uid, error = %e, "leave cascade failed");
        }
    }
}
