// ============================
// crates/backend-lib/src/queue.rs
// ============================
//! Queue adapter over the keyed store.
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use roulette_common::{JoinQueueRequest, QueueEntry, QueueStatus};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::AppError;
use crate::store::{KeyedStore, Mutation, Precondition, QueueEvent, Transaction};
use crate::validation;

/// Gender recorded when the client leaves it out
pub const DEFAULT_GENDER: &str = "other";

const MAX_JOIN_ATTEMPTS: usize = 3;

/// Read/write access to queue entries and their change feed
#[derive(Clone)]
pub struct QueueStore {
    keyed: Arc<dyn KeyedStore>,
}

impl QueueStore {
    pub fn new(keyed: Arc<dyn KeyedStore>) -> Self {
        Self { keyed }
    }

    /// Start searching. A user who is already connected keeps their entry;
    /// the write is conditional so a match committed concurrently is never
    /// reverted to Searching.
    pub async fn join(&self, uid: &str, request: JoinQueueRequest) -> Result<QueueEntry, AppError> {
        validation::validate_join_request(&request)?;

        let gender = request
            .gender
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| DEFAULT_GENDER.to_string());
        let interests: BTreeSet<String> = request
            .interests
            .iter()
            .map(|i| i.trim().to_lowercase())
            .collect();

        for _ in 0..MAX_JOIN_ATTEMPTS {
            let entry = QueueEntry {
                uid: uid.to_string(),
                name: request.name.trim().to_string(),
                age: request.age,
                gender: gender.clone(),
                interests: interests.clone(),
                status: QueueStatus::Searching,
                joined_at: Utc::now(),
            };
            let tx = Transaction::new()
                .require(Precondition::NotConnected {
                    uid: uid.to_string(),
                })
                .apply(Mutation::PutQueueEntry {
                    entry: entry.clone(),
                });

            if self.keyed.commit(tx).await?.is_committed() {
                info!(uid, interests = entry.interests.len(), "user joined queue");
                return Ok(entry);
            }

            // Connected, unless the entry was deleted after the check
            if let Some(existing) = self.keyed.queue_entry(uid).await? {
                if existing.status == QueueStatus::Connected {
                    debug!(uid, "join ignored, user is connected");
                    return Ok(existing);
                }
            }
        }

        Err(AppError::Internal(format!("queue entry for {uid} kept changing")))
    }

    /// Stop searching; deleting an absent entry is a no-op
    pub async fn leave(&self, uid: &str) -> Result<(), AppError> {
        let tx = Transaction::new().apply(Mutation::DeleteQueueEntry {
            uid: uid.to_string(),
        });
        self.keyed.commit(tx).await?;
        info!(uid, "user left queue");
        Ok(())
    }

    /// Delete `entry` only if it has not been rewritten since it was read.
    /// Returns whether the delete went through.
    pub async fn evict(&self, entry: &QueueEntry) -> Result<bool, AppError> {
        let tx = Transaction::new()
            .require(Precondition::JoinedAt {
                uid: entry.uid.clone(),
                joined_at: entry.joined_at,
            })
            .apply(Mutation::DeleteQueueEntry {
                uid: entry.uid.clone(),
            });
        Ok(self.keyed.commit(tx).await?.is_committed())
    }

    pub async fn entry(&self, uid: &str) -> Result<Option<QueueEntry>, AppError> {
        self.keyed.queue_entry(uid).await
    }

    /// Full queue in insertion order
    pub async fn snapshot(&self) -> Result<Vec<QueueEntry>, AppError> {
        self.keyed.queue_snapshot().await
    }

    /// Searching entries other than `uid`, in insertion order
    pub async fn candidates_for(&self, uid: &str) -> Result<Vec<QueueEntry>, AppError> {
        let candidates = self
            .snapshot()
            .await?
            .into_iter()
            .filter(|e| e.uid != uid && e.status == QueueStatus::Searching)
            .collect();
        Ok(candidates)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.keyed.subscribe()
    }
}
