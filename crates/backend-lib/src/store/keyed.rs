//! Keyed store: queue entries and match records.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roulette_common::{Match, QueueEntry, QueueStatus, Uid};
use tokio::sync::broadcast;

use crate::error::AppError;

/// Condition that must hold at commit time
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// Queue entry exists with this status
    StatusIs { uid: Uid, status: QueueStatus },
    /// Queue entry exists and still carries this join timestamp
    JoinedAt { uid: Uid, joined_at: DateTime<Utc> },
    /// Match record points at this chat, or is absent when `None`
    MatchChatIs { uid: Uid, chat_id: Option<String> },
    /// Queue entry is absent or not Connected
    NotConnected { uid: Uid },
}

/// Single write inside a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create or replace a queue entry; a new key goes to the back of the queue
    PutQueueEntry { entry: QueueEntry },
    /// Set the status field; skipped when the entry is absent
    SetStatus { uid: Uid, status: QueueStatus },
    PutMatch { uid: Uid, record: Match },
    DeleteMatch { uid: Uid },
    DeleteQueueEntry { uid: Uid },
}

/// Atomic conditional update over several keys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    pub preconditions: Vec<Precondition>,
    pub mutations: Vec<Mutation>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn apply(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }
}

/// Result of a conditional commit
#[derive(Debug, Clone, PartialEq)]
pub enum TxOutcome {
    Committed,
    /// Nothing was written; carries the first precondition that failed
    Aborted(Precondition),
}

impl TxOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TxOutcome::Committed)
    }
}

/// What happened to a queue entry
#[derive(Debug, Clone, PartialEq)]
pub enum QueueChange {
    /// Created or updated; carries the new state
    Written(QueueEntry),
    /// Removed; carries the last state
    Deleted(QueueEntry),
}

/// Change notification for one queue key
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEvent {
    pub uid: Uid,
    pub change: QueueChange,
}

/// Trait for keyed store backends
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Read one queue entry
    async fn queue_entry(&self, uid: &str) -> Result<Option<QueueEntry>, AppError>;

    /// Every queue entry in insertion order
    async fn queue_snapshot(&self) -> Result<Vec<QueueEntry>, AppError>;

    /// Create or replace a queue entry without conditions. Status changes
    /// on live entries go through `commit` instead.
    async fn put_queue_entry(&self, entry: QueueEntry) -> Result<(), AppError>;

    /// Read one match record
    async fn match_record(&self, uid: &str) -> Result<Option<Match>, AppError>;

    /// Check every precondition and apply every mutation, atomically
    async fn commit(&self, tx: Transaction) -> Result<TxOutcome, AppError>;

    /// Subscribe to queue entry changes
    fn subscribe(&self) -> broadcast::Receiver<QueueEvent>;
}
