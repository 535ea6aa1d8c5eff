//! Document store: chat sessions and their message subcollections.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roulette_common::{ChatSession, Message};

use crate::error::AppError;

/// Top-level chat collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatCollection {
    /// Sessions created at match time, discarded unless saved
    Temporary,
    /// Saved sessions
    Permanent,
}

impl ChatCollection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatCollection::Temporary => "temp_chats",
            ChatCollection::Permanent => "direct_messages",
        }
    }
}

/// Condition checked before any op of a batch is applied
#[derive(Debug, Clone, PartialEq)]
pub enum DocPrecondition {
    /// The session document exists
    ChatExists {
        collection: ChatCollection,
        chat_id: String,
    },
    /// Every stored message of the session has one of these ids
    MessagesWithin {
        collection: ChatCollection,
        chat_id: String,
        ids: Vec<String>,
    },
}

/// One write inside a batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Write the session only if no session with that id exists
    CreateChat {
        collection: ChatCollection,
        session: ChatSession,
    },
    SetChat {
        collection: ChatCollection,
        session: ChatSession,
    },
    /// Update the last message summary; skipped when the session is absent
    TouchChat {
        collection: ChatCollection,
        chat_id: String,
        last_message: String,
        last_message_time: DateTime<Utc>,
    },
    DeleteChat {
        collection: ChatCollection,
        chat_id: String,
    },
    SetMessage {
        collection: ChatCollection,
        chat_id: String,
        message: Message,
    },
    DeleteMessage {
        collection: ChatCollection,
        chat_id: String,
        message_id: String,
    },
}

/// All-or-nothing group of document writes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub preconditions: Vec<DocPrecondition>,
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, precondition: DocPrecondition) {
        self.preconditions.push(precondition);
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Trait for document store backends
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a session document
    async fn chat(
        &self,
        collection: ChatCollection,
        chat_id: &str,
    ) -> Result<Option<ChatSession>, AppError>;

    /// Read every message of a session in insertion order
    async fn messages(
        &self,
        collection: ChatCollection,
        chat_id: &str,
    ) -> Result<Vec<Message>, AppError>;

    /// Apply every op of the batch, or none of them. Returns false when a
    /// precondition failed and nothing was written.
    async fn commit(&self, batch: WriteBatch) -> Result<bool, AppError>;
}
