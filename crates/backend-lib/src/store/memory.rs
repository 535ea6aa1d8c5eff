//! In-process store implementations.
//!
//! Every commit runs under a single lock, which gives the same all-or-nothing
//! guarantee a remote transactional backend would.
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use roulette_common::{ChatSession, Match, Message, QueueEntry, QueueStatus, Uid};
use tokio::sync::broadcast;

use super::document::{ChatCollection, DocPrecondition, DocumentStore, WriteBatch, WriteOp};
use super::keyed::{
    KeyedStore, Mutation, Precondition, QueueChange, QueueEvent, Transaction, TxOutcome,
};
use crate::error::AppError;

struct QueueSlot {
    seq: u64,
    entry: QueueEntry,
}

#[derive(Default)]
struct KeyedState {
    next_seq: u64,
    queue: HashMap<Uid, QueueSlot>,
    matches: HashMap<Uid, Match>,
}

impl KeyedState {
    fn holds(&self, precondition: &Precondition) -> bool {
        match precondition {
            Precondition::StatusIs { uid, status } => self
                .queue
                .get(uid)
                .is_some_and(|slot| slot.entry.status == *status),
            Precondition::JoinedAt { uid, joined_at } => self
                .queue
                .get(uid)
                .is_some_and(|slot| slot.entry.joined_at == *joined_at),
            Precondition::MatchChatIs { uid, chat_id } => {
                self.matches.get(uid).map(|m| &m.chat_id) == chat_id.as_ref()
            },
            Precondition::NotConnected { uid } => self
                .queue
                .get(uid)
                .map_or(true, |slot| slot.entry.status != QueueStatus::Connected),
        }
    }

    fn insert_entry(&mut self, entry: QueueEntry) {
        match self.queue.get_mut(&entry.uid) {
            Some(slot) => slot.entry = entry,
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.queue.insert(entry.uid.clone(), QueueSlot { seq, entry });
            },
        }
    }
}

/// Keyed store kept in process memory
pub struct MemoryKeyedStore {
    state: Mutex<KeyedState>,
    events: broadcast::Sender<QueueEvent>,
}

impl MemoryKeyedStore {
    /// Create an empty store whose change feed buffers `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            state: Mutex::new(KeyedState::default()),
            events,
        }
    }

    fn publish(&self, uid: &str, change: QueueChange) {
        // No subscribers is not an error
        let _ = self.events.send(QueueEvent {
            uid: uid.to_string(),
            change,
        });
    }
}

impl Default for MemoryKeyedStore {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl KeyedStore for MemoryKeyedStore {
    async fn queue_entry(&self, uid: &str) -> Result<Option<QueueEntry>, AppError> {
        Ok(self.state.lock().queue.get(uid).map(|slot| slot.entry.clone()))
    }

    async fn queue_snapshot(&self) -> Result<Vec<QueueEntry>, AppError> {
        let state = self.state.lock();
        let mut slots: Vec<&QueueSlot> = state.queue.values().collect();
        slots.sort_by_key(|slot| slot.seq);
        Ok(slots.into_iter().map(|slot| slot.entry.clone()).collect())
    }

    async fn put_queue_entry(&self, entry: QueueEntry) -> Result<(), AppError> {
        let mut state = self.state.lock();
        let uid = entry.uid.clone();
        state.insert_entry(entry.clone());
        self.publish(&uid, QueueChange::Written(entry));
        Ok(())
    }

    async fn match_record(&self, uid: &str) -> Result<Option<Match>, AppError> {
        Ok(self.state.lock().matches.get(uid).cloned())
    }

    async fn commit(&self, tx: Transaction) -> Result<TxOutcome, AppError> {
        let mut state = self.state.lock();

        if let Some(failed) = tx.preconditions.iter().find(|p| !state.holds(p)) {
            return Ok(TxOutcome::Aborted(failed.clone()));
        }

        for mutation in tx.mutations {
            match mutation {
                Mutation::PutQueueEntry { entry } => {
                    let uid = entry.uid.clone();
                    state.insert_entry(entry.clone());
                    self.publish(&uid, QueueChange::Written(entry));
                },
                Mutation::SetStatus { uid, status } => {
                    let Some(slot) = state.queue.get_mut(&uid) else {
                        continue;
                    };
                    if slot.entry.status != status {
                        slot.entry.status = status;
                        let entry = slot.entry.clone();
                        self.publish(&uid, QueueChange::Written(entry));
                    }
                },
                Mutation::PutMatch { uid, record } => {
                    state.matches.insert(uid, record);
                },
                Mutation::DeleteMatch { uid } => {
                    state.matches.remove(&uid);
                },
                Mutation::DeleteQueueEntry { uid } => {
                    if let Some(slot) = state.queue.remove(&uid) {
                        self.publish(&uid, QueueChange::Deleted(slot.entry));
                    }
                },
            }
        }

        Ok(TxOutcome::Committed)
    }

    fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }
}

type DocKey = (ChatCollection, String);

#[derive(Default)]
struct DocumentState {
    chats: HashMap<DocKey, ChatSession>,
    messages: HashMap<DocKey, Vec<Message>>,
}

impl DocumentState {
    fn holds(&self, precondition: &DocPrecondition) -> bool {
        match precondition {
            DocPrecondition::ChatExists {
                collection,
                chat_id,
            } => self.chats.contains_key(&(*collection, chat_id.clone())),
            DocPrecondition::MessagesWithin {
                collection,
                chat_id,
                ids,
            } => self
                .messages
                .get(&(*collection, chat_id.clone()))
                .map_or(true, |messages| messages.iter().all(|m| ids.contains(&m.id))),
        }
    }
}

/// Document store kept in process memory
#[derive(Default)]
pub struct MemoryDocumentStore {
    state: Mutex<DocumentState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn chat(
        &self,
        collection: ChatCollection,
        chat_id: &str,
    ) -> Result<Option<ChatSession>, AppError> {
        let key = (collection, chat_id.to_string());
        Ok(self.state.lock().chats.get(&key).cloned())
    }

    async fn messages(
        &self,
        collection: ChatCollection,
        chat_id: &str,
    ) -> Result<Vec<Message>, AppError> {
        let key = (collection, chat_id.to_string());
        Ok(self.state.lock().messages.get(&key).cloned().unwrap_or_default())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<bool, AppError> {
        let mut state = self.state.lock();

        if !batch.preconditions.iter().all(|p| state.holds(p)) {
            return Ok(false);
        }

        for op in batch.ops {
            match op {
                WriteOp::CreateChat {
                    collection,
                    session,
                } => {
                    state
                        .chats
                        .entry((collection, session.id.clone()))
                        .or_insert(session);
                },
                WriteOp::SetChat {
                    collection,
                    session,
                } => {
                    state.chats.insert((collection, session.id.clone()), session);
                },
                WriteOp::TouchChat {
                    collection,
                    chat_id,
                    last_message,
                    last_message_time,
                } => {
                    if let Some(session) = state.chats.get_mut(&(collection, chat_id)) {
                        session.last_message = Some(last_message);
                        session.last_message_time = Some(last_message_time);
                    }
                },
                WriteOp::DeleteChat {
                    collection,
                    chat_id,
                } => {
                    state.chats.remove(&(collection, chat_id));
                },
                WriteOp::SetMessage {
                    collection,
                    chat_id,
                    message,
                } => {
                    let messages = state.messages.entry((collection, chat_id)).or_default();
                    match messages.iter_mut().find(|m| m.id == message.id) {
                        Some(existing) => *existing = message,
                        None => messages.push(message),
                    }
                },
                WriteOp::DeleteMessage {
                    collection,
                    chat_id,
                    message_id,
                } => {
                    let key = (collection, chat_id);
                    if let Some(messages) = state.messages.get_mut(&key) {
                        messages.retain(|m| m.id != message_id);
                        if messages.is_empty() {
                            state.messages.remove(&key);
                        }
                    }
                },
            }
        }

        Ok(true)
    }
}
