// ============================
// crates/backend-lib/src/chats.rs
// ============================
//! Chat session storage: creation, save, delete and messages.
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use roulette_common::{
    ChatSession, DeleteChatResponse, Message, QueueEntry, SendMessageRequest, SuccessResponse,
};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ChatSettings, SessionMode};
use crate::error::AppError;
use crate::metrics::{CHAT_DELETED, CHAT_DISCARDED, CHAT_SAVED, MESSAGE_SENT};
use crate::store::{ChatCollection, DocPrecondition, DocumentStore, WriteBatch, WriteOp};
use crate::validation;

/// Conditional batches retried before giving up
const MAX_BATCH_ATTEMPTS: usize = 3;

/// Chat sessions across the temporary and permanent collections
pub struct ChatSessionStore {
    docs: Arc<dyn DocumentStore>,
    settings: ChatSettings,
}

impl ChatSessionStore {
    pub fn new(docs: Arc<dyn DocumentStore>, settings: ChatSettings) -> Self {
        Self { docs, settings }
    }

    fn initial_collection(&self) -> ChatCollection {
        match self.settings.initial_mode {
            SessionMode::Temporary => ChatCollection::Temporary,
            SessionMode::Permanent => ChatCollection::Permanent,
        }
    }

    /// Session document for a fresh pairing; participants are kept sorted
    fn build_session(
        &self,
        chat_id: &str,
        a: &QueueEntry,
        b: &QueueEntry,
        collection: ChatCollection,
    ) -> ChatSession {
        let mut pair = [a, b];
        pair.sort_by(|x, y| x.uid.cmp(&y.uid));

        let mut session = ChatSession {
            id: chat_id.to_string(),
            participants: pair.iter().map(|p| p.uid.clone()).collect(),
            participant_names: Default::default(),
            participant_avatars: Default::default(),
            participant_ages: Default::default(),
            participant_genders: Default::default(),
            participant_interests: Default::default(),
            is_temporary: collection == ChatCollection::Temporary,
            created_at: Utc::now(),
            saved_at: None,
            last_message: None,
            last_message_time: None,
        };
        for p in pair {
            session.participant_names.insert(p.uid.clone(), p.name.clone());
            session.participant_avatars.insert(p.uid.clone(), p.avatar());
            if self.settings.denormalize_profile {
                session.participant_ages.insert(p.uid.clone(), p.age);
                session.participant_genders.insert(p.uid.clone(), p.gender.clone());
                session.participant_interests.insert(p.uid.clone(), p.interests.clone());
            }
        }
        session
    }

    /// Create the session for a pairing in the configured collection
    pub async fn create_session(
        &self,
        chat_id: &str,
        a: &QueueEntry,
        b: &QueueEntry,
    ) -> Result<ChatSession, AppError> {
        self.create_in(self.initial_collection(), chat_id, a, b).await
    }

    pub async fn create_temporary(
        &self,
        chat_id: &str,
        a: &QueueEntry,
        b: &QueueEntry,
    ) -> Result<ChatSession, AppError> {
        self.create_in(ChatCollection::Temporary, chat_id, a, b).await
    }

    pub async fn create_permanent(
        &self,
        chat_id: &str,
        a: &QueueEntry,
        b: &QueueEntry,
    ) -> Result<ChatSession, AppError> {
        self.create_in(ChatCollection::Permanent, chat_id, a, b).await
    }

    /// An existing session under the same id is returned untouched, so
    /// repeated calls never duplicate or reset a chat.
    async fn create_in(
        &self,
        collection: ChatCollection,
        chat_id: &str,
        a: &QueueEntry,
        b: &QueueEntry,
    ) -> Result<ChatSession, AppError> {
        if let Some(existing) = self.docs.chat(collection, chat_id).await? {
            return Ok(existing);
        }

        let session = self.build_session(chat_id, a, b, collection);
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::CreateChat {
            collection,
            session: session.clone(),
        });
        self.docs.commit(batch).await?;
        debug!(chat_id, collection = collection.as_str(), "chat session created");

        // A concurrent creator may have won; hand back whatever is stored
        Ok(self.docs.chat(collection, chat_id).await?.unwrap_or(session))
    }

    /// Locate a session, permanent collection first
    pub async fn find(
        &self,
        chat_id: &str,
    ) -> Result<Option<(ChatCollection, ChatSession)>, AppError> {
        for collection in [ChatCollection::Permanent, ChatCollection::Temporary] {
            if let Some(session) = self.docs.chat(collection, chat_id).await? {
                return Ok(Some((collection, session)));
            }
        }
        Ok(None)
    }

    pub async fn exists(&self, chat_id: &str) -> Result<bool, AppError> {
        Ok(self.find(chat_id).await?.is_some())
    }

    /// Promote a temporary session and its messages to the permanent collection.
    ///
    /// The temporary side is only removed once every message it holds has been
    /// copied; a message that lands mid-save is picked up on the next pass.
    pub async fn save_chat(&self, uid: &str, chat_id: &str) -> Result<SuccessResponse, AppError> {
        let Some(session) = self.docs.chat(ChatCollection::Temporary, chat_id).await? else {
            return Err(AppError::NotFound("Chat not found".to_string()));
        };
        if !session.has_participant(uid) {
            return Err(AppError::PermissionDenied("No access to chat".to_string()));
        }

        let mut saved = session;
        saved.is_temporary = false;
        saved.saved_at = Some(Utc::now());

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SetChat {
            collection: ChatCollection::Permanent,
            session: saved,
        });
        let mut copied: Vec<String> = Vec::new();

        for attempt in 0..MAX_BATCH_ATTEMPTS {
            let pending: Vec<Message> = self
                .docs
                .messages(ChatCollection::Temporary, chat_id)
                .await?
                .into_iter()
                .filter(|m| !copied.contains(&m.id))
                .collect();

            if attempt > 0 && !pending.is_empty() {
                self.carry_summary(chat_id, &mut batch).await?;
            }
            for message in pending {
                copied.push(message.id.clone());
                batch.push(WriteOp::SetMessage {
                    collection: ChatCollection::Permanent,
                    chat_id: chat_id.to_string(),
                    message,
                });
            }
            if !batch.is_empty() {
                self.docs.commit(std::mem::take(&mut batch)).await?;
            }

            // The copy is durable; a failure past this point leaves a stale
            // temporary session that a retried save overwrites idempotently
            if self.try_remove(ChatCollection::Temporary, chat_id, &copied).await? {
                counter!(CHAT_SAVED).increment(1);
                info!(uid, chat_id, messages = copied.len(), "chat saved");
                return Ok(SuccessResponse::ok());
            }
            debug!(chat_id, attempt, "messages arrived during save, copying again");
        }

        Err(AppError::Internal(format!("chat {chat_id} kept changing during save")))
    }

    /// Queue a summary update when the temporary side saw a later message
    /// than the permanent copy
    async fn carry_summary(&self, chat_id: &str, batch: &mut WriteBatch) -> Result<(), AppError> {
        let Some(temp) = self.docs.chat(ChatCollection::Temporary, chat_id).await? else {
            return Ok(());
        };
        let (Some(last_message), Some(last_message_time)) =
            (temp.last_message, temp.last_message_time)
        else {
            return Ok(());
        };
        let permanent_time = self
            .docs
            .chat(ChatCollection::Permanent, chat_id)
            .await?
            .and_then(|p| p.last_message_time);
        if permanent_time.map_or(true, |t| t < last_message_time) {
            batch.push(WriteOp::TouchChat {
                collection: ChatCollection::Permanent,
                chat_id: chat_id.to_string(),
                last_message,
                last_message_time,
            });
        }
        Ok(())
    }

    /// Delete a session and its messages from whichever collection holds it
    pub async fn delete_chat(
        &self,
        uid: &str,
        chat_id: &str,
    ) -> Result<DeleteChatResponse, AppError> {
        let Some((collection, session)) = self.find(chat_id).await? else {
            return Err(AppError::NotFound("Chat not found".to_string()));
        };
        if !session.has_participant(uid) {
            return Err(AppError::PermissionDenied("No access to chat".to_string()));
        }

        let removed = self.remove_session(collection, chat_id).await?;
        counter!(CHAT_DELETED).increment(1);
        info!(uid, chat_id, collection = collection.as_str(), messages = removed, "chat deleted");
        Ok(DeleteChatResponse {
            success: true,
            chat_id: chat_id.to_string(),
        })
    }

    /// Drop the temporary session of a dissolved match, if there is one.
    /// Returns whether anything was removed.
    pub async fn discard_temporary(&self, chat_id: &str) -> Result<bool, AppError> {
        let present = self.docs.chat(ChatCollection::Temporary, chat_id).await?.is_some();
        let removed = self.remove_session(ChatCollection::Temporary, chat_id).await?;
        if present || removed > 0 {
            counter!(CHAT_DISCARDED).increment(1);
            debug!(chat_id, messages = removed, "temporary chat discarded");
            return Ok(true);
        }
        Ok(false)
    }

    /// Append a message to a session the sender participates in
    pub async fn send_message(
        &self,
        uid: &str,
        chat_id: &str,
        request: SendMessageRequest,
    ) -> Result<Message, AppError> {
        validation::validate_message(&request)?;

        let now = Utc::now();
        let text = request.text.trim().to_string();
        let mut body = serde_json::Map::new();
        body.insert("senderId".to_string(), json!(uid));
        body.insert("text".to_string(), json!(text));
        body.insert("timestamp".to_string(), json!(now));
        let message = Message {
            id: Uuid::new_v4().to_string(),
            body,
        };

        for _ in 0..MAX_BATCH_ATTEMPTS {
            let Some((collection, session)) = self.find(chat_id).await? else {
                return Err(AppError::NotFound("Chat not found".to_string()));
            };
            if !session.has_participant(uid) {
                return Err(AppError::PermissionDenied("No access to chat".to_string()));
            }

            let mut batch = WriteBatch::new();
            batch.require(DocPrecondition::ChatExists {
                collection,
                chat_id: chat_id.to_string(),
            });
            batch.push(WriteOp::SetMessage {
                collection,
                chat_id: chat_id.to_string(),
                message: message.clone(),
            });
            batch.push(WriteOp::TouchChat {
                collection,
                chat_id: chat_id.to_string(),
                last_message: text.clone(),
                last_message_time: now,
            });

            if self.docs.commit(batch).await? {
                counter!(MESSAGE_SENT).increment(1);
                return Ok(message);
            }
            // Saved or removed since it was read
            debug!(chat_id, collection = collection.as_str(), "chat moved, resolving again");
        }

        Err(AppError::Internal(format!("chat {chat_id} kept moving during send")))
    }

    /// Delete every message, then the session document, in one batch.
    /// Returns the number of messages removed.
    async fn remove_session(
        &self,
        collection: ChatCollection,
        chat_id: &str,
    ) -> Result<usize, AppError> {
        for _ in 0..MAX_BATCH_ATTEMPTS {
            let ids: Vec<String> = self
                .docs
                .messages(collection, chat_id)
                .await?
                .into_iter()
                .map(|m| m.id)
                .collect();
            if self.try_remove(collection, chat_id, &ids).await? {
                return Ok(ids.len());
            }
        }
        Err(AppError::Internal(format!("chat {chat_id} kept changing during removal")))
    }

    /// Remove the session if its messages are exactly `ids` or a subset.
    /// Returns false, writing nothing, when an unknown message is present.
    async fn try_remove(
        &self,
        collection: ChatCollection,
        chat_id: &str,
        ids: &[String],
    ) -> Result<bool, AppError> {
        let mut batch = WriteBatch::new();
        batch.require(DocPrecondition::MessagesWithin {
            collection,
            chat_id: chat_id.to_string(),
            ids: ids.to_vec(),
        });
        for id in ids {
            batch.push(WriteOp::DeleteMessage {
                collection,
                chat_id: chat_id.to_string(),
                message_id: id.clone(),
            });
        }
        batch.push(WriteOp::DeleteChat {
            collection,
            chat_id: chat_id.to_string(),
        });
        self.docs.commit(batch).await
    }
}
