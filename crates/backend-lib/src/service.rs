// ============================
// crates/backend-lib/src/service.rs
// ============================
//! Caller-facing operations.
//!
//! Every operation requires an authenticated caller. Caller errors pass
//! through unchanged; anything else is logged here and surfaced as a
//! generic internal failure.
use std::sync::Arc;

use roulette_common::{
    ChatRequest, DeleteChatResponse, JoinQueueRequest, MatchView, Message, QueueEntry,
    SendMessageRequest, SuccessResponse,
};
use tracing::error;

use crate::chats::ChatSessionStore;
use crate::error::AppError;
use crate::leave::LeaveHandler;
use crate::lifecycle::MatchLifecycle;
use crate::queue::QueueStore;
use crate::validation;

fn authenticated(caller: Option<&str>) -> Result<&str, AppError> {
    caller.ok_or(AppError::Unauthenticated)
}

fn surface(op: &'static str, err: AppError) -> AppError {
    if err.is_caller_error() {
        return err;
    }
    error!(op, error = %err, "operation failed");
    AppError::Internal(format!("{op} failed"))
}

pub struct RouletteService {
    queue: QueueStore,
    lifecycle: Arc<MatchLifecycle>,
    chats: Arc<ChatSessionStore>,
    leave: Arc<LeaveHandler>,
}

impl RouletteService {
    pub fn new(
        queue: QueueStore,
        lifecycle: Arc<MatchLifecycle>,
        chats: Arc<ChatSessionStore>,
        leave: Arc<LeaveHandler>,
    ) -> Self {
        Self {
            queue,
            lifecycle,
            chats,
            leave,
        }
    }

    pub async fn join_queue(
        &self,
        caller: Option<&str>,
        request: JoinQueueRequest,
    ) -> Result<QueueEntry, AppError> {
        let uid = authenticated(caller)?;
        self.queue
            .join(uid, request)
            .await
            .map_err(|e| surface("joinQueue", e))
    }

    /// Delete the caller's entry and run the leave cascade inline. The delete
    /// event runs it again from the dispatcher, which is a no-op by then.
    pub async fn leave_queue(&self, caller: Option<&str>) -> Result<SuccessResponse, AppError> {
        let uid = authenticated(caller)?;
        self.queue
            .leave(uid)
            .await
            .map_err(|e| surface("leaveQueue", e))?;
        self.leave
            .on_queue_entry_deleted(uid)
            .await
            .map_err(|e| surface("leaveQueue", e))?;
        Ok(SuccessResponse::ok())
    }

    pub async fn current_match(&self, caller: Option<&str>) -> Result<MatchView, AppError> {
        let uid = authenticated(caller)?;
        let current = self
            .lifecycle
            .current_match(uid)
            .await
            .map_err(|e| surface("currentMatch", e))?;
        Ok(MatchView { current })
    }

    pub async fn end_match(&self, caller: Option<&str>) -> Result<SuccessResponse, AppError> {
        let uid = authenticated(caller)?;
        self.lifecycle
            .end_match(uid)
            .await
            .map_err(|e| surface("endMatch", e))
    }

    pub async fn save_chat(
        &self,
        caller: Option<&str>,
        request: ChatRequest,
    ) -> Result<SuccessResponse, AppError> {
        let uid = authenticated(caller)?;
        let chat_id = validation::require_chat_id(request.chat_id.as_deref())?;
        self.chats
            .save_chat(uid, chat_id)
            .await
            .map_err(|e| surface("saveChat", e))
    }

    pub async fn delete_chat(
        &self,
        caller: Option<&str>,
        request: ChatRequest,
    ) -> Result<DeleteChatResponse, AppError> {
        let uid = authenticated(caller)?;
        let chat_id = validation::require_chat_id(request.chat_id.as_deref())?;
        self.chats
            .delete_chat(uid, chat_id)
            .await
            .map_err(|e| surface("deleteChat", e))
    }

    pub async fn send_message(
        &self,
        caller: Option<&str>,
        chat_id: &str,
        request: SendMessageRequest,
    ) -> Result<Message, AppError> {
        let uid = authenticated(caller)?;
        let chat_id = validation::validate_chat_id(chat_id)?;
        self.chats
            .send_message(uid, chat_id, request)
            .await
            .map_err(|e| surface("sendMessage", e))
    }
}
