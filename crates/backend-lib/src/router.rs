// ============================
// crates/backend-lib/src/router.rs
// ============================
//! HTTP routes.
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
    Json, Router,
};
use roulette_common::{
    AnonymousSession, ChatRequest, DeleteChatResponse, JoinQueueRequest, MatchView, Message,
    QueueEntry, SendMessageRequest, SuccessResponse, Uid,
};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::AppState;

/// Identity resolved from the `Authorization: Bearer` header, if any
#[derive(Debug, Clone)]
pub struct Caller(pub Option<Uid>);

impl Caller {
    fn uid(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim);

        let uid = match token {
            Some(token) if !token.is_empty() => state.identity.verify(token).await,
            _ => None,
        };
        Ok(Caller(uid))
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/session", post(create_session))
        .route("/v1/queue", post(join_queue).delete(leave_queue))
        .route("/v1/match", get(current_match))
        .route("/v1/match/end", post(end_match))
        .route("/v1/chats/save", post(save_chat))
        .route("/v1/chats/delete", post(delete_chat))
        .route("/v1/chats/{chat_id}/messages", post(send_message))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn create_session(State(state): State<Arc<AppState>>) -> Json<AnonymousSession> {
    Json(state.identity.issue_anonymous().await)
}

async fn join_queue(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    payload: Result<Json<JoinQueueRequest>, JsonRejection>,
) -> Result<Json<QueueEntry>, AppError> {
    // Unauthenticated wins over a malformed body
    let uid = caller.uid().ok_or(AppError::Unauthenticated)?;
    let Json(request) = payload?;
    Ok(Json(state.service.join_queue(Some(uid), request).await?))
}

async fn leave_queue(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<SuccessResponse>, AppError> {
    Ok(Json(state.service.leave_queue(caller.uid()).await?))
}

async fn current_match(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<MatchView>, AppError> {
    Ok(Json(state.service.current_match(caller.uid()).await?))
}

async fn end_match(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<SuccessResponse>, AppError> {
    Ok(Json(state.service.end_match(caller.uid()).await?))
}

async fn save_chat(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let uid = caller.uid().ok_or(AppError::Unauthenticated)?;
    let Json(request) = payload?;
    Ok(Json(state.service.save_chat(Some(uid), request).await?))
}

async fn delete_chat(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<DeleteChatResponse>, AppError> {
    let uid = caller.uid().ok_or(AppError::Unauthenticated)?;
    let Json(request) = payload?;
    Ok(Json(state.service.delete_chat(Some(uid), request).await?))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(chat_id): Path<String>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<Message>, AppError> {
    let uid = caller.uid().ok_or(AppError::Unauthenticated)?;
    let Json(request) = payload?;
    Ok(Json(
        state.service.send_message(Some(uid), &chat_id, request).await?,
    ))
}
