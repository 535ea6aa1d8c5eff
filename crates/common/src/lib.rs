// ================
// common/src/lib.rs
// ================
//! Common types shared between the chat roulette server and its clients.
//! This module defines the stored records (queue entries, matches, chat
//! sessions, messages) and the request/response bodies of the callable
//! operations.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Verified user identifier
pub type Uid = String;

/// Search state of a queue entry
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Waiting for a partner
    Searching,
    /// Paired with a partner
    Connected,
}

/// One user currently searching or connected
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub uid: Uid,
    pub name: String,
    pub age: u32,
    pub gender: String,
    #[serde(default)]
    pub interests: BTreeSet<String>,
    pub status: QueueStatus,
    pub joined_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Single uppercase initial used as the avatar placeholder.
    pub fn avatar(&self) -> String {
        avatar_initial(&self.name)
    }
}

/// Uppercased first character of a display name, `?` when empty.
pub fn avatar_initial(name: &str) -> String {
    match name.chars().next() {
        Some(c) => c.to_uppercase().collect(),
        None => "?".to_string(),
    }
}

/// Match record stored under the owner's uid
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub partner_uid: Uid,
    pub partner_name: String,
    pub partner_avatar: String,
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_interests: Option<BTreeSet<String>>,
}

/// Conversation container with denormalized participant snapshots
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub participants: Vec<Uid>,
    pub participant_names: BTreeMap<Uid, String>,
    pub participant_avatars: BTreeMap<Uid, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub participant_ages: BTreeMap<Uid, u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub participant_genders: BTreeMap<Uid, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub participant_interests: BTreeMap<Uid, BTreeSet<String>>,
    pub is_temporary: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
}

impl ChatSession {
    /// Whether `uid` is one of the two participants.
    pub fn has_participant(&self, uid: &str) -> bool {
        self.participants.iter().any(|p| p == uid)
    }
}

/// Opaque message stored in a session's `messages` subcollection
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    #[serde(flatten)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

/// Body of `POST /v1/queue`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JoinQueueRequest {
    pub name: String,
    pub age: u32,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

/// Body of `saveChat` and `deleteChat`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Body of `POST /v1/chats/{chat_id}/messages`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SendMessageRequest {
    pub text: String,
}

/// Plain acknowledgment
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Acknowledgment of `deleteChat`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteChatResponse {
    pub success: bool,
    pub chat_id: String,
}

/// Response of `GET /v1/match`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatchView {
    #[serde(rename = "match")]
    pub current: Option<Match>,
}

/// Anonymous identity issued by `POST /v1/session`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnonymousSession {
    pub uid: Uid,
    pub token: String,
}

/// Stable failure kinds reported to callers
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Unauthenticated,
    InvalidArgument,
    NotFound,
    PermissionDenied,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::InvalidArgument => "invalid-argument",
            ErrorCode::NotFound => "not-found",
            ErrorCode::PermissionDenied => "permission-denied",
            ErrorCode::Internal => "internal",
        }
    }
}
