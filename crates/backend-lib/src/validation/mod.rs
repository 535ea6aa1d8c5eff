// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Input validation for caller-invoked operations.

use regex::Regex;
use roulette_common::{JoinQueueRequest, SendMessageRequest};
use std::sync::LazyLock;
use thiserror::Error;

use crate::error::AppError;

const MAX_NAME_LENGTH: usize = 64;
const MIN_AGE: u32 = 13;
const MAX_AGE: u32 = 120;
const MAX_INTERESTS: usize = 20;
const MAX_INTEREST_LENGTH: usize = 32;
const MAX_GENDER_LENGTH: usize = 32;
const MAX_CHAT_ID_LENGTH: usize = 300;
const MAX_MESSAGE_LENGTH: usize = 4000;

// Two uids joined by `_`
static CHAT_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9\-]+(?:_[A-Za-z0-9\-]+)+$").expect("chat id pattern")
});
static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^<>/\\{}\[\];]*$").expect("name pattern"));

/// Possible validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Chat ID is missing")]
    MissingChatId,

    #[error("Invalid chat ID: {0}")]
    InvalidChatId(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid age: {0}")]
    InvalidAge(u32),

    #[error("Invalid gender: {0}")]
    InvalidGender(String),

    #[error("Invalid interests: {0}")]
    InvalidInterests(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::InvalidArgument(err.to_string())
    }
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate an optional `chatId` field and hand back the id
pub fn require_chat_id(chat_id: Option<&str>) -> ValidationResult<&str> {
    let chat_id = chat_id.map(str::trim).filter(|id| !id.is_empty());
    let Some(chat_id) = chat_id else {
        return Err(ValidationError::MissingChatId);
    };
    validate_chat_id(chat_id)?;
    Ok(chat_id)
}

/// Validate a chat ID
pub fn validate_chat_id(chat_id: &str) -> ValidationResult<&str> {
    if chat_id.len() > MAX_CHAT_ID_LENGTH {
        return Err(ValidationError::InvalidChatId(format!(
            "Chat ID must be at most {MAX_CHAT_ID_LENGTH} characters"
        )));
    }
    if !CHAT_ID_REGEX.is_match(chat_id) {
        return Err(ValidationError::InvalidChatId(
            "Chat ID must be two identifiers joined by '_'".to_string(),
        ));
    }
    Ok(chat_id)
}

/// Validate the profile a user searches with
pub fn validate_join_request(request: &JoinQueueRequest) -> ValidationResult<()> {
    let name = request.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::InvalidName(format!(
            "Name must be between 1 and {MAX_NAME_LENGTH} characters"
        )));
    }
    if !NAME_REGEX.is_match(name) {
        return Err(ValidationError::InvalidName(
            "Name contains invalid characters".to_string(),
        ));
    }

    if !(MIN_AGE..=MAX_AGE).contains(&request.age) {
        return Err(ValidationError::InvalidAge(request.age));
    }

    if let Some(gender) = &request.gender {
        if gender.chars().count() > MAX_GENDER_LENGTH {
            return Err(ValidationError::InvalidGender(format!(
                "Gender must be at most {MAX_GENDER_LENGTH} characters"
            )));
        }
    }

    if request.interests.len() > MAX_INTERESTS {
        return Err(ValidationError::InvalidInterests(format!(
            "At most {MAX_INTERESTS} interests are allowed"
        )));
    }
    for interest in &request.interests {
        let len = interest.trim().chars().count();
        if len == 0 || len > MAX_INTEREST_LENGTH {
            return Err(ValidationError::InvalidInterests(format!(
                "Each interest must be between 1 and {MAX_INTEREST_LENGTH} characters"
            )));
        }
    }

    Ok(())
}

/// Validate an outgoing chat message
pub fn validate_message(request: &SendMessageRequest) -> ValidationResult<()> {
    if request.text.trim().is_empty() {
        return Err(ValidationError::InvalidMessage("Message is empty".to_string()));
    }
    if request.text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ValidationError::InvalidMessage(format!(
            "Message must be at most {MAX_MESSAGE_LENGTH} characters"
        )));
    }
    Ok(())
}
