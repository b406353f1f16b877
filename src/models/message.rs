use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::{Identity, Role};
use super::tutoring::Participant;
use crate::error::ChatError;

pub const MAX_BODY_CHARS: usize = 1000;

/// One persisted message row. There is exactly one recipient per row; a
/// single send to a session produces one row per recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: Role,
    pub recipient_id: String,
    pub recipient_name: String,
    pub body: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A message before the store assigns its id and timestamp. Names are
/// captured as of send time and never refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub session_id: Option<String>,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: Role,
    pub recipient_id: String,
    pub recipient_name: String,
    pub body: String,
}

impl NewMessage {
    pub fn new(
        sender: &Identity,
        recipient: &Participant,
        session_id: Option<&str>,
        body: &MessageBody,
    ) -> Self {
        Self {
            session_id: session_id.map(str::to_owned),
            sender_id: sender.user_id.clone(),
            sender_name: sender.display_name.clone(),
            sender_role: sender.role,
            recipient_id: recipient.id.clone(),
            recipient_name: recipient.name.clone(),
            body: body.as_str().to_owned(),
        }
    }
}

/// Trimmed, non-empty message text of at most `MAX_BODY_CHARS` characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody(String);

impl MessageBody {
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ChatError::Validation("message body cannot be empty".to_string()));
        }
        if trimmed.chars().count() > MAX_BODY_CHARS {
            return Err(ChatError::Validation(format!(
                "message body cannot exceed {} characters",
                MAX_BODY_CHARS
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Session and peer ids arrive from clients verbatim; reject blanks and
/// anything that cannot be a path segment of the directory API.
pub fn validate_id(kind: &str, raw: &str) -> Result<String, ChatError> {
    let id = raw.trim();
    if id.is_empty() || id.len() > 128 || id.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(ChatError::Validation(format!("malformed {}", kind)));
    }
    Ok(id.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub session_id: String,
    pub title: String,
    pub subject_name: String,
    pub last_message: Option<Message>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectConversationSummary {
    pub peer_id: String,
    pub peer_name: String,
    pub last_message: Message,
    pub unread_count: i64,
}
