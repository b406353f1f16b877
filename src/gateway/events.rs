// src/gateway/events.rs
//! Socket wire format. Every frame is a JSON object `{ "event": ..., "data": ... }`.

use serde::{Deserialize, Serialize};

use crate::models::message::Message;

/// Frames a connected client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { session_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { session_id: String },
    #[serde(rename_all = "camelCase")]
    SendMessage { session_id: String, body: String },
    #[serde(rename_all = "camelCase")]
    SendDirect { recipient_id: String, body: String },
    #[serde(rename_all = "camelCase")]
    Typing {
        recipient_id: String,
        #[serde(default = "default_typing")]
        is_typing: bool,
    },
}

fn default_typing() -> bool {
    true
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::LeaveRoom { .. } => "leave-room",
            ClientEvent::SendMessage { .. } => "send-message",
            ClientEvent::SendDirect { .. } => "send-direct",
            ClientEvent::Typing { .. } => "typing",
        }
    }
}

/// Frames pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Sent only to the joining connection.
    #[serde(rename_all = "camelCase")]
    MessageHistory {
        session_id: String,
        messages: Vec<Message>,
    },
    /// Broadcast to the session room for each stored row.
    NewMessage(Message),
    /// Pushed to the recipient's personal channel.
    Notification(Message),
    #[serde(rename_all = "camelCase")]
    Typing {
        from_id: String,
        from_name: String,
        is_typing: bool,
    },
    /// A failed client operation. A failed `send-message` was not delivered.
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        retryable: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        event: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::Role;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_parse_client_events() {
        let join: ClientEvent =
            serde_json::from_value(json!({"event": "join-room", "data": {"sessionId": "s-1"}})).unwrap();
        assert_eq!(join, ClientEvent::JoinRoom { session_id: "s-1".to_string() });

        let send: ClientEvent = serde_json::from_value(json!({
            "event": "send-message",
            "data": {"sessionId": "s-1", "body": "hola"}
        }))
        .unwrap();
        assert_eq!(send.name(), "send-message");

        let typing: ClientEvent =
            serde_json::from_value(json!({"event": "typing", "data": {"recipientId": "u-2"}})).unwrap();
        assert_eq!(
            typing,
            ClientEvent::Typing {
                recipient_id: "u-2".to_string(),
                is_typing: true
            }
        );
    }

    #[test]
    fn test_unknown_or_incomplete_frames_are_rejected() {
        assert!(serde_json::from_value::<ClientEvent>(json!({"event": "explode", "data": {}})).is_err());
        assert!(serde_json::from_value::<ClientEvent>(json!({"event": "send-message", "data": {"body": "x"}})).is_err());
    }

    #[test]
    fn test_server_event_shape() {
        let message = Message {
            id: Uuid::new_v4(),
            session_id: Some("s-1".to_string()),
            sender_id: "t".to_string(),
            sender_name: "Tutor".to_string(),
            sender_role: Role::Tutor,
            recipient_id: "a".to_string(),
            recipient_name: "Ana".to_string(),
            body: "hola".to_string(),
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(ServerEvent::NewMessage(message)).unwrap();
        assert_eq!(value["event"], "new-message");
        assert_eq!(value["data"]["recipientId"], "a");
        assert_eq!(value["data"]["senderRole"], "tutor");

        let value = serde_json::to_value(ServerEvent::Error {
            message: "nope".to_string(),
            retryable: false,
            event: None,
        })
        .unwrap();
        assert_eq!(value, json!({"event": "error", "data": {"message": "nope", "retryable": false}}));
    }
}
