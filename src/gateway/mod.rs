// src/gateway/mod.rs
//! Transport-agnostic messaging gateway.
//!
//! The socket handler feeds decoded [`ClientEvent`]s in and drains each
//! connection's outbox; everything in between (authorization, fan-out,
//! persistence, delivery) happens here. Events from one connection are
//! handled one at a time, in arrival order.

pub mod events;
pub mod registry;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::error::ChatError;
use crate::membership::MembershipResolver;
use crate::models::auth::Identity;
use crate::models::message::{validate_id, Message, MessageBody, NewMessage};
use crate::store::{MessageStore, StoreError};

pub use events::{ClientEvent, ServerEvent};
pub use registry::{room_key, ConnectionId, ConnectionRegistry, OUTBOX_CAPACITY};

pub struct Gateway {
    registry: ConnectionRegistry,
    store: Arc<dyn MessageStore>,
    membership: MembershipResolver,
    timeout: Duration,
    history_limit: usize,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn MessageStore>,
        membership: MembershipResolver,
        timeout: Duration,
        history_limit: usize,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            store,
            membership,
            timeout,
            history_limit,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ChatError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        Ok(tokio::time::timeout(self.timeout, call).await??)
    }

    async fn identity_of(&self, connection: ConnectionId) -> Result<Identity, ChatError> {
        self.registry
            .identity(connection)
            .await
            .ok_or(ChatError::Authentication(AuthError::UnknownConnection))
    }

    /// Registers an authenticated connection. Outbound events for it are
    /// written to `outbox`; if it fills up the connection is dropped.
    pub async fn connect(&self, identity: Identity, outbox: mpsc::Sender<ServerEvent>) -> ConnectionId {
        self.registry.register(identity, outbox).await
    }

    pub async fn disconnect(&self, connection: ConnectionId) {
        self.registry.unregister(connection).await;
    }

    /// Runs one client event. Failures become an `error` event on the
    /// originating connection only.
    pub async fn handle(&self, connection: ConnectionId, event: ClientEvent) {
        let name = event.name();
        let result = match event {
            ClientEvent::JoinRoom { session_id } => self.join_room(connection, &session_id).await.map(|_| ()),
            ClientEvent::LeaveRoom { session_id } => self.leave_room(connection, &session_id).await,
            ClientEvent::SendMessage { session_id, body } => {
                self.send_message(connection, &session_id, &body).await.map(|_| ())
            }
            ClientEvent::SendDirect { recipient_id, body } => {
                self.send_direct(connection, &recipient_id, &body).await.map(|_| ())
            }
            ClientEvent::Typing {
                recipient_id,
                is_typing,
            } => self.typing(connection, &recipient_id, is_typing).await,
        };

        if let Err(err) = result {
            self.report_error(connection, err, Some(name)).await;
        }
    }

    pub async fn report_error(&self, connection: ConnectionId, err: ChatError, event: Option<&str>) {
        if err.is_retryable() {
            tracing::warn!(connection_id = %connection, event, error = %err, "socket operation failed");
        } else {
            tracing::debug!(connection_id = %connection, event, error = %err, "socket operation rejected");
        }
        self.registry
            .emit_to(
                connection,
                ServerEvent::Error {
                    message: err.client_message(),
                    retryable: err.is_retryable(),
                    event: event.map(str::to_owned),
                },
            )
            .await;
    }

    /// Authorizes, subscribes the connection to the session room and sends it
    /// the recent history. An unauthorized caller is not subscribed.
    pub async fn join_room(&self, connection: ConnectionId, session_id: &str) -> Result<Vec<Message>, ChatError> {
        let session_id = validate_id("session id", session_id)?;
        let identity = self.identity_of(connection).await?;
        self.membership.require_participant(&session_id, &identity).await?;

        if !self.registry.join(connection, &room_key(&session_id)).await {
            return Err(ChatError::Authentication(AuthError::UnknownConnection));
        }
        tracing::info!(connection_id = %connection, user_id = %identity.user_id, session_id = %session_id, "joined session room");

        let messages = self.load_session_history(&identity, &session_id).await?;
        self.registry
            .emit_to(
                connection,
                ServerEvent::MessageHistory {
                    session_id: session_id.clone(),
                    messages: messages.clone(),
                },
            )
            .await;
        Ok(messages)
    }

    pub async fn leave_room(&self, connection: ConnectionId, session_id: &str) -> Result<(), ChatError> {
        let session_id = validate_id("session id", session_id)?;
        if self.registry.leave(connection, &room_key(&session_id)).await {
            tracing::info!(connection_id = %connection, session_id = %session_id, "left session room");
        }
        Ok(())
    }

    /// Stores one row per recipient, then broadcasts each row to the session
    /// room and notifies the recipient on every connection they hold, whatever
    /// role those connected with. Nothing is delivered unless every row was
    /// stored.
    pub async fn send_message(
        &self,
        connection: ConnectionId,
        session_id: &str,
        body: &str,
    ) -> Result<Vec<Message>, ChatError> {
        let session_id = validate_id("session id", session_id)?;
        let body = MessageBody::parse(body)?;
        let sender = self.identity_of(connection).await?;

        let recipients = self.membership.resolve_fanout_set(&session_id, &sender).await?;
        if recipients.is_empty() {
            return Err(ChatError::Validation(
                "this session has no other participants yet".to_string(),
            ));
        }

        let mut stored = Vec::with_capacity(recipients.len());
        for recipient in &recipients {
            let row = NewMessage::new(&sender, recipient, Some(&session_id), &body);
            match self.bounded(self.store.append(row)).await {
                Ok(message) => stored.push(message),
                Err(err) => {
                    tracing::error!(
                        session_id = %session_id,
                        sender_id = %sender.user_id,
                        stored = stored.len(),
                        total = recipients.len(),
                        error = %err,
                        "fan-out aborted"
                    );
                    return Err(err);
                }
            }
        }

        let room = room_key(&session_id);
        for (message, recipient) in stored.iter().zip(&recipients) {
            self.registry
                .emit_to_room(&room, &ServerEvent::NewMessage(message.clone()))
                .await;
            self.registry
                .emit_to_user(&recipient.id, &ServerEvent::Notification(message.clone()))
                .await;
        }

        tracing::info!(
            session_id = %session_id,
            sender_id = %sender.user_id,
            recipients = stored.len(),
            "📤 message delivered"
        );
        Ok(stored)
    }

    /// One-to-one message outside any session. The sender's other tabs see it
    /// through the sender's own channel.
    pub async fn send_direct(&self, connection: ConnectionId, recipient_id: &str, body: &str) -> Result<Message, ChatError> {
        let recipient_id = validate_id("recipient id", recipient_id)?;
        let body = MessageBody::parse(body)?;
        let sender = self.identity_of(connection).await?;
        if recipient_id == sender.user_id {
            return Err(ChatError::Validation("cannot send a message to yourself".to_string()));
        }

        let recipient = self
            .membership
            .user(&recipient_id)
            .await?
            .ok_or_else(|| ChatError::NotFound("recipient".to_string()))?;

        let message = self
            .bounded(self.store.append(NewMessage::new(&sender, &recipient, None, &body)))
            .await?;

        let new_message = ServerEvent::NewMessage(message.clone());
        self.registry.emit_to_user(&sender.user_id, &new_message).await;
        self.registry.emit_to_user(&recipient.id, &new_message).await;
        self.registry
            .emit_to_user(&recipient.id, &ServerEvent::Notification(message.clone()))
            .await;

        tracing::info!(sender_id = %sender.user_id, recipient_id = %recipient.id, "📤 direct message delivered");
        Ok(message)
    }

    /// Ephemeral; nothing is stored and an offline recipient is not an error.
    pub async fn typing(&self, connection: ConnectionId, recipient_id: &str, is_typing: bool) -> Result<(), ChatError> {
        let recipient_id = validate_id("recipient id", recipient_id)?;
        let sender = self.identity_of(connection).await?;
        self.registry
            .emit_to_user(
                &recipient_id,
                &ServerEvent::Typing {
                    from_id: sender.user_id,
                    from_name: sender.display_name,
                    is_typing,
                },
            )
            .await;
        Ok(())
    }

    /// History of a session for a participant, marking the caller's rows read.
    pub async fn session_history(&self, caller: &Identity, session_id: &str) -> Result<Vec<Message>, ChatError> {
        let session_id = validate_id("session id", session_id)?;
        self.membership.require_participant(&session_id, caller).await?;
        self.load_session_history(caller, &session_id).await
    }

    async fn load_session_history(&self, caller: &Identity, session_id: &str) -> Result<Vec<Message>, ChatError> {
        let marked = self.bounded(self.store.mark_read(session_id, &caller.user_id)).await?;
        if marked > 0 {
            tracing::debug!(user_id = %caller.user_id, session_id, marked, "marked session messages read");
        }
        self.bounded(self.store.history(session_id, self.history_limit)).await
    }

    /// Conversation between the caller and one peer, marking what the peer
    /// sent to the caller as read.
    pub async fn direct_history(&self, caller: &Identity, peer_id: &str) -> Result<Vec<Message>, ChatError> {
        let peer_id = validate_id("peer id", peer_id)?;
        self.bounded(self.store.mark_direct_read(&peer_id, &caller.user_id)).await?;
        self.bounded(self.store.direct_history(&caller.user_id, &peer_id, self.history_limit))
            .await
    }

    /// Only the recipient can mark a row read.
    pub async fn mark_message_read(&self, caller: &Identity, message_id: Uuid) -> Result<Message, ChatError> {
        self.bounded(self.store.mark_message_read(message_id, &caller.user_id))
            .await?
            .ok_or_else(|| ChatError::NotFound("message".to_string()))
    }

    pub async fn unread_count(&self, caller: &Identity) -> Result<i64, ChatError> {
        self.bounded(self.store.count_unread(&caller.user_id)).await
    }
}
