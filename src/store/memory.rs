use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DirectPeer, MessageStore, StoreError};
use crate::models::message::{Message, NewMessage};

#[derive(Default)]
struct State {
    // insertion order == created_at order
    messages: Vec<Message>,
    last_created_at: Option<DateTime<Utc>>,
}

impl State {
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created_at = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }
}

fn is_direct_between(message: &Message, a: &str, b: &str) -> bool {
    message.session_id.is_none()
        && ((message.sender_id == a && message.recipient_id == b)
            || (message.sender_id == b && message.recipient_id == a))
}

fn mark(message: &mut Message, now: DateTime<Utc>) {
    message.is_read = true;
    message.read_at = Some(now);
}

/// Process-local store used when no database is configured, and in tests.
#[derive(Default)]
pub struct InMemoryMessageStore {
    state: RwLock<State>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.messages.len()
    }

    pub async fn all(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut state = self.state.write().await;
        let created_at = state.next_timestamp();
        let stored = Message {
            id: Uuid::new_v4(),
            session_id: message.session_id,
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            sender_role: message.sender_role,
            recipient_id: message.recipient_id,
            recipient_name: message.recipient_name,
            body: message.body,
            is_read: false,
            read_at: None,
            created_at,
        };
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read().await;
        let mut recent: Vec<Message> = state
            .messages
            .iter()
            .rev()
            .filter(|m| m.session_id.as_deref() == Some(session_id))
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn mark_read(&self, session_id: &str, recipient_id: &str) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut updated = 0;
        for message in state.messages.iter_mut().filter(|m| {
            !m.is_read && m.recipient_id == recipient_id && m.session_id.as_deref() == Some(session_id)
        }) {
            mark(message, now);
            updated += 1;
        }
        Ok(updated)
    }

    async fn count_unread(&self, recipient_id: &str) -> Result<i64, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| !m.is_read && m.recipient_id == recipient_id)
            .count() as i64)
    }

    async fn count_unread_in_session(
        &self,
        session_id: &str,
        recipient_id: &str,
    ) -> Result<i64, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| {
                !m.is_read
                    && m.recipient_id == recipient_id
                    && m.session_id.as_deref() == Some(session_id)
            })
            .count() as i64)
    }

    async fn last_message(&self, session_id: &str) -> Result<Option<Message>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .rev()
            .find(|m| m.session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn direct_history(
        &self,
        user_id: &str,
        peer_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read().await;
        let mut recent: Vec<Message> = state
            .messages
            .iter()
            .rev()
            .filter(|m| is_direct_between(m, user_id, peer_id))
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn mark_direct_read(&self, sender_id: &str, recipient_id: &str) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut updated = 0;
        for message in state.messages.iter_mut().filter(|m| {
            !m.is_read
                && m.session_id.is_none()
                && m.sender_id == sender_id
                && m.recipient_id == recipient_id
        }) {
            mark(message, now);
            updated += 1;
        }
        Ok(updated)
    }

    async fn direct_peers(&self, user_id: &str) -> Result<Vec<DirectPeer>, StoreError> {
        let state = self.state.read().await;
        let mut peers: BTreeMap<String, DirectPeer> = BTreeMap::new();
        for message in state.messages.iter().filter(|m| {
            m.session_id.is_none() && (m.sender_id == user_id || m.recipient_id == user_id)
        }) {
            let (peer_id, peer_name) = if message.sender_id == user_id {
                (&message.recipient_id, &message.recipient_name)
            } else {
                (&message.sender_id, &message.sender_name)
            };
            // later rows overwrite earlier ones
            peers.insert(
                peer_id.clone(),
                DirectPeer {
                    peer_id: peer_id.clone(),
                    peer_name: peer_name.clone(),
                    last_message: message.clone(),
                },
            );
        }
        Ok(peers.into_values().collect())
    }

    async fn count_unread_from(&self, sender_id: &str, recipient_id: &str) -> Result<i64, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| {
                !m.is_read
                    && m.session_id.is_none()
                    && m.sender_id == sender_id
                    && m.recipient_id == recipient_id
            })
            .count() as i64)
    }

    async fn mark_message_read(
        &self,
        id: Uuid,
        recipient_id: &str,
    ) -> Result<Option<Message>, StoreError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let Some(message) = state
            .messages
            .iter_mut()
            .find(|m| m.id == id && m.recipient_id == recipient_id)
        else {
            return Ok(None);
        };
        if !message.is_read {
            mark(message, now);
        }
        Ok(Some(message.clone()))
    }

    async fn healthy(&self) -> bool {
        true
    }
}
