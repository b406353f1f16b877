//! Persistence for chat messages.
//!
//! One row per (message, recipient). Rows are immutable after creation except
//! for the read state. Ordering is by `created_at`, which the store assigns.

mod memory;
mod postgres;

pub use memory::InMemoryMessageStore;
pub use postgres::PgMessageStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::message::{Message, NewMessage};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Latest direct message exchanged with one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectPeer {
    pub peer_id: String,
    pub peer_name: String,
    pub last_message: Message,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists one row and returns it with its id and `created_at`.
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// The most recent `limit` rows of a session, oldest first.
    async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, StoreError>;

    /// Marks every unread row of the session addressed to `recipient_id`.
    async fn mark_read(&self, session_id: &str, recipient_id: &str) -> Result<u64, StoreError>;

    /// Unread rows addressed to the user across all conversations.
    async fn count_unread(&self, recipient_id: &str) -> Result<i64, StoreError>;

    async fn count_unread_in_session(
        &self,
        session_id: &str,
        recipient_id: &str,
    ) -> Result<i64, StoreError>;

    async fn last_message(&self, session_id: &str) -> Result<Option<Message>, StoreError>;

    /// Direct (session-less) rows between two users, oldest first.
    async fn direct_history(
        &self,
        user_id: &str,
        peer_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;

    async fn mark_direct_read(&self, sender_id: &str, recipient_id: &str) -> Result<u64, StoreError>;

    async fn direct_peers(&self, user_id: &str) -> Result<Vec<DirectPeer>, StoreError>;

    async fn count_unread_from(&self, sender_id: &str, recipient_id: &str) -> Result<i64, StoreError>;

    /// Marks a single row read if it is addressed to `recipient_id`.
    async fn mark_message_read(
        &self,
        id: Uuid,
        recipient_id: &str,
    ) -> Result<Option<Message>, StoreError>;

    async fn healthy(&self) -> bool;
}
