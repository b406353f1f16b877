use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{DirectPeer, MessageStore, StoreError};
use crate::models::auth::Role;
use crate::models::message::{Message, NewMessage};

const COLUMNS: &str = "id, session_id, sender_id, sender_name, sender_role, recipient_id, \
                       recipient_name, body, is_read, read_at, created_at";

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    session_id: Option<String>,
    sender_id: String,
    sender_name: String,
    sender_role: String,
    recipient_id: String,
    recipient_name: String,
    body: String,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let sender_role = Role::parse(&row.sender_role).ok_or_else(|| {
            StoreError::CorruptRow(format!("message {} has role {:?}", row.id, row.sender_role))
        })?;
        Ok(Message {
            id: row.id,
            session_id: row.session_id,
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            sender_role,
            recipient_id: row.recipient_id,
            recipient_name: row.recipient_name,
            body: row.body,
            is_read: row.is_read,
            read_at: row.read_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DirectPeerRow {
    peer_id: String,
    peer_name: String,
    #[sqlx(flatten)]
    message: MessageRow,
}

fn into_messages(rows: Vec<MessageRow>) -> Result<Vec<Message>, StoreError> {
    rows.into_iter().map(Message::try_from).collect()
}

/// Message store backed by the `mensajes` table.
#[derive(Clone)]
pub struct PgMessageStore {
    db_pool: PgPool,
}

impl PgMessageStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        tracing::debug!(
            session_id = ?message.session_id,
            recipient_id = %message.recipient_id,
            "inserting message"
        );

        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO mensajes
             (id, session_id, sender_id, sender_name, sender_role, recipient_id, recipient_name, body)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&message.session_id)
        .bind(&message.sender_id)
        .bind(&message.sender_name)
        .bind(message.sender_role.as_str())
        .bind(&message.recipient_id)
        .bind(&message.recipient_name)
        .bind(&message.body)
        .fetch_one(&self.db_pool)
        .await?;

        Message::try_from(row)
    }

    async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {COLUMNS} FROM (
                 SELECT {COLUMNS}, seq FROM mensajes
                 WHERE session_id = $1
                 ORDER BY created_at DESC, seq DESC
                 LIMIT $2
             ) recent
             ORDER BY created_at ASC, seq ASC"
        ))
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.db_pool)
        .await?;

        into_messages(rows)
    }

    async fn mark_read(&self, session_id: &str, recipient_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE mensajes SET is_read = TRUE, read_at = NOW()
             WHERE session_id = $1 AND recipient_id = $2 AND is_read = FALSE",
        )
        .bind(session_id)
        .bind(recipient_id)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_unread(&self, recipient_id: &str) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM mensajes WHERE recipient_id = $1 AND is_read = FALSE",
        )
        .bind(recipient_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(count)
    }

    async fn count_unread_in_session(
        &self,
        session_id: &str,
        recipient_id: &str,
    ) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM mensajes
             WHERE session_id = $1 AND recipient_id = $2 AND is_read = FALSE",
        )
        .bind(session_id)
        .bind(recipient_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(count)
    }

    async fn last_message(&self, session_id: &str) -> Result<Option<Message>, StoreError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {COLUMNS} FROM mensajes
             WHERE session_id = $1
             ORDER BY created_at DESC, seq DESC
             LIMIT 1"
        ))
        .bind(session_id)
        .fetch_optional(&self.db_pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    async fn direct_history(
        &self,
        user_id: &str,
        peer_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {COLUMNS} FROM (
                 SELECT {COLUMNS}, seq FROM mensajes
                 WHERE session_id IS NULL
                   AND ((sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1))
                 ORDER BY created_at DESC, seq DESC
                 LIMIT $3
             ) recent
             ORDER BY created_at ASC, seq ASC"
        ))
        .bind(user_id)
        .bind(peer_id)
        .bind(limit as i64)
        .fetch_all(&self.db_pool)
        .await?;

        into_messages(rows)
    }

    async fn mark_direct_read(&self, sender_id: &str, recipient_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE mensajes SET is_read = TRUE, read_at = NOW()
             WHERE session_id IS NULL AND sender_id = $1 AND recipient_id = $2 AND is_read = FALSE",
        )
        .bind(sender_id)
        .bind(recipient_id)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn direct_peers(&self, user_id: &str) -> Result<Vec<DirectPeer>, StoreError> {
        let rows = sqlx::query_as::<_, DirectPeerRow>(&format!(
            "SELECT DISTINCT ON (peer_id)
                 CASE WHEN sender_id = $1 THEN recipient_id ELSE sender_id END AS peer_id,
                 CASE WHEN sender_id = $1 THEN recipient_name ELSE sender_name END AS peer_name,
                 {COLUMNS}
             FROM mensajes
             WHERE session_id IS NULL AND (sender_id = $1 OR recipient_id = $1)
             ORDER BY peer_id, created_at DESC, seq DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(DirectPeer {
                    peer_id: row.peer_id,
                    peer_name: row.peer_name,
                    last_message: Message::try_from(row.message)?,
                })
            })
            .collect()
    }

    async fn count_unread_from(&self, sender_id: &str, recipient_id: &str) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM mensajes
             WHERE session_id IS NULL AND sender_id = $1 AND recipient_id = $2 AND is_read = FALSE",
        )
        .bind(sender_id)
        .bind(recipient_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(count)
    }

    async fn mark_message_read(
        &self,
        id: Uuid,
        recipient_id: &str,
    ) -> Result<Option<Message>, StoreError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "UPDATE mensajes SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
             WHERE id = $1 AND recipient_id = $2
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(recipient_id)
        .fetch_optional(&self.db_pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    async fn healthy(&self) -> bool {
        match sqlx::query("SELECT 1").fetch_one(&self.db_pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Message store health check failed: {}", e);
                false
            }
        }
    }
}
