// src/conversations.rs
//! Inbox views: one entry per session chat and per direct-message peer.

use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::error::ChatError;
use crate::membership::MembershipResolver;
use crate::models::auth::Identity;
use crate::models::message::{ConversationSummary, DirectConversationSummary};
use crate::store::{MessageStore, StoreError};

#[derive(Clone)]
pub struct ConversationAggregator {
    store: Arc<dyn MessageStore>,
    membership: MembershipResolver,
    timeout: Duration,
}

impl ConversationAggregator {
    pub fn new(store: Arc<dyn MessageStore>, membership: MembershipResolver, timeout: Duration) -> Self {
        Self {
            store,
            membership,
            timeout,
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ChatError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        Ok(tokio::time::timeout(self.timeout, call).await??)
    }

    /// Session chats the user belongs to, most recent activity first. Sessions
    /// whose metadata cannot be fetched are left out rather than failing the
    /// whole listing.
    pub async fn list_conversations(&self, user: &Identity) -> Result<Vec<ConversationSummary>, ChatError> {
        let session_ids = self.membership.sessions_for(user).await?;

        let summaries = join_all(session_ids.iter().map(|id| self.summarize(user, id))).await;
        let mut conversations = summaries
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        conversations.sort_by(by_recent_activity);
        Ok(conversations)
    }

    async fn summarize(&self, user: &Identity, session_id: &str) -> Result<Option<ConversationSummary>, ChatError> {
        let session = match self.membership.session_info(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::debug!(session_id, "session vanished, leaving it out of the inbox");
                return Ok(None);
            }
            Err(err) => {
                tracing::warn!(session_id, error = %err, "session metadata unavailable, leaving it out of the inbox");
                return Ok(None);
            }
        };

        let (last_message, unread_count) = tokio::try_join!(
            self.bounded(self.store.last_message(session_id)),
            self.bounded(self.store.count_unread_in_session(session_id, &user.user_id)),
        )?;

        Ok(Some(ConversationSummary {
            session_id: session.id,
            title: session.title,
            subject_name: session.subject_name,
            last_message,
            unread_count,
        }))
    }

    pub async fn list_direct_conversations(&self, user: &Identity) -> Result<Vec<DirectConversationSummary>, ChatError> {
        let peers = self.bounded(self.store.direct_peers(&user.user_id)).await?;

        let counts = join_all(
            peers
                .iter()
                .map(|peer| self.bounded(self.store.count_unread_from(&peer.peer_id, &user.user_id))),
        )
        .await;

        let mut conversations = Vec::with_capacity(peers.len());
        for (peer, unread_count) in peers.into_iter().zip(counts) {
            conversations.push(DirectConversationSummary {
                peer_id: peer.peer_id,
                peer_name: peer.peer_name,
                last_message: peer.last_message,
                unread_count: unread_count?,
            });
        }
        conversations.sort_by(|a, b| {
            b.last_message
                .created_at
                .cmp(&a.last_message.created_at)
                .then_with(|| a.peer_id.cmp(&b.peer_id))
        });
        Ok(conversations)
    }

    pub async fn total_unread(&self, user: &Identity) -> Result<i64, ChatError> {
        self.bounded(self.store.count_unread(&user.user_id)).await
    }
}

/// Newest last message first; sessions without messages last; ties by id.
fn by_recent_activity(a: &ConversationSummary, b: &ConversationSummary) -> Ordering {
    let a_at = a.last_message.as_ref().map(|m| m.created_at);
    let b_at = b.last_message.as_ref().map(|m| m.created_at);
    match (a_at, b_at) {
        (Some(a_at), Some(b_at)) => b_at.cmp(&a_at),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.session_id.cmp(&b.session_id))
}
