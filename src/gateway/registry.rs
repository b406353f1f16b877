// src/gateway/registry.rs
//! Live connections, session rooms and personal channels.
//!
//! Every connection joins its owner's personal channel on registration, so a
//! user with several tabs receives notifications in all of them whatever role
//! each tab authenticated with. Room membership lives only as long as the
//! connection.
//!
//! Outboxes are bounded. A connection whose outbox is full when an event is
//! offered is unregistered; dropping its sender ends the socket's writer.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::events::ServerEvent;
use crate::models::auth::Identity;

pub type ConnectionId = Uuid;

/// Events queued per connection before it counts as a slow consumer.
pub const OUTBOX_CAPACITY: usize = 256;

pub fn room_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

pub fn personal_channel(user_id: &str) -> String {
    format!("user:{}", user_id)
}

struct Connection {
    identity: Identity,
    outbox: mpsc::Sender<ServerEvent>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
    channels: HashMap<String, HashSet<ConnectionId>>,
}

impl RegistryState {
    /// Offers the event to each target without waiting. Targets whose outbox
    /// is full are pushed onto `lagging`.
    fn deliver<'a>(
        &self,
        targets: impl IntoIterator<Item = &'a ConnectionId>,
        event: &ServerEvent,
        lagging: &mut Vec<ConnectionId>,
    ) -> usize {
        let mut delivered = 0;
        for id in targets {
            let Some(connection) = self.connections.get(id) else {
                continue;
            };
            match connection.outbox.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => lagging.push(*id),
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, identity: Identity, outbox: mpsc::Sender<ServerEvent>) -> ConnectionId {
        let id = Uuid::new_v4();
        let channel = personal_channel(&identity.user_id);
        let mut state = self.state.write().await;
        state.channels.entry(channel.clone()).or_default().insert(id);
        tracing::info!(connection_id = %id, user_id = %identity.user_id, role = %identity.role, channel = %channel, "🔌 connection registered");
        state.connections.insert(
            id,
            Connection {
                identity,
                outbox,
                rooms: HashSet::new(),
            },
        );
        id
    }

    /// Drops the connection from every room and channel it was in.
    pub async fn unregister(&self, id: ConnectionId) -> Option<Identity> {
        let mut state = self.state.write().await;
        let connection = state.connections.remove(&id)?;

        for room in &connection.rooms {
            if let Some(members) = state.rooms.get_mut(room) {
                members.remove(&id);
                if members.is_empty() {
                    state.rooms.remove(room);
                }
            }
        }
        let channel = personal_channel(&connection.identity.user_id);
        if let Some(members) = state.channels.get_mut(&channel) {
            members.remove(&id);
            if members.is_empty() {
                state.channels.remove(&channel);
            }
        }

        tracing::info!(connection_id = %id, user_id = %connection.identity.user_id, "🔌 connection unregistered");
        Some(connection.identity)
    }

    async fn evict(&self, lagging: Vec<ConnectionId>) {
        for id in lagging {
            tracing::warn!(connection_id = %id, capacity = OUTBOX_CAPACITY, "⚠️ outbox full, dropping slow connection");
            self.unregister(id).await;
        }
    }

    pub async fn identity(&self, id: ConnectionId) -> Option<Identity> {
        self.state.read().await.connections.get(&id).map(|c| c.identity.clone())
    }

    /// Returns false if the connection is gone.
    pub async fn join(&self, id: ConnectionId, room: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(connection) = state.connections.get_mut(&id) else {
            return false;
        };
        connection.rooms.insert(room.to_string());
        state.rooms.entry(room.to_string()).or_default().insert(id);
        true
    }

    /// Returns whether the connection was in the room. Leaving twice is fine.
    pub async fn leave(&self, id: ConnectionId, room: &str) -> bool {
        let mut state = self.state.write().await;
        let was_member = state
            .connections
            .get_mut(&id)
            .map(|c| c.rooms.remove(room))
            .unwrap_or(false);
        if let Some(members) = state.rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                state.rooms.remove(room);
            }
        }
        was_member
    }

    pub async fn is_member(&self, id: ConnectionId, room: &str) -> bool {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .map(|members| members.contains(&id))
            .unwrap_or(false)
    }

    pub async fn emit_to(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let mut lagging = Vec::new();
        let delivered = self.state.read().await.deliver([&id], &event, &mut lagging);
        self.evict(lagging).await;
        delivered == 1
    }

    /// Number of connections the event was handed to.
    pub async fn emit_to_room(&self, room: &str, event: &ServerEvent) -> usize {
        let mut lagging = Vec::new();
        let delivered = {
            let state = self.state.read().await;
            match state.rooms.get(room) {
                Some(members) => state.deliver(members, event, &mut lagging),
                None => 0,
            }
        };
        self.evict(lagging).await;
        delivered
    }

    /// Every connection of a user, whatever role it connected with.
    pub async fn emit_to_user(&self, user_id: &str, event: &ServerEvent) -> usize {
        let mut lagging = Vec::new();
        let delivered = {
            let state = self.state.read().await;
            match state.channels.get(&personal_channel(user_id)) {
                Some(members) => state.deliver(members, event, &mut lagging),
                None => 0,
            }
        };
        self.evict(lagging).await;
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    pub async fn room_size(&self, room: &str) -> usize {
        self.state.read().await.rooms.get(room).map(HashSet::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::Role;
    use tokio::sync::mpsc::error::TryRecvError;

    fn typing() -> ServerEvent {
        ServerEvent::Typing {
            from_id: "x".to_string(),
            from_name: "X".to_string(),
            is_typing: true,
        }
    }

    #[tokio::test]
    async fn test_personal_channel_spans_every_role_of_a_user() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        registry.register(Identity::new("a", "Ana", Role::Student), tx1).await;
        registry.register(Identity::new("a", "Ana", Role::Admin), tx2).await;

        assert_eq!(registry.emit_to_user("a", &typing()).await, 2);
        assert_eq!(registry.emit_to_user("b", &typing()).await, 0);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_rooms_and_idempotent_leave() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        let id = registry.register(Identity::new("t", "Tutor", Role::Tutor), tx).await;
        let room = room_key("s-1");

        assert!(!registry.leave(id, &room).await);
        assert!(registry.join(id, &room).await);
        assert!(registry.join(id, &room).await);
        assert_eq!(registry.room_size(&room).await, 1);

        assert_eq!(registry.emit_to_room(&room, &typing()).await, 1);
        assert!(rx.try_recv().is_ok());

        assert!(registry.leave(id, &room).await);
        assert!(!registry.leave(id, &room).await);
        assert_eq!(registry.emit_to_room(&room, &typing()).await, 0);
    }

    #[tokio::test]
    async fn test_unregister_cleans_up() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(8);
        let id = registry.register(Identity::new("t", "Tutor", Role::Tutor), tx).await;
        registry.join(id, &room_key("s-1")).await;

        let identity = registry.unregister(id).await.unwrap();
        assert_eq!(identity.user_id, "t");
        assert_eq!(registry.connection_count().await, 0);
        assert_eq!(registry.room_size(&room_key("s-1")).await, 0);
        assert_eq!(registry.emit_to_user("t", &typing()).await, 0);
        assert!(!registry.join(id, &room_key("s-1")).await);
        assert!(registry.unregister(id).await.is_none());
    }

    #[tokio::test]
    async fn test_closed_outbox_is_not_counted() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::channel(8);
        registry.register(Identity::new("a", "Ana", Role::Student), tx).await;
        drop(rx);
        assert_eq!(registry.emit_to_user("a", &typing()).await, 0);
    }

    #[tokio::test]
    async fn test_slow_consumer_is_dropped() {
        let registry = ConnectionRegistry::new();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        let slow = registry.register(Identity::new("a", "Ana", Role::Student), slow_tx).await;
        let fast = registry.register(Identity::new("t", "Tutor", Role::Tutor), fast_tx).await;
        let room = room_key("s-1");
        registry.join(slow, &room).await;
        registry.join(fast, &room).await;

        assert_eq!(registry.emit_to_room(&room, &typing()).await, 2);
        assert_eq!(registry.emit_to_room(&room, &typing()).await, 1);

        assert!(registry.identity(slow).await.is_none());
        assert_eq!(registry.room_size(&room).await, 1);
        assert!(!registry.emit_to(slow, typing()).await);

        // What was queued still drains, then the writer sees the outbox close.
        assert!(slow_rx.try_recv().is_ok());
        assert!(matches!(slow_rx.try_recv(), Err(TryRecvError::Disconnected)));
        assert!(fast_rx.try_recv().is_ok());
        assert!(fast_rx.try_recv().is_ok());
    }
}
