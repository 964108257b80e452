//! The hub — registry of live connections and rooms.
//!
//! One connection per user: registering a second connection for the same
//! user evicts the first. Rooms are created on first join and dropped when
//! their last live member leaves; the durable room identity stays in the
//! store, only the in-memory broadcast group is reclaimed.
//!
//! All registry bookkeeping goes through one async mutex, so connect,
//! disconnect, and room membership changes are serialized. Frame delivery
//! never holds that lock — rooms fan out under their own lock.

pub mod connection;
pub mod pumps;
pub mod room;

pub use connection::{ConnState, Connection, SendOutcome};
pub use room::Room;

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::sync::Mutex;
use tracing::{debug, info};

use tangle_core::envelope::ServerMessage;
use tangle_core::{RoomId, UserId};

#[derive(Default)]
struct HubInner {
    connections: HashMap<UserId, Arc<Connection>>,
    rooms: HashMap<RoomId, Arc<Room>>,
}

/// Registry of live connections and broadcast rooms.
#[derive(Default)]
pub struct Hub {
    inner: Mutex<HubInner>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user's connection. If the user already had one, it is
    /// evicted: closed, detached from its rooms, and returned so the
    /// caller can observe the eviction.
    pub async fn register(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let user_id = connection.user_id;
        let previous = {
            let mut inner = self.inner.lock().await;
            let previous = inner.connections.insert(user_id, connection);
            if let Some(old) = &previous {
                let _ = old.close();
                Self::detach_from_rooms(&mut inner, old);
            }
            previous
        };

        counter!("hub_connections_total").increment(1);
        gauge!("hub_connections_active").increment(1.0);
        if previous.is_some() {
            info!(user_id, "evicted previous connection on reconnect");
        } else {
            info!(user_id, "connection registered");
        }
        previous
    }

    /// Unregister a connection, but only if it is still the one on
    /// record — a reconnect may already have replaced it.
    pub async fn unregister(&self, connection: &Arc<Connection>) -> bool {
        let user_id = connection.user_id;
        let removed = {
            let mut inner = self.inner.lock().await;
            let current = inner
                .connections
                .get(&user_id)
                .is_some_and(|c| Arc::ptr_eq(c, connection));
            if current {
                let _ = inner.connections.remove(&user_id);
            }
            Self::detach_from_rooms(&mut inner, connection);
            current
        };

        let _ = connection.close();
        if removed {
            gauge!("hub_connections_active").decrement(1.0);
            info!(user_id, "connection unregistered");
        }
        removed
    }

    /// The live connection for a user, if any.
    pub async fn connection(&self, user_id: UserId) -> Option<Arc<Connection>> {
        self.inner.lock().await.connections.get(&user_id).cloned()
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.connections.len()
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.inner.lock().await.rooms.len()
    }

    /// Join a connection to a room, creating the room on first use.
    /// Returns `None` for connections already tearing down. Eviction
    /// closes the old connection under this same lock, so the state
    /// check cannot race it.
    pub async fn join_room(
        &self,
        room_id: &RoomId,
        connection: Arc<Connection>,
    ) -> Option<Arc<Room>> {
        let mut inner = self.inner.lock().await;
        if matches!(connection.state(), ConnState::Draining | ConnState::Closed) {
            debug!(user_id = connection.user_id, room_id = %room_id, "refusing room join");
            return None;
        }
        let room = Arc::clone(inner.rooms.entry(room_id.clone()).or_insert_with(|| {
            gauge!("hub_rooms_active").increment(1.0);
            debug!(room_id = %room_id, "room created");
            Arc::new(Room::new(room_id.clone()))
        }));
        // A pump-side close can still slip in; don't keep a room that
        // ended up with no members.
        if !room.join(connection) {
            if room.is_empty() {
                let _ = inner.rooms.remove(room_id);
                gauge!("hub_rooms_active").decrement(1.0);
            }
            return None;
        }
        Some(room)
    }

    /// The live room for an id, if it has any members.
    pub async fn room(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.inner.lock().await.rooms.get(room_id).cloned()
    }

    /// Broadcast an envelope to a room's live members. Members whose
    /// overflow buffer exceeded its cap are torn down afterwards.
    pub async fn broadcast_to_room(&self, room_id: &RoomId, message: &ServerMessage) {
        let Some(room) = self.room(room_id).await else {
            return;
        };
        counter!("hub_room_broadcasts_total").increment(1);
        let overflowed = room.broadcast(message);
        for user_id in overflowed {
            counter!("hub_overflow_disconnects_total").increment(1);
            info!(user_id, room_id = %room_id, "tearing down overflowed connection");
            self.disconnect(user_id).await;
        }
    }

    /// Deliver an envelope to one user's connection, if live.
    pub async fn send_to_user(&self, user_id: UserId, message: &ServerMessage) -> SendOutcome {
        let Some(connection) = self.connection(user_id).await else {
            return SendOutcome::Closed;
        };
        let outcome = connection.send_message(message);
        if outcome == SendOutcome::Overflowed {
            counter!("hub_overflow_disconnects_total").increment(1);
            info!(user_id, "tearing down overflowed connection");
            self.disconnect(user_id).await;
        }
        outcome
    }

    /// Close a user's connection and remove it from the registry.
    pub async fn disconnect(&self, user_id: UserId) {
        let connection = self.connection(user_id).await;
        if let Some(connection) = connection {
            let _ = self.unregister(&connection).await;
        }
    }

    /// Close every connection (shutdown). Rooms empty out as a result.
    pub async fn close_all(&self) -> usize {
        let connections: Vec<_> = {
            let inner = self.inner.lock().await;
            inner.connections.values().cloned().collect()
        };
        let count = connections.len();
        for connection in connections {
            let _ = self.unregister(&connection).await;
        }
        count
    }

    /// Remove a connection from every room it joined; drop rooms that
    /// end up empty. Caller holds the registry lock.
    fn detach_from_rooms(inner: &mut HubInner, connection: &Arc<Connection>) {
        for room_id in connection.take_rooms() {
            let emptied = inner.rooms.get(&room_id).is_some_and(|room| {
                let _ = room.leave(connection);
                room.is_empty()
            });
            if emptied {
                let _ = inner.rooms.remove(&room_id);
                gauge!("hub_rooms_active").decrement(1.0);
                debug!(room_id = %room_id, "room dropped, last member left");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_core::envelope::{ChatMessageOut, Snapshot};
    use tokio::sync::mpsc;

    fn member(user_id: UserId, capacity: usize) -> (Arc<Connection>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Connection::new(user_id, tx)), rx)
    }

    fn chat(room: &str, content: &str) -> ServerMessage {
        ServerMessage::ChatMessage(ChatMessageOut {
            sender_user_id: 1,
            sender_first_name: "Ada".into(),
            sender_last_name: "Lovelace".into(),
            content: content.into(),
            room_id: RoomId::from(room),
            timestamp: chrono::Utc::now(),
            group_id: None,
        })
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let hub = Hub::new();
        let (ada, _rx) = member(1, 8);
        assert!(hub.register(Arc::clone(&ada)).await.is_none());
        assert_eq!(hub.connection_count().await, 1);
        assert!(Arc::ptr_eq(&hub.connection(1).await.unwrap(), &ada));
    }

    #[tokio::test]
    async fn reconnect_evicts_previous_connection() {
        let hub = Hub::new();
        let (old, _old_rx) = member(1, 8);
        let (new, _new_rx) = member(1, 8);
        let _ = hub.register(Arc::clone(&old)).await;

        let room_id = RoomId::from("r1");
        let _ = hub.join_room(&room_id, Arc::clone(&old)).await;

        let evicted = hub.register(Arc::clone(&new)).await.unwrap();
        assert!(Arc::ptr_eq(&evicted, &old));
        // Draining until its write pump finishes the flush.
        assert_eq!(evicted.state(), ConnState::Draining);
        assert_eq!(hub.connection_count().await, 1);

        // The evicted connection left its rooms; the room emptied out.
        assert!(hub.room(&room_id).await.is_none());
    }

    #[tokio::test]
    async fn stale_unregister_does_not_remove_replacement() {
        let hub = Hub::new();
        let (old, _old_rx) = member(1, 8);
        let (new, _new_rx) = member(1, 8);
        let _ = hub.register(Arc::clone(&old)).await;
        let _ = hub.register(Arc::clone(&new)).await;

        // The old pump finishing late must not kick out the new connection.
        assert!(!hub.unregister(&old).await);
        assert!(Arc::ptr_eq(&hub.connection(1).await.unwrap(), &new));
    }

    #[tokio::test]
    async fn stale_unregister_keeps_replacement_room_membership() {
        let hub = Hub::new();
        let (old, _old_rx) = member(1, 8);
        let (new, mut new_rx) = member(1, 8);
        let _ = hub.register(Arc::clone(&old)).await;
        let _ = hub.register(Arc::clone(&new)).await; // evicts old

        // The evicted connection's setup loop keeps trying to join;
        // it must be refused.
        let room_id = RoomId::from("r1");
        assert!(hub.join_room(&room_id, Arc::clone(&old)).await.is_none());
        let _ = hub.join_room(&room_id, Arc::clone(&new)).await.unwrap();

        // Its late unregister must not touch the replacement's rooms.
        assert!(!hub.unregister(&old).await);
        let room = hub.room(&room_id).await.expect("room vanished");
        assert!(room.contains(1));
        assert!(new.in_room(&room_id));
        hub.broadcast_to_room(&room_id, &chat("r1", "still here")).await;
        assert!(new_rx.recv().await.unwrap().contains("still here"));
    }

    #[tokio::test]
    async fn join_room_creates_then_reuses() {
        let hub = Hub::new();
        let (ada, _a) = member(1, 8);
        let (bob, _b) = member(2, 8);

        let room_id = RoomId::from("r1");
        let first = hub.join_room(&room_id, ada).await.unwrap();
        let second = hub.join_room(&room_id, bob).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(hub.room_count().await, 1);
        assert_eq!(first.member_count(), 2);
    }

    #[tokio::test]
    async fn broadcast_reaches_joined_members_only() {
        let hub = Hub::new();
        let (ada, mut ada_rx) = member(1, 8);
        let (bob, mut bob_rx) = member(2, 8);
        let (eve, mut eve_rx) = member(3, 8);
        let _ = hub.register(Arc::clone(&ada)).await;
        let _ = hub.register(Arc::clone(&bob)).await;
        let _ = hub.register(Arc::clone(&eve)).await;

        let room_id = RoomId::from("r1");
        let _ = hub.join_room(&room_id, ada).await;
        let _ = hub.join_room(&room_id, bob).await;

        hub.broadcast_to_room(&room_id, &chat("r1", "hello")).await;

        assert!(ada_rx.recv().await.unwrap().contains("hello"));
        assert!(bob_rx.recv().await.unwrap().contains("hello"));
        assert!(eve_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_to_unknown_room_is_a_noop() {
        let hub = Hub::new();
        hub.broadcast_to_room(&RoomId::from("ghost"), &chat("ghost", "x"))
            .await;
    }

    #[tokio::test]
    async fn send_to_user_without_connection_is_closed() {
        let hub = Hub::new();
        let outcome = hub
            .send_to_user(42, &ServerMessage::Snapshot(Snapshot::default()))
            .await;
        assert_eq!(outcome, SendOutcome::Closed);
    }

    #[tokio::test]
    async fn disconnect_empties_rooms() {
        let hub = Hub::new();
        let (ada, _rx) = member(1, 8);
        let _ = hub.register(Arc::clone(&ada)).await;
        let room_id = RoomId::from("r1");
        let _ = hub.join_room(&room_id, Arc::clone(&ada)).await;

        hub.disconnect(1).await;
        assert_eq!(hub.connection_count().await, 0);
        assert_eq!(hub.room_count().await, 0);
        assert_eq!(ada.state(), ConnState::Draining);
    }

    #[tokio::test]
    async fn room_survives_while_members_remain() {
        let hub = Hub::new();
        let (ada, _a) = member(1, 8);
        let (bob, _b) = member(2, 8);
        let _ = hub.register(Arc::clone(&ada)).await;
        let _ = hub.register(Arc::clone(&bob)).await;

        let room_id = RoomId::from("r1");
        let _ = hub.join_room(&room_id, ada).await;
        let _ = hub.join_room(&room_id, bob).await;

        hub.disconnect(1).await;
        let room = hub.room(&room_id).await.unwrap();
        assert_eq!(room.member_ids(), vec![2]);
    }

    #[tokio::test]
    async fn close_all_clears_the_registry() {
        let hub = Hub::new();
        let mut receivers = Vec::new();
        for user_id in 1..=3 {
            let (conn, rx) = member(user_id, 8);
            let _ = hub.register(conn).await;
            receivers.push(rx);
        }
        assert_eq!(hub.close_all().await, 3);
        assert_eq!(hub.connection_count().await, 0);
    }
}
