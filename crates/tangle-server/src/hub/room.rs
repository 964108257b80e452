//! Broadcast rooms.
//!
//! A room is a set of live connections sharing a durable room id. It does
//! not know whether it represents a private pair or a group; the store
//! decided that when it resolved the id. Broadcasting serializes the
//! envelope once and fans the same `Arc<str>` out to every member.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use tangle_core::envelope::ServerMessage;
use tangle_core::{RoomId, UserId};

use super::connection::{ConnState, Connection, SendOutcome};

/// A live broadcast group.
pub struct Room {
    /// Durable identity of this room.
    pub id: RoomId,
    members: Mutex<HashMap<UserId, Arc<Connection>>>,
}

impl Room {
    /// Create an empty room.
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: Mutex::new(HashMap::new()),
        }
    }

    /// Add a connection to the room. Rejoining replaces the old handle,
    /// which happens when a user reconnects. Connections already tearing
    /// down are refused, so an evicted connection's setup loop cannot
    /// sneak back into a room.
    pub fn join(&self, connection: Arc<Connection>) -> bool {
        if matches!(connection.state(), ConnState::Draining | ConnState::Closed) {
            return false;
        }
        let user_id = connection.user_id;
        let _ = connection.join_room(self.id.clone());
        let _ = self.members.lock().insert(user_id, connection);
        debug!(room_id = %self.id, user_id, "joined room");
        true
    }

    /// Remove a connection from the room. Only the handle on record is
    /// removed; a stale handle from before a reconnect leaves the
    /// replacement's membership alone. Returns `true` if removed.
    pub fn leave(&self, connection: &Arc<Connection>) -> bool {
        let user_id = connection.user_id;
        let removed = {
            let mut members = self.members.lock();
            let current = members
                .get(&user_id)
                .is_some_and(|member| Arc::ptr_eq(member, connection));
            if current {
                let _ = members.remove(&user_id);
            }
            current
        };
        let _ = connection.leave_room(&self.id);
        if removed {
            debug!(room_id = %self.id, user_id, "left room");
        }
        removed
    }

    /// Whether a user is currently in the room.
    pub fn contains(&self, user_id: UserId) -> bool {
        self.members.lock().contains_key(&user_id)
    }

    /// Number of live members.
    pub fn member_count(&self) -> usize {
        self.members.lock().len()
    }

    /// Whether the room has no live members.
    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// User ids of the current members.
    pub fn member_ids(&self) -> Vec<UserId> {
        self.members.lock().keys().copied().collect()
    }

    /// Serialize once and deliver to every member.
    ///
    /// Returns the users whose connections overflowed and must be torn
    /// down by the caller; the hub owns teardown, the room does not.
    pub fn broadcast(&self, message: &ServerMessage) -> Vec<UserId> {
        let Ok(json) = serde_json::to_string(message) else {
            return Vec::new();
        };
        self.broadcast_frame(&Arc::from(json.as_str()))
    }

    /// Deliver a pre-serialized frame to every member.
    pub fn broadcast_frame(&self, frame: &Arc<str>) -> Vec<UserId> {
        let members = self.members.lock();
        let mut overflowed = Vec::new();
        for (user_id, connection) in members.iter() {
            match connection.send(Arc::clone(frame)) {
                SendOutcome::Queued | SendOutcome::Buffered | SendOutcome::Closed => {}
                SendOutcome::Overflowed => overflowed.push(*user_id),
            }
        }
        overflowed
    }
}
