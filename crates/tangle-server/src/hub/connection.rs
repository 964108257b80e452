//! Per-user connection state.
//!
//! Outbound frames go through a bounded queue to the write pump. When the
//! queue is full the frame lands in the overflow buffer instead, which the
//! write pump drains opportunistically; a peer that lets the overflow grow
//! past its cap is torn down rather than allowed to consume unbounded
//! memory.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tangle_core::constants::OVERFLOW_CAP;
use tangle_core::envelope::ServerMessage;
use tangle_core::{RoomId, UserId};

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    /// Being set up: snapshot assembly and room joins. Frames queue but
    /// the pumps are not running yet.
    Connecting = 0,
    /// Accepting and delivering frames.
    Active = 1,
    /// No longer accepting frames; the write pump is flushing what's left.
    Draining = 2,
    /// Torn down. All sends are rejected.
    Closed = 3,
}

impl ConnState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

/// What happened to a frame handed to [`Connection::send`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued directly on the outbound channel.
    Queued,
    /// Queue was full; the frame went to the overflow buffer.
    Buffered,
    /// The overflow buffer exceeded its cap. The caller must tear the
    /// connection down; the frame was dropped.
    Overflowed,
    /// The connection is draining or closed; the frame was dropped.
    Closed,
}

/// A logged-in user's live connection.
pub struct Connection {
    /// The user this connection belongs to.
    pub user_id: UserId,
    state: AtomicU8,
    tx: mpsc::Sender<Arc<str>>,
    overflow: Mutex<VecDeque<Arc<str>>>,
    rooms: Mutex<HashSet<RoomId>>,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    overflowed_frames: AtomicU64,
    cancel: CancellationToken,
}

impl Connection {
    /// Create a connection wired to the write pump's queue.
    pub fn new(user_id: UserId, tx: mpsc::Sender<Arc<str>>) -> Self {
        let now = Instant::now();
        Self {
            user_id,
            state: AtomicU8::new(ConnState::Connecting as u8),
            tx,
            overflow: Mutex::new(VecDeque::new()),
            rooms: Mutex::new(HashSet::new()),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            overflowed_frames: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move `Connecting` → `Active` once setup is done. Returns `false`
    /// if the connection was closed (or evicted) mid-setup.
    pub fn activate(&self) -> bool {
        self.state
            .compare_exchange(
                ConnState::Connecting as u8,
                ConnState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Begin teardown: move to `Draining` and wake both pumps. The write
    /// pump flushes what is already queued and then finishes the state
    /// machine. Returns `true` only for the caller that initiated
    /// teardown, so it runs exactly once.
    pub fn close(&self) -> bool {
        let initiated = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                (state < ConnState::Draining as u8).then_some(ConnState::Draining as u8)
            })
            .is_ok();
        if initiated {
            self.cancel.cancel();
        }
        initiated
    }

    /// Terminal transition, after the write pump has flushed.
    pub fn finish_close(&self) {
        self.state.store(ConnState::Closed as u8, Ordering::Release);
    }

    /// Token cancelled when the connection closes; the pumps select on it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Enqueue a pre-serialized frame for delivery. Frames queued while
    /// still `Connecting` (the snapshot, early room traffic) go out as
    /// soon as the write pump starts.
    ///
    /// Ordering is decided under the overflow lock, shared with
    /// [`Connection::drain_overflow`]: while anything is buffered, new
    /// frames line up behind it rather than jumping into a queue slot
    /// the pump just freed.
    pub fn send(&self, frame: Arc<str>) -> SendOutcome {
        if matches!(self.state(), ConnState::Draining | ConnState::Closed) {
            return SendOutcome::Closed;
        }
        let mut overflow = self.overflow.lock();
        let frame = if overflow.is_empty() {
            match self.tx.try_send(frame) {
                Ok(()) => return SendOutcome::Queued,
                Err(mpsc::error::TrySendError::Full(frame)) => frame,
                Err(mpsc::error::TrySendError::Closed(_)) => return SendOutcome::Closed,
            }
        } else {
            frame
        };
        if overflow.len() >= OVERFLOW_CAP {
            let _ = self.overflowed_frames.fetch_add(1, Ordering::Relaxed);
            return SendOutcome::Overflowed;
        }
        overflow.push_back(frame);
        SendOutcome::Buffered
    }

    /// Serialize a [`ServerMessage`] and enqueue it.
    ///
    /// Single-target replies go through here; room broadcasts serialize
    /// once at the room and call [`Connection::send`] per member.
    pub fn send_message(&self, message: &ServerMessage) -> SendOutcome {
        match serde_json::to_string(message) {
            Ok(json) => self.send(Arc::from(json.as_str())),
            Err(_) => SendOutcome::Closed,
        }
    }

    /// Move buffered frames back onto the outbound queue, in order.
    /// Returns how many were moved.
    pub fn drain_overflow(&self) -> usize {
        let mut moved = 0;
        let mut overflow = self.overflow.lock();
        while let Some(frame) = overflow.pop_front() {
            match self.tx.try_send(frame) {
                Ok(()) => moved += 1,
                Err(mpsc::error::TrySendError::Full(frame)) => {
                    overflow.push_front(frame);
                    break;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }
        }
        moved
    }

    /// Frames currently waiting in the overflow buffer.
    pub fn overflow_len(&self) -> usize {
        self.overflow.lock().len()
    }

    /// Total frames dropped because the overflow cap was hit.
    pub fn overflow_drop_count(&self) -> u64 {
        self.overflowed_frames.load(Ordering::Relaxed)
    }

    // ── room membership ──────────────────────────────────────────────────

    /// Record membership in a room. Returns `false` if already joined.
    pub fn join_room(&self, room_id: RoomId) -> bool {
        self.rooms.lock().insert(room_id)
    }

    /// Drop membership in a room.
    pub fn leave_room(&self, room_id: &RoomId) -> bool {
        self.rooms.lock().remove(room_id)
    }

    /// Whether this connection has joined a room.
    pub fn in_room(&self, room_id: &RoomId) -> bool {
        self.rooms.lock().contains(room_id)
    }

    /// Snapshot of joined rooms.
    pub fn rooms(&self) -> Vec<RoomId> {
        self.rooms.lock().iter().cloned().collect()
    }

    /// Take the whole membership set (teardown).
    pub fn take_rooms(&self) -> Vec<RoomId> {
        self.rooms.lock().drain().collect()
    }

    // ── liveness ─────────────────────────────────────────────────────────

    /// Mark the connection alive (pong or inbound frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag. Returns `true` if there was any
    /// sign of life since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last sign of life.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
