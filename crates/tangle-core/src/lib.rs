//! # tangle-core
//!
//! Shared vocabulary for the Tangle realtime backend:
//!
//! - **Envelope**: the closed `{kind, payload}` tagged unions exchanged over
//!   the WebSocket — [`envelope::ClientMessage`] inbound,
//!   [`envelope::ServerMessage`] outbound
//! - **IDs**: the branded [`ids::RoomId`] plus generators for message ids and
//!   session tokens
//! - **Constants**: liveness window, ping interval, frame and queue limits

#![deny(unsafe_code)]

pub mod constants;
pub mod envelope;
pub mod ids;

pub use ids::{GroupId, RoomId, UserId};
