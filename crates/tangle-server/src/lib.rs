//! # tangle-server
//!
//! The realtime hub for Tangle: one persistent WebSocket per logged-in
//! user, multiplexing chat, invitations, and the follow lifecycle over a
//! single `{kind, payload}` envelope stream.
//!
//! - **Gate**: cookie-session middleware in front of the upgrade endpoint
//! - **Hub**: the connection registry — one live connection per user,
//!   rooms resolved and joined on demand
//! - **Connection**: bounded outbound queue with an overflow buffer and
//!   a dual-pump socket loop (read pump, write pump with ping ticker)
//! - **Router**: exhaustive dispatch over the closed inbound envelope
//! - **Sweeper**: background expiry of idle login sessions

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod gate;
pub mod hub;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod snapshot;
pub mod sweeper;

pub use config::ServerConfig;
pub use errors::{Result, ServerError};
pub use server::{AppState, TangleServer};
