//! # tangle-store
//!
//! `SQLite` persistence for the Tangle realtime backend:
//!
//! - **Connection pool**: `r2d2` + `rusqlite` with WAL mode and foreign keys
//! - **Migrations**: version-tracked SQL schema embedded at compile time
//! - **Repositories**: stateless, every method takes `&Connection` — sessions,
//!   users, rooms, messages, the follow graph, groups, and event invitations
//! - **[`Store`]**: the facade the server holds; hands out pooled connections

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod row_types;
mod store;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection};
pub use errors::{Result, StoreError};
pub use store::Store;
