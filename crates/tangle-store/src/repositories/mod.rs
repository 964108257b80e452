//! Stateless repositories — every method takes `&Connection`.
//!
//! Transactions compose at the call site: callers that need multiple
//! repository calls to commit atomically open the transaction themselves.

pub mod event;
pub mod follow;
pub mod group;
pub mod message;
pub mod room;
pub mod session;
pub mod user;

pub use event::EventRepo;
pub use follow::FollowRepo;
pub use group::GroupRepo;
pub use message::MessageRepo;
pub use room::RoomRepo;
pub use session::SessionRepo;
pub use user::UserRepo;
