//! The message router.
//!
//! Dispatches every inbound envelope to its handler with an exhaustive
//! match — adding a kind to [`ClientMessage`] forces a decision here.
//!
//! The connection's user id is the authoritative actor for every
//! operation; ids inside payloads identify *other* parties only. A
//! handler error is logged by the pump and the connection lives on —
//! only queue overflow tears a connection down.

pub mod chat;
pub mod events;
pub mod follows;
pub mod groups;

use std::sync::Arc;

use metrics::counter;

use tangle_core::envelope::{ClientMessage, ServerMessage};

use crate::errors::Result;
use crate::hub::{Connection, SendOutcome};
use crate::server::AppState;

/// Route one inbound envelope.
pub async fn dispatch(
    state: &AppState,
    connection: &Arc<Connection>,
    message: ClientMessage,
) -> Result<()> {
    counter!("router_frames_total", "kind" => message.kind()).increment(1);
    match message {
        ClientMessage::ChatMessage(m) => chat::chat_message(state, connection, m).await,
        ClientMessage::JoinGroupChat(m) => chat::join_group_chat(state, connection, m).await,
        ClientMessage::FetchMessages(m) => chat::fetch_messages(state, connection, m).await,
        ClientMessage::EventInvite(_) => events::invite_check(state, connection).await,
        ClientMessage::EventInviteReply(m) => events::invite_reply(state, connection, m),
        ClientMessage::GroupInvite(_) => groups::invite_check(state, connection).await,
        ClientMessage::GroupInviteReply(m) => groups::invite_reply(state, connection, m),
        ClientMessage::FollowRequest(m) => follows::request(state, connection, m).await,
        ClientMessage::AcceptFollowRequest(m) => follows::accept(state, connection, m),
        ClientMessage::DeclineFollowRequest(m) => follows::decline(state, connection, m),
        ClientMessage::CancelFollowRequest(m) => follows::cancel(state, connection, m).await,
        ClientMessage::FollowRequestCheck(_) => follows::check(state, connection).await,
        ClientMessage::GroupJoinRequestCheck(_) => {
            groups::join_request_check(state, connection).await
        }
        ClientMessage::AcceptGroupJoinRequest(m) => {
            groups::accept_join_request(state, connection, m)
        }
        ClientMessage::DeclineGroupJoinRequest(m) => {
            groups::decline_join_request(state, connection, m)
        }
    }
}

/// Reply to the sending connection; overflow tears it down.
pub(crate) async fn reply(state: &AppState, connection: &Arc<Connection>, message: &ServerMessage) {
    if connection.send_message(message) == SendOutcome::Overflowed {
        state.hub.disconnect(connection.user_id).await;
    }
}
