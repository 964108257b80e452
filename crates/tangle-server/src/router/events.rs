//! Event invitation handlers.
//!
//! Members are invited when an event is created; the socket only queries
//! unanswered invitations and records going/notGoing answers. The answer
//! is written against the caller's own invitation row, so one member
//! cannot answer for another.

use std::sync::Arc;

use tracing::debug;

use tangle_core::envelope::{EventInviteReply, ServerMessage};
use tangle_store::repositories::EventRepo;

use crate::errors::Result;
use crate::hub::Connection;
use crate::router::reply;
use crate::server::AppState;

/// Handle `eventInvite`: the caller's unanswered invitations.
pub async fn invite_check(state: &AppState, connection: &Arc<Connection>) -> Result<()> {
    let notices = {
        let conn = state.store.conn()?;
        EventRepo::pending_for(&conn, connection.user_id)?
    };
    reply(
        state,
        connection,
        &ServerMessage::EventInviteResponse(notices),
    )
    .await;
    Ok(())
}

/// Handle `eInviteResponse`: record a going/notGoing answer.
pub fn invite_reply(
    state: &AppState,
    connection: &Arc<Connection>,
    message: EventInviteReply,
) -> Result<()> {
    let actor = connection.user_id;
    let conn = state.store.conn()?;
    EventRepo::record_response(&conn, message.response_id, actor, message.response)?;
    debug!(
        user_id = actor,
        response_id = message.response_id,
        rsvp = message.response.as_str(),
        "event invitation answered"
    );
    Ok(())
}
