//! Follow lifecycle handlers.
//!
//! The acting connection is always the authoritative party: requests and
//! cancellations act as the requester, accept/decline act as the target.
//! Sending or withdrawing a request pushes the target's refreshed pending
//! list to their live connection, so the badge updates without polling.

use std::sync::Arc;

use tracing::debug;

use tangle_core::envelope::{FollowRequestDecision, FollowRequestSend, ServerMessage};
use tangle_store::repositories::{FollowRepo, RoomRepo};

use crate::errors::Result;
use crate::hub::Connection;
use crate::router::reply;
use crate::server::AppState;

/// Handle `followRequest`: record it and nudge the target.
pub async fn request(
    state: &AppState,
    connection: &Arc<Connection>,
    message: FollowRequestSend,
) -> Result<()> {
    let actor = connection.user_id;
    let target = message.target_user_id;
    {
        let conn = state.store.conn()?;
        FollowRepo::request(&conn, actor, target)?;
    }
    debug!(user_id = actor, target, "follow request recorded");
    push_pending(state, target).await
}

/// Handle `cancelFollowRequest`: withdraw and nudge the target.
pub async fn cancel(
    state: &AppState,
    connection: &Arc<Connection>,
    message: FollowRequestSend,
) -> Result<()> {
    let actor = connection.user_id;
    let target = message.target_user_id;
    {
        let conn = state.store.conn()?;
        FollowRepo::cancel(&conn, actor, target)?;
    }
    push_pending(state, target).await
}

/// Handle `acceptFollowRequest`: create the follow edge and resolve the
/// pair's private room, so the new contact is immediately chattable.
pub fn accept(
    state: &AppState,
    connection: &Arc<Connection>,
    message: FollowRequestDecision,
) -> Result<()> {
    let actor = connection.user_id;
    let conn = state.store.conn()?;
    FollowRepo::accept(&conn, actor, message.follower_user_id)?;
    let _ = RoomRepo::get_or_create_private(&conn, actor, message.follower_user_id)?;
    debug!(
        user_id = actor,
        follower = message.follower_user_id,
        "follow request accepted"
    );
    Ok(())
}

/// Handle `declineFollowRequest`.
pub fn decline(
    state: &AppState,
    connection: &Arc<Connection>,
    message: FollowRequestDecision,
) -> Result<()> {
    let conn = state.store.conn()?;
    FollowRepo::decline(&conn, connection.user_id, message.follower_user_id)?;
    Ok(())
}

/// Handle `followRequestCheck`: the caller's pending incoming requests.
pub async fn check(state: &AppState, connection: &Arc<Connection>) -> Result<()> {
    let notices = {
        let conn = state.store.conn()?;
        FollowRepo::pending_for(&conn, connection.user_id)?
    };
    reply(
        state,
        connection,
        &ServerMessage::FollowRequestResponse(notices),
    )
    .await;
    Ok(())
}

/// Push a user's refreshed pending list to their live connection, if any.
async fn push_pending(state: &AppState, target: tangle_core::UserId) -> Result<()> {
    let notices = {
        let conn = state.store.conn()?;
        FollowRepo::pending_for(&conn, target)?
    };
    let _ = state
        .hub
        .send_to_user(target, &ServerMessage::FollowRequestResponse(notices))
        .await;
    Ok(())
}
