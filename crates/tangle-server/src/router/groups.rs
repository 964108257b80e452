//! Group invitation and join-request handlers.
//!
//! Invitations are answered by the invitee; join requests are answered by
//! the group's creator, and the creator check happens here so a forged
//! request id cannot admit anyone.

use std::sync::Arc;

use tracing::debug;

use tangle_core::envelope::{GroupInviteReply, RequestRef, ServerMessage};
use tangle_store::repositories::GroupRepo;

use crate::errors::{Result, ServerError};
use crate::hub::Connection;
use crate::router::reply;
use crate::server::AppState;

/// Handle `groupInvite`: the caller's pending invitations.
pub async fn invite_check(state: &AppState, connection: &Arc<Connection>) -> Result<()> {
    let notices = {
        let conn = state.store.conn()?;
        GroupRepo::invites_for(&conn, connection.user_id)?
    };
    reply(
        state,
        connection,
        &ServerMessage::GroupInviteResponse(notices),
    )
    .await;
    Ok(())
}

/// Handle `gInviteResponse`: accept or decline an invitation.
pub fn invite_reply(
    state: &AppState,
    connection: &Arc<Connection>,
    message: GroupInviteReply,
) -> Result<()> {
    let actor = connection.user_id;
    let conn = state.store.conn()?;
    if message.accept {
        GroupRepo::accept_invite(&conn, message.group_id, actor)?;
        debug!(user_id = actor, group_id = message.group_id, "joined group");
    } else {
        GroupRepo::decline_invite(&conn, message.group_id, actor)?;
    }
    Ok(())
}

/// Handle `groupJoinRequestCheck`: pending requests across the groups
/// the caller created.
pub async fn join_request_check(state: &AppState, connection: &Arc<Connection>) -> Result<()> {
    let notices = {
        let conn = state.store.conn()?;
        GroupRepo::join_requests_for_creator(&conn, connection.user_id)?
    };
    reply(
        state,
        connection,
        &ServerMessage::GroupJoinRequestResponse(notices),
    )
    .await;
    Ok(())
}

/// Handle `acceptGroupJoinRequest`: creator-only admission.
pub fn accept_join_request(
    state: &AppState,
    connection: &Arc<Connection>,
    message: RequestRef,
) -> Result<()> {
    let actor = connection.user_id;
    let conn = state.store.conn()?;
    ensure_creator(&conn, actor, message.request_id)?;
    let (group_id, user_id) = GroupRepo::accept_join_request(&conn, message.request_id)?;
    debug!(user_id, group_id, "join request accepted");
    Ok(())
}

/// Handle `declineGroupJoinRequest`.
pub fn decline_join_request(
    state: &AppState,
    connection: &Arc<Connection>,
    message: RequestRef,
) -> Result<()> {
    let conn = state.store.conn()?;
    ensure_creator(&conn, connection.user_id, message.request_id)?;
    GroupRepo::decline_join_request(&conn, message.request_id)?;
    Ok(())
}

/// Only the creator of the request's group may answer it.
fn ensure_creator(
    conn: &rusqlite::Connection,
    actor: tangle_core::UserId,
    request_id: i64,
) -> Result<()> {
    let Some(group_id) = GroupRepo::join_request_group(conn, request_id)? else {
        return Err(ServerError::Invalid("join request no longer exists"));
    };
    let group = GroupRepo::get(conn, group_id)?;
    if group.creator_id != actor {
        return Err(ServerError::NotGroupCreator {
            user_id: actor,
            group_id,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::test_support::{connect, register_user, test_state};
    use tangle_core::{GroupId, UserId};

    fn make_group(state: &AppState, creator: UserId) -> GroupId {
        let conn = state.store.conn().unwrap();
        GroupRepo::create(&conn, creator, "book club", "we read").unwrap().id
    }

    #[tokio::test]
    async fn invite_check_lists_pending_invitations() {
        let state = test_state();
        let ada = register_user(&state, "ada");
        let bob = register_user(&state, "bob");
        let group = make_group(&state, ada);
        {
            let conn = state.store.conn().unwrap();
            GroupRepo::invite(&conn, group, bob, ada).unwrap();
        }
        let (bob_conn, mut rx) = connect(&state, bob).await;

        invite_check(&state, &bob_conn).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(value["kind"], "groupInviteResponse");
        assert_eq!(value["payload"][0]["groupId"], group);
        assert_eq!(value["payload"][0]["creatorName"], "ada Tester");
    }

    #[tokio::test]
    async fn accepting_an_invitation_adds_membership() {
        let state = test_state();
        let ada = register_user(&state, "ada");
        let bob = register_user(&state, "bob");
        let group = make_group(&state, ada);
        {
            let conn = state.store.conn().unwrap();
            GroupRepo::invite(&conn, group, bob, ada).unwrap();
        }
        let (bob_conn, _rx) = connect(&state, bob).await;

        invite_reply(
            &state,
            &bob_conn,
            GroupInviteReply {
                group_id: group,
                user_id: bob,
                accept: true,
            },
        )
        .unwrap();

        let conn = state.store.conn().unwrap();
        assert!(GroupRepo::is_member(&conn, group, bob).unwrap());
        assert!(GroupRepo::invites_for(&conn, bob).unwrap().is_empty());
    }

    #[tokio::test]
    async fn declining_an_invitation_leaves_no_membership() {
        let state = test_state();
        let ada = register_user(&state, "ada");
        let bob = register_user(&state, "bob");
        let group = make_group(&state, ada);
        {
            let conn = state.store.conn().unwrap();
            GroupRepo::invite(&conn, group, bob, ada).unwrap();
        }
        let (bob_conn, _rx) = connect(&state, bob).await;

        invite_reply(
            &state,
            &bob_conn,
            GroupInviteReply {
                group_id: group,
                user_id: bob,
                accept: false,
            },
        )
        .unwrap();

        let conn = state.store.conn().unwrap();
        assert!(!GroupRepo::is_member(&conn, group, bob).unwrap());
    }

    #[tokio::test]
    async fn creator_sees_and_accepts_join_requests() {
        let state = test_state();
        let ada = register_user(&state, "ada");
        let bob = register_user(&state, "bob");
        let group = make_group(&state, ada);
        {
            let conn = state.store.conn().unwrap();
            GroupRepo::request_join(&conn, group, bob).unwrap();
        }
        let (ada_conn, mut rx) = connect(&state, ada).await;

        join_request_check(&state, &ada_conn).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(value["kind"], "groupJoinRequestResponse");
        let request_id = value["payload"][0]["requestId"].as_i64().unwrap();

        accept_join_request(&state, &ada_conn, RequestRef { request_id }).unwrap();
        let conn = state.store.conn().unwrap();
        assert!(GroupRepo::is_member(&conn, group, bob).unwrap());
    }

    #[tokio::test]
    async fn non_creator_cannot_answer_a_join_request() {
        let state = test_state();
        let ada = register_user(&state, "ada");
        let bob = register_user(&state, "bob");
        let eve = register_user(&state, "eve");
        let group = make_group(&state, ada);
        let request_id = {
            let conn = state.store.conn().unwrap();
            GroupRepo::request_join(&conn, group, bob).unwrap();
            GroupRepo::join_requests_for_creator(&conn, ada).unwrap()[0].request_id
        };
        let (eve_conn, _rx) = connect(&state, eve).await;

        let err = accept_join_request(&state, &eve_conn, RequestRef { request_id }).unwrap_err();
        assert!(matches!(err, ServerError::NotGroupCreator { .. }));

        let conn = state.store.conn().unwrap();
        assert!(!GroupRepo::is_member(&conn, group, bob).unwrap());
    }

    #[tokio::test]
    async fn answering_a_vanished_request_is_invalid() {
        let state = test_state();
        let ada = register_user(&state, "ada");
        let (ada_conn, _rx) = connect(&state, ada).await;

        let err =
            accept_join_request(&state, &ada_conn, RequestRef { request_id: 999 }).unwrap_err();
        assert!(matches!(err, ServerError::Invalid(_)));
    }

    #[tokio::test]
    async fn declining_a_join_request_removes_it() {
        let state = test_state();
        let ada = register_user(&state, "ada");
        let bob = register_user(&state, "bob");
        let group = make_group(&state, ada);
        let request_id = {
            let conn = state.store.conn().unwrap();
            GroupRepo::request_join(&conn, group, bob).unwrap();
            GroupRepo::join_requests_for_creator(&conn, ada).unwrap()[0].request_id
        };
        let (ada_conn, _rx) = connect(&state, ada).await;

        decline_join_request(&state, &ada_conn, RequestRef { request_id }).unwrap();

        let conn = state.store.conn().unwrap();
        assert!(!GroupRepo::is_member(&conn, group, bob).unwrap());
        assert!(
            GroupRepo::join_requests_for_creator(&conn, ada)
                .unwrap()
                .is_empty()
        );
    }
}
