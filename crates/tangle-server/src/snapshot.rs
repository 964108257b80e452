//! Snapshot assembly — the first frame after upgrade.
//!
//! Gathers the client's full relationship state in one pass: every contact
//! (anyone connected by a follow edge in either direction) with their
//! private room id and unread count, the follow graph around the client,
//! pending outgoing requests, group memberships, and open join requests.
//!
//! Private rooms are resolved (and so created) here, which is what makes
//! a contact's room id available to the client before any message has
//! been exchanged.

use std::collections::BTreeSet;

use rusqlite::Connection;

use tangle_core::UserId;
use tangle_core::envelope::{Relation, Snapshot};
use tangle_store::Result;
use tangle_store::repositories::{FollowRepo, GroupRepo, MessageRepo, RoomRepo, UserRepo};

/// Build the snapshot for a user.
pub fn build(conn: &Connection, user_id: UserId) -> Result<Snapshot> {
    let following = FollowRepo::following_of(conn, user_id)?;
    let followers = FollowRepo::followers_of(conn, user_id)?;

    let contacts: BTreeSet<UserId> = following.iter().chain(followers.iter()).copied().collect();

    let mut snapshot = Snapshot {
        pending_requests: FollowRepo::pending_targets_of(conn, user_id)?,
        user_groups: GroupRepo::groups_of(conn, user_id)?,
        group_join_requests: GroupRepo::join_requests_of(conn, user_id)?,
        ..Snapshot::default()
    };

    let _ = snapshot.following_map.insert(user_id, following);
    let _ = snapshot.followers_map.insert(user_id, followers);

    for contact_id in contacts {
        let user = UserRepo::get(conn, contact_id)?;
        let room_id = RoomRepo::get_or_create_private(conn, user_id, contact_id)?;
        let unread_count = MessageRepo::unread_count(conn, user_id, contact_id)?;

        let _ = snapshot.user_relations.insert(
            contact_id,
            Relation {
                user_id: contact_id,
                first_name: user.first_name,
                last_name: user.last_name,
                nickname: user.nickname,
                profile_picture: user.profile_picture,
                room_id,
                unread_count,
            },
        );
        let _ = snapshot
            .following_map
            .insert(contact_id, FollowRepo::following_of(conn, contact_id)?);
        let _ = snapshot
            .followers_map
            .insert(contact_id, FollowRepo::followers_of(conn, contact_id)?);
    }

    Ok(snapshot)
}
