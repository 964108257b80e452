//! Chat handlers: posting messages, joining group rooms, history.
//!
//! Room resolution is authoritative: the room a message lands in is
//! derived from its participants (the canonical pair, or the group),
//! never trusted from the payload. Posting joins the sender — and, for
//! private chat, an online receiver — to the live room before the
//! broadcast, so the first message of a conversation is delivered too.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use tangle_core::envelope::{
    ChatMessageIn, ChatMessageOut, FetchMessages, JoinGroupChat, JoinGroupChatResponse,
    MessageHistory, ServerMessage,
};
use tangle_store::repositories::{GroupRepo, MessageRepo, RoomRepo, UserRepo};
use tangle_store::row_types::RoomKind;

use crate::errors::{Result, ServerError};
use crate::hub::Connection;
use crate::router::reply;
use crate::server::AppState;

/// Handle an inbound `chatMessage`.
pub async fn chat_message(
    state: &AppState,
    connection: &Arc<Connection>,
    message: ChatMessageIn,
) -> Result<()> {
    let actor = connection.user_id;
    let timestamp = message.timestamp.unwrap_or_else(Utc::now);

    let (room_id, out) = {
        let conn = state.store.conn()?;
        let sender = UserRepo::get(&conn, actor)?;

        let room_id = match message.group_id {
            Some(group_id) => {
                if !GroupRepo::is_member(&conn, group_id, actor)? {
                    return Err(ServerError::NotAParticipant(message.room_id.to_string()));
                }
                let room_id = RoomRepo::get_or_create_group(&conn, group_id)?;
                let _ = MessageRepo::insert_group(
                    &conn,
                    &room_id,
                    group_id,
                    actor,
                    &message.content,
                    timestamp,
                )?;
                room_id
            }
            None => {
                let receiver = message
                    .receiver_user_id
                    .ok_or(ServerError::Invalid("a private message needs a receiver"))?;
                let room_id = RoomRepo::get_or_create_private(&conn, actor, receiver)?;
                let _ = MessageRepo::insert_private(
                    &conn,
                    &room_id,
                    actor,
                    receiver,
                    &message.content,
                    timestamp,
                )?;
                room_id
            }
        };

        let out = ServerMessage::ChatMessage(ChatMessageOut {
            sender_user_id: actor,
            sender_first_name: sender.first_name,
            sender_last_name: sender.last_name,
            content: message.content,
            room_id: room_id.clone(),
            timestamp,
            group_id: message.group_id,
        });
        (room_id, out)
    };

    let _ = state.hub.join_room(&room_id, Arc::clone(connection)).await;
    // Pull an online receiver into the room so the very first message
    // of a conversation reaches them.
    if message.group_id.is_none() {
        if let Some(receiver) = message.receiver_user_id {
            if let Some(peer) = state.hub.connection(receiver).await {
                let _ = state.hub.join_room(&room_id, peer).await;
            }
        }
    }

    state.hub.broadcast_to_room(&room_id, &out).await;
    debug!(user_id = actor, room_id = %room_id, "chat message delivered");
    Ok(())
}

/// Handle `joinGroupChat`: resolve the group's room and join it live.
pub async fn join_group_chat(
    state: &AppState,
    connection: &Arc<Connection>,
    message: JoinGroupChat,
) -> Result<()> {
    let actor = connection.user_id;
    let room_id = {
        let conn = state.store.conn()?;
        if !GroupRepo::is_member(&conn, message.group_id, actor)? {
            return Err(ServerError::NotAParticipant(format!(
                "group {}",
                message.group_id
            )));
        }
        RoomRepo::get_or_create_group(&conn, message.group_id)?
    };

    let _ = state.hub.join_room(&room_id, Arc::clone(connection)).await;
    reply(
        state,
        connection,
        &ServerMessage::JoinGroupChatResponse(JoinGroupChatResponse { room_id }),
    )
    .await;
    Ok(())
}

/// Handle `fetchMessages`: history plus read-marking, and a live join so
/// new messages in the opened conversation keep flowing.
pub async fn fetch_messages(
    state: &AppState,
    connection: &Arc<Connection>,
    message: FetchMessages,
) -> Result<()> {
    let actor = connection.user_id;
    let (room_id, messages) = {
        let conn = state.store.conn()?;
        let room = RoomRepo::resolve(&conn, &message.room_id)?;
        match room.kind {
            RoomKind::Private { user_lo, user_hi } => {
                if actor != user_lo && actor != user_hi {
                    return Err(ServerError::NotAParticipant(room.room_id.to_string()));
                }
                let messages = MessageRepo::private_history(&conn, &room.room_id)?;
                let _ = MessageRepo::mark_read(&conn, &room.room_id, actor)?;
                (room.room_id, messages)
            }
            RoomKind::Group(group_id) => {
                if !GroupRepo::is_member(&conn, group_id, actor)? {
                    return Err(ServerError::NotAParticipant(room.room_id.to_string()));
                }
                let messages = MessageRepo::group_history(&conn, &room.room_id)?;
                (room.room_id, messages)
            }
        }
    };

    let _ = state.hub.join_room(&room_id, Arc::clone(connection)).await;
    reply(
        state,
        connection,
        &ServerMessage::FetchMessagesResponse(MessageHistory { room_id, messages }),
    )
    .await;
    Ok(())
}
