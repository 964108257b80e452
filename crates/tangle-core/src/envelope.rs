//! The `{kind, payload}` wire envelope.
//!
//! Every frame on the socket is one envelope. Inbound frames decode to
//! [`ClientMessage`], a closed tagged union — an unrecognized kind is a
//! decode error, not a silently dropped string tag — and outbound frames
//! are built from [`ServerMessage`]. Request kind `x` answers with kind
//! `xResponse` where a response is defined.
//!
//! Query responses always carry a collection; "no results" is an empty
//! collection, never a sentinel object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{GroupId, RoomId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// A frame sent by a client, dispatched by the message router.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Post a chat message into a room.
    ChatMessage(ChatMessageIn),
    /// Resolve (or create) the room for a group and join it.
    JoinGroupChat(JoinGroupChat),
    /// Fetch a room's message history; marks the caller's unread private
    /// messages in that room as read.
    FetchMessages(FetchMessages),
    /// Query unanswered event invitations.
    EventInvite(UserRef),
    /// Record a going/notGoing answer to an event invitation.
    #[serde(rename = "eInviteResponse")]
    EventInviteReply(EventInviteReply),
    /// Query pending group invitations.
    GroupInvite(UserRef),
    /// Accept or decline a group invitation.
    #[serde(rename = "gInviteResponse")]
    GroupInviteReply(GroupInviteReply),
    /// Send a follow request.
    FollowRequest(FollowRequestSend),
    /// Accept a pending follow request.
    AcceptFollowRequest(FollowRequestDecision),
    /// Decline a pending follow request.
    DeclineFollowRequest(FollowRequestDecision),
    /// Withdraw a follow request the caller sent earlier.
    CancelFollowRequest(FollowRequestSend),
    /// Query pending incoming follow requests.
    FollowRequestCheck(UserRef),
    /// Query pending join requests for groups the caller created.
    GroupJoinRequestCheck(UserRef),
    /// Accept a group join request (caller must be the group creator).
    AcceptGroupJoinRequest(RequestRef),
    /// Decline a group join request.
    DeclineGroupJoinRequest(RequestRef),
}

impl ClientMessage {
    /// The wire kind string for this message, as it appears in the envelope.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatMessage(_) => "chatMessage",
            Self::JoinGroupChat(_) => "joinGroupChat",
            Self::FetchMessages(_) => "fetchMessages",
            Self::EventInvite(_) => "eventInvite",
            Self::EventInviteReply(_) => "eInviteResponse",
            Self::GroupInvite(_) => "groupInvite",
            Self::GroupInviteReply(_) => "gInviteResponse",
            Self::FollowRequest(_) => "followRequest",
            Self::AcceptFollowRequest(_) => "acceptFollowRequest",
            Self::DeclineFollowRequest(_) => "declineFollowRequest",
            Self::CancelFollowRequest(_) => "cancelFollowRequest",
            Self::FollowRequestCheck(_) => "followRequestCheck",
            Self::GroupJoinRequestCheck(_) => "groupJoinRequestCheck",
            Self::AcceptGroupJoinRequest(_) => "acceptGroupJoinRequest",
            Self::DeclineGroupJoinRequest(_) => "declineGroupJoinRequest",
        }
    }
}

/// Payload of an inbound `chatMessage`.
///
/// `group_id` is the group/private discriminant: `Some` targets a group
/// room, `None` a private conversation. A group id of `0` is a legitimate
/// group, not a sentinel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageIn {
    /// Author of the message.
    pub sender_user_id: UserId,
    /// Counterparty for private messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_user_id: Option<UserId>,
    /// Durable room identity to broadcast into.
    pub room_id: RoomId,
    /// Message body.
    pub content: String,
    /// Client-supplied send time; the server stamps its own if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Group discriminant (see type docs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

/// Payload of `joinGroupChat`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupChat {
    /// Group whose room to resolve and join.
    pub group_id: GroupId,
}

/// Payload of `fetchMessages`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchMessages {
    /// Room whose history to fetch.
    pub room_id: RoomId,
    /// `Some` to read group history, `None` for private history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

/// A payload carrying only the acting user's id (the query kinds).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    /// The user the query is about.
    pub user_id: UserId,
}

/// A payload carrying only a request row id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRef {
    /// The join-request row being accepted or declined.
    pub request_id: i64,
}

/// Answer to an event invitation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInviteReply {
    /// The invitation row being answered.
    pub response_id: i64,
    /// The invited user.
    pub user_id: UserId,
    /// Going or not going.
    pub response: EventRsvp,
}

/// The two possible answers to an event invitation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventRsvp {
    /// Attending.
    Going,
    /// Not attending.
    NotGoing,
}

impl EventRsvp {
    /// Stable string stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Going => "going",
            Self::NotGoing => "notGoing",
        }
    }
}

/// Answer to a group invitation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInviteReply {
    /// The group that invited the user.
    pub group_id: GroupId,
    /// The invited user.
    pub user_id: UserId,
    /// Accept (join the group) or decline.
    pub accept: bool,
}

/// A follow request or its cancellation: requester → target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequestSend {
    /// The user being followed.
    pub target_user_id: UserId,
    /// The user who wants to follow.
    pub requester_user_id: UserId,
}

/// Accept/decline of a pending follow request by its recipient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequestDecision {
    /// The recipient deciding (the one being followed).
    pub user_id: UserId,
    /// The requester whose follow is accepted or declined.
    pub follower_user_id: UserId,
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// A frame sent by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum ServerMessage {
    /// First frame after upgrade: the client's full relationship state.
    Snapshot(Snapshot),
    /// A chat message broadcast into a room the client belongs to.
    ChatMessage(ChatMessageOut),
    /// Result of `joinGroupChat`.
    JoinGroupChatResponse(JoinGroupChatResponse),
    /// Result of `fetchMessages`.
    FetchMessagesResponse(MessageHistory),
    /// Result of `eventInvite`.
    EventInviteResponse(Vec<EventInviteNotice>),
    /// Result of `groupInvite`.
    GroupInviteResponse(Vec<GroupInviteNotice>),
    /// Result of `followRequestCheck`.
    FollowRequestResponse(Vec<FollowRequestNotice>),
    /// Result of `groupJoinRequestCheck`.
    GroupJoinRequestResponse(Vec<GroupJoinRequestNotice>),
}

impl ServerMessage {
    /// The wire kind string for this message.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Snapshot(_) => "snapshot",
            Self::ChatMessage(_) => "chatMessage",
            Self::JoinGroupChatResponse(_) => "joinGroupChatResponse",
            Self::FetchMessagesResponse(_) => "fetchMessagesResponse",
            Self::EventInviteResponse(_) => "eventInviteResponse",
            Self::GroupInviteResponse(_) => "groupInviteResponse",
            Self::FollowRequestResponse(_) => "followRequestResponse",
            Self::GroupJoinRequestResponse(_) => "groupJoinRequestResponse",
        }
    }
}

/// A chat message as delivered to room members.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageOut {
    /// Author of the message.
    pub sender_user_id: UserId,
    /// Author's first name, resolved server-side.
    pub sender_first_name: String,
    /// Author's last name, resolved server-side.
    pub sender_last_name: String,
    /// Message body.
    pub content: String,
    /// Room the message was posted into.
    pub room_id: RoomId,
    /// Server-side send time.
    pub timestamp: DateTime<Utc>,
    /// `Some` for group rooms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
}

/// Room id returned by `joinGroupChat`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupChatResponse {
    /// Durable identity of the group's room.
    pub room_id: RoomId,
}

/// A room's message history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHistory {
    /// Room the history belongs to.
    pub room_id: RoomId,
    /// Messages, most recent first.
    pub messages: Vec<StoredMessage>,
}

/// One persisted message with sender (and, for private rooms, receiver)
/// display details joined in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Server-assigned message id.
    pub message_id: String,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Message body.
    pub content: String,
    /// When the message was persisted.
    pub timestamp: DateTime<Utc>,
    /// Author.
    pub sender_user_id: UserId,
    /// Author's first name.
    pub sender_first_name: String,
    /// Author's last name.
    pub sender_last_name: String,
    /// Author's nickname.
    pub sender_nickname: String,
    /// Receiver of a private message; absent for group messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_user_id: Option<UserId>,
    /// Read flag of a private message; absent for group messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
}

/// An unanswered event invitation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInviteNotice {
    /// The event.
    pub event_id: i64,
    /// Owning group.
    pub group_id: GroupId,
    /// Owning group's display name.
    pub group_name: String,
    /// Event title.
    pub title: String,
    /// Event description.
    pub description: String,
    /// When the event takes place.
    pub event_date_time: DateTime<Utc>,
    /// Event creator.
    pub creator_id: UserId,
    /// Creator's first name.
    pub creator_first_name: String,
    /// Creator's last name.
    pub creator_last_name: String,
    /// When the event was created.
    pub created_at: DateTime<Utc>,
    /// The invitation row awaiting an answer.
    pub response_id: i64,
    /// The invited user.
    pub user_id: UserId,
    /// Recorded answer, if any (always absent for pending invites).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

/// A pending group invitation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInviteNotice {
    /// The inviting group.
    pub group_id: GroupId,
    /// Group display name.
    pub name: String,
    /// Group description.
    pub description: String,
    /// Group creator's user id.
    pub creator_user_id: UserId,
    /// Group creator's full display name.
    pub creator_name: String,
}

/// A pending incoming follow request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRequestNotice {
    /// Who wants to follow.
    pub follower_user_id: UserId,
    /// Requester's first name.
    pub first_name: String,
    /// Requester's last name.
    pub last_name: String,
}

/// A pending join request for a group the recipient created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupJoinRequestNotice {
    /// The join-request row id.
    pub request_id: i64,
    /// The user asking to join.
    pub user_id: UserId,
    /// Requester's first name.
    pub first_name: String,
    /// Requester's last name.
    pub last_name: String,
    /// The group being joined.
    pub group_id: GroupId,
    /// Group display name.
    pub group_name: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// The initial state bundle sent as the first frame after upgrade.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Counterparty user id → display details, room id, unread count.
    pub user_relations: BTreeMap<UserId, Relation>,
    /// User id → the users they follow.
    pub following_map: BTreeMap<UserId, Vec<UserId>>,
    /// User id → the users following them.
    pub followers_map: BTreeMap<UserId, Vec<UserId>>,
    /// Targets of the client's still-pending outgoing follow requests.
    pub pending_requests: Vec<UserId>,
    /// Groups the client is an accepted member of.
    pub user_groups: Vec<GroupId>,
    /// Groups the client has asked to join and is awaiting an answer from.
    pub group_join_requests: Vec<GroupId>,
}

/// One contact in the snapshot's relation map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Counterparty user id.
    pub user_id: UserId,
    /// Counterparty's first name.
    pub first_name: String,
    /// Counterparty's last name.
    pub last_name: String,
    /// Counterparty's nickname.
    pub nickname: String,
    /// Avatar reference (path or URL), if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    /// Durable identity of the shared private room.
    pub room_id: RoomId,
    /// Messages from this counterparty the client has not read yet.
    pub unread_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn chat_message_decodes_from_wire_shape() {
        let json = r#"{"kind":"chatMessage","payload":{"senderUserId":1,"roomId":"r1","content":"hi","receiverUserId":2}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        let ClientMessage::ChatMessage(chat) = msg else {
            panic!("expected chatMessage, got {msg:?}");
        };
        assert_eq!(chat.sender_user_id, 1);
        assert_eq!(chat.receiver_user_id, Some(2));
        assert_eq!(chat.room_id.as_str(), "r1");
        assert_eq!(chat.content, "hi");
        assert!(chat.group_id.is_none());
    }

    #[test]
    fn group_chat_message_keeps_group_id_zero_distinct_from_absent() {
        let json = r#"{"kind":"chatMessage","payload":{"senderUserId":1,"roomId":"r1","content":"hi","groupId":0}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        let ClientMessage::ChatMessage(chat) = msg else {
            panic!("wrong variant");
        };
        assert_eq!(chat.group_id, Some(0));
    }

    #[test]
    fn unknown_kind_is_a_decode_error() {
        let json = r#"{"kind":"noSuchThing","payload":{}}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn every_kind_round_trips() {
        let messages = vec![
            ClientMessage::ChatMessage(ChatMessageIn {
                sender_user_id: 1,
                receiver_user_id: Some(2),
                room_id: "r1".into(),
                content: "hello".into(),
                timestamp: None,
                group_id: None,
            }),
            ClientMessage::JoinGroupChat(JoinGroupChat { group_id: 5 }),
            ClientMessage::FetchMessages(FetchMessages {
                room_id: "r1".into(),
                group_id: Some(5),
            }),
            ClientMessage::EventInvite(UserRef { user_id: 3 }),
            ClientMessage::EventInviteReply(EventInviteReply {
                response_id: 9,
                user_id: 3,
                response: EventRsvp::Going,
            }),
            ClientMessage::GroupInvite(UserRef { user_id: 3 }),
            ClientMessage::GroupInviteReply(GroupInviteReply {
                group_id: 5,
                user_id: 3,
                accept: true,
            }),
            ClientMessage::FollowRequest(FollowRequestSend {
                target_user_id: 2,
                requester_user_id: 1,
            }),
            ClientMessage::AcceptFollowRequest(FollowRequestDecision {
                user_id: 2,
                follower_user_id: 1,
            }),
            ClientMessage::DeclineFollowRequest(FollowRequestDecision {
                user_id: 2,
                follower_user_id: 1,
            }),
            ClientMessage::CancelFollowRequest(FollowRequestSend {
                target_user_id: 2,
                requester_user_id: 1,
            }),
            ClientMessage::FollowRequestCheck(UserRef { user_id: 2 }),
            ClientMessage::GroupJoinRequestCheck(UserRef { user_id: 2 }),
            ClientMessage::AcceptGroupJoinRequest(RequestRef { request_id: 7 }),
            ClientMessage::DeclineGroupJoinRequest(RequestRef { request_id: 7 }),
        ];
        for msg in messages {
            let json = serde_json::to_string(&msg).unwrap();
            let back: ClientMessage = serde_json::from_str(&json).unwrap();
            assert_eq!(back, msg);
            let value: serde_json::Value = serde_json::from_str(&json).unwrap();
            assert_eq!(value["kind"], msg.kind());
        }
    }

    #[test]
    fn event_reply_kind_matches_legacy_tag() {
        let msg = ClientMessage::EventInviteReply(EventInviteReply {
            response_id: 1,
            user_id: 1,
            response: EventRsvp::NotGoing,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"], "eInviteResponse");
        assert_eq!(value["payload"]["response"], "notGoing");
    }

    #[test]
    fn group_reply_kind_matches_legacy_tag() {
        let msg = ClientMessage::GroupInviteReply(GroupInviteReply {
            group_id: 4,
            user_id: 2,
            accept: false,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"], "gInviteResponse");
    }

    #[test]
    fn follow_response_with_no_results_is_empty_array() {
        let msg = ServerMessage::FollowRequestResponse(Vec::new());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"], "followRequestResponse");
        assert_eq!(value["payload"], serde_json::json!([]));
    }

    #[test]
    fn outbound_chat_message_wire_shape() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let msg = ServerMessage::ChatMessage(ChatMessageOut {
            sender_user_id: 1,
            sender_first_name: "Ada".into(),
            sender_last_name: "Lovelace".into(),
            content: "hi".into(),
            room_id: "r1".into(),
            timestamp: ts,
            group_id: None,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"], "chatMessage");
        assert_eq!(value["payload"]["senderFirstName"], "Ada");
        assert_eq!(value["payload"]["roomId"], "r1");
        assert!(value["payload"].get("groupId").is_none());
    }

    #[test]
    fn snapshot_serializes_user_map_keyed_by_id() {
        let mut snapshot = Snapshot::default();
        let _ = snapshot.user_relations.insert(
            7,
            Relation {
                user_id: 7,
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                nickname: "ada".into(),
                profile_picture: None,
                room_id: "r7".into(),
                unread_count: 2,
            },
        );
        snapshot.pending_requests.push(9);
        let value = serde_json::to_value(ServerMessage::Snapshot(snapshot)).unwrap();
        assert_eq!(value["kind"], "snapshot");
        assert_eq!(value["payload"]["userRelations"]["7"]["roomId"], "r7");
        assert_eq!(value["payload"]["userRelations"]["7"]["unreadCount"], 2);
        assert_eq!(value["payload"]["pendingRequests"][0], 9);
    }

    #[test]
    fn snapshot_serialization_is_deterministic() {
        let mut a = Snapshot::default();
        let mut b = Snapshot::default();
        for id in [3, 1, 2] {
            let relation = Relation {
                user_id: id,
                first_name: "x".into(),
                last_name: "y".into(),
                nickname: "z".into(),
                profile_picture: None,
                room_id: RoomId::from(format!("r{id}")),
                unread_count: 0,
            };
            let _ = a.user_relations.insert(id, relation.clone());
            let _ = b.user_relations.insert(id, relation);
        }
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn stored_message_omits_private_fields_for_group_history() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let msg = StoredMessage {
            message_id: "msg_1".into(),
            room_id: "r1".into(),
            content: "hi".into(),
            timestamp: ts,
            sender_user_id: 1,
            sender_first_name: "Ada".into(),
            sender_last_name: "Lovelace".into(),
            sender_nickname: "ada".into(),
            receiver_user_id: None,
            read: None,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value.get("receiverUserId").is_none());
        assert!(value.get("read").is_none());
    }
}
