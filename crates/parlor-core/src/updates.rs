//! Deltas pushed by the backend's update stream.

use parlor_shared::{ChannelId, ChatId, ParticipantStatus, RestrictedRights, UserId};

use crate::backend::{RemoteChat, RemoteSecretChat, RemoteUser};
use crate::records::{ChatParticipant, Photo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Users(Vec<RemoteUser>),
    Chats(Vec<RemoteChat>),

    UserName {
        user_id: UserId,
        first_name: String,
        last_name: String,
        username: String,
    },
    UserPhoto {
        user_id: UserId,
        photo: Option<Photo>,
    },
    UserStatus {
        user_id: UserId,
        was_online: i32,
    },
    UserIsContact {
        user_id: UserId,
        is_contact: bool,
        is_mutual_contact: bool,
    },

    ChatParticipantAdd {
        chat_id: ChatId,
        user_id: UserId,
        inviter_user_id: UserId,
        date: i32,
        version: i32,
    },
    ChatParticipantDelete {
        chat_id: ChatId,
        user_id: UserId,
        version: i32,
    },
    ChatParticipantAdmin {
        chat_id: ChatId,
        user_id: UserId,
        is_admin: bool,
        version: i32,
    },
    /// The complete member list.
    ChatParticipants {
        chat_id: ChatId,
        participants: Vec<ChatParticipant>,
        version: i32,
    },
    ChatDefaultPermissions {
        chat_id: ChatId,
        permissions: RestrictedRights,
        version: i32,
    },

    ChannelParticipant {
        channel_id: ChannelId,
        user_id: UserId,
        old_status: ParticipantStatus,
        new_status: ParticipantStatus,
        version: Option<i32>,
    },
    /// Something about the channel changed; refetch it.
    Channel(ChannelId),

    SecretChat(RemoteSecretChat),
}
