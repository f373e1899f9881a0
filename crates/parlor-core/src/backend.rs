//! Network boundary.
//!
//! A [`Backend`] sends one typed request and returns the decoded response.
//! Response handlers in the engine translate these remote shapes into
//! records; the wire encoding is not our concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use parlor_shared::{
    ChannelId, ChatId, ParticipantStatus, RestrictedRights, SecretChatId, UserId,
};

use crate::error::NetworkError;
use crate::records::{ChatParticipant, Photo, SecretChatState};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserData {
    pub id: UserId,
    pub access_hash: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub phone_number: String,
    pub photo: Option<Photo>,
    pub was_online: i32,
    pub is_contact: bool,
    pub is_mutual_contact: bool,
    pub is_deleted: bool,
    pub is_bot: bool,
    pub is_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteUser {
    /// Placeholder sent for ids the server has nothing to say about.
    Empty(UserId),
    User(UserData),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatData {
    pub id: ChatId,
    pub title: String,
    pub photo: Option<Photo>,
    pub participant_count: i32,
    pub date: i32,
    pub version: i32,
    pub status: ParticipantStatus,
    pub is_active: bool,
    pub migrated_to: Option<ChannelId>,
    pub default_permissions: Option<RestrictedRights>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelData {
    pub id: ChannelId,
    pub access_hash: i64,
    pub title: String,
    pub username: String,
    pub photo: Option<Photo>,
    pub status: ParticipantStatus,
    pub date: i32,
    /// 0 when the server omitted it.
    pub participant_count: i32,
    pub version: i32,
    pub is_megagroup: bool,
    pub is_verified: bool,
    pub sign_messages: bool,
    pub has_linked_channel: bool,
    pub default_permissions: Option<RestrictedRights>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChat {
    Empty(ChatId),
    Chat(ChatData),
    /// We were removed from the basic group.
    ChatForbidden { id: ChatId, title: String },
    Channel(ChannelData),
    /// We are banned from the channel.
    ChannelForbidden {
        id: ChannelId,
        access_hash: i64,
        title: String,
        until_date: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUserFull {
    pub user: RemoteUser,
    pub about: String,
    pub is_blocked: bool,
    pub can_be_called: bool,
    pub common_chat_count: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteChatFull {
    pub chat_id: ChatId,
    pub participants: Vec<ChatParticipant>,
    pub version: i32,
    pub creator_user_id: UserId,
    pub description: String,
    pub invite_link: String,
    pub chats: Vec<RemoteChat>,
    pub users: Vec<RemoteUser>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteChannelFull {
    pub channel_id: ChannelId,
    pub description: String,
    pub participant_count: i32,
    pub administrator_count: i32,
    pub restricted_count: i32,
    pub banned_count: i32,
    pub invite_link: String,
    pub slow_mode_delay: i32,
    pub slow_mode_next_send_date: i32,
    pub linked_channel_id: Option<ChannelId>,
    pub can_get_participants: bool,
    pub is_all_history_available: bool,
    pub chats: Vec<RemoteChat>,
    pub users: Vec<RemoteUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Administrator {
    pub user_id: UserId,
    pub rank: String,
    pub is_creator: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSecretChat {
    pub id: SecretChatId,
    pub access_hash: i64,
    pub user_id: UserId,
    pub state: SecretChatState,
    pub is_outbound: bool,
    pub ttl: i32,
    pub date: i32,
    pub layer: i32,
}

/// Requests the engine sends to the messaging backend.
///
/// Mutating calls only acknowledge; their authoritative effect arrives
/// later through the update stream.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get_users(&self, user_ids: Vec<UserId>) -> Result<Vec<RemoteUser>, NetworkError>;

    async fn get_full_user(&self, user_id: UserId) -> Result<RemoteUserFull, NetworkError>;

    async fn get_chats(&self, chat_ids: Vec<ChatId>) -> Result<Vec<RemoteChat>, NetworkError>;

    async fn get_full_chat(&self, chat_id: ChatId) -> Result<RemoteChatFull, NetworkError>;

    async fn get_channels(
        &self,
        channel_ids: Vec<ChannelId>,
    ) -> Result<Vec<RemoteChat>, NetworkError>;

    async fn get_full_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<RemoteChannelFull, NetworkError>;

    async fn get_channel_administrators(
        &self,
        channel_id: ChannelId,
    ) -> Result<Vec<Administrator>, NetworkError>;

    async fn get_channel_participant(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> Result<ParticipantStatus, NetworkError>;

    /// Public channels created by the current user.
    async fn get_administered_public_channels(&self) -> Result<Vec<RemoteChat>, NetworkError>;

    async fn add_chat_user(&self, chat_id: ChatId, user_id: UserId) -> Result<(), NetworkError>;

    async fn edit_chat_admin(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        is_admin: bool,
    ) -> Result<(), NetworkError>;

    async fn delete_chat_user(&self, chat_id: ChatId, user_id: UserId)
        -> Result<(), NetworkError>;

    async fn invite_to_channel(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> Result<(), NetworkError>;

    async fn edit_channel_admin(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
        status: ParticipantStatus,
    ) -> Result<(), NetworkError>;

    async fn edit_channel_banned(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
        status: ParticipantStatus,
    ) -> Result<(), NetworkError>;
}

/// Backend for sessions without a network connection. Every call fails
/// with a transient error, so the engine serves only what it has cached.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBackend;

fn offline<T>() -> Result<T, NetworkError> {
    Err(NetworkError::Transient("offline".into()))
}

#[async_trait]
impl Backend for OfflineBackend {
    async fn get_users(&self, _: Vec<UserId>) -> Result<Vec<RemoteUser>, NetworkError> {
        offline()
    }

    async fn get_full_user(&self, _: UserId) -> Result<RemoteUserFull, NetworkError> {
        offline()
    }

    async fn get_chats(&self, _: Vec<ChatId>) -> Result<Vec<RemoteChat>, NetworkError> {
        offline()
    }

    async fn get_full_chat(&self, _: ChatId) -> Result<RemoteChatFull, NetworkError> {
        offline()
    }

    async fn get_channels(&self, _: Vec<ChannelId>) -> Result<Vec<RemoteChat>, NetworkError> {
        offline()
    }

    async fn get_full_channel(&self, _: ChannelId) -> Result<RemoteChannelFull, NetworkError> {
        offline()
    }

    async fn get_channel_administrators(
        &self,
        _: ChannelId,
    ) -> Result<Vec<Administrator>, NetworkError> {
        offline()
    }

    async fn get_channel_participant(
        &self,
        _: ChannelId,
        _: UserId,
    ) -> Result<ParticipantStatus, NetworkError> {
        offline()
    }

    async fn get_administered_public_channels(&self) -> Result<Vec<RemoteChat>, NetworkError> {
        offline()
    }

    async fn add_chat_user(&self, _: ChatId, _: UserId) -> Result<(), NetworkError> {
        offline()
    }

    async fn edit_chat_admin(&self, _: ChatId, _: UserId, _: bool) -> Result<(), NetworkError> {
        offline()
    }

    async fn delete_chat_user(&self, _: ChatId, _: UserId) -> Result<(), NetworkError> {
        offline()
    }

    async fn invite_to_channel(&self, _: ChannelId, _: UserId) -> Result<(), NetworkError> {
        offline()
    }

    async fn edit_channel_admin(
        &self,
        _: ChannelId,
        _: UserId,
        _: ParticipantStatus,
    ) -> Result<(), NetworkError> {
        offline()
    }

    async fn edit_channel_banned(
        &self,
        _: ChannelId,
        _: UserId,
        _: ParticipantStatus,
    ) -> Result<(), NetworkError> {
        offline()
    }
}
