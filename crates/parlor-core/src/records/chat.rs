use serde::{Deserialize, Serialize};

use parlor_shared::constants::CHAT_CACHE_VERSION;
use parlor_shared::{ChannelId, ParticipantStatus, RestrictedRights, UserId};

use super::{Photo, RecordMeta};

/// A basic group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub title: String,
    pub photo: Option<Photo>,
    pub participant_count: i32,
    pub date: i32,
    /// Membership version. Deltas are applied only on `version + 1`.
    pub version: i32,
    pub default_permissions: RestrictedRights,
    pub default_permissions_version: i32,
    /// Our own status in the group.
    pub status: ParticipantStatus,
    pub is_active: bool,
    pub migrated_to: Option<ChannelId>,
    pub cache_version: u32,

    #[serde(skip)]
    pub changes: ChatChanges,
    #[serde(skip)]
    pub meta: RecordMeta,
}

impl Default for Chat {
    fn default() -> Self {
        Self {
            title: String::new(),
            photo: None,
            participant_count: 0,
            date: 0,
            version: -1,
            default_permissions: RestrictedRights::default(),
            default_permissions_version: -1,
            status: ParticipantStatus::Left,
            is_active: true,
            migrated_to: None,
            cache_version: CHAT_CACHE_VERSION,
            changes: ChatChanges::default(),
            meta: RecordMeta::default(),
        }
    }
}

impl Chat {
    pub fn photo_id(&self) -> Option<i64> {
        self.photo.as_ref().map(|photo| photo.id)
    }

    /// Whether the group can still be read from this account.
    pub fn is_accessible(&self) -> bool {
        self.status.is_member() && self.is_active
    }

    pub fn set_title(&mut self, title: &str) {
        if self.title != title {
            self.title = title.to_string();
            self.changes.title = true;
            self.meta.is_changed = true;
        }
    }

    pub fn set_photo(&mut self, photo: Option<Photo>) {
        if self.photo != photo {
            if !self.changes.photo {
                self.changes.old_photo_id = self.photo_id();
            }
            self.photo = photo;
            self.changes.photo = true;
            self.meta.is_changed = true;
        }
    }

    pub fn set_default_permissions(&mut self, permissions: RestrictedRights) {
        if self.default_permissions != permissions {
            self.default_permissions = permissions;
            self.changes.permissions = true;
            self.meta.is_changed = true;
        }
    }

    pub fn set_status(&mut self, status: ParticipantStatus) {
        if self.status != status {
            if !self.changes.access {
                self.changes.was_accessible = self.is_accessible();
            }
            self.status = status;
            self.changes.access = true;
            self.meta.is_changed = true;
        }
    }

    pub fn set_active(&mut self, is_active: bool) {
        if self.is_active != is_active {
            if !self.changes.access {
                self.changes.was_accessible = self.is_accessible();
            }
            self.is_active = is_active;
            self.changes.access = true;
            self.meta.is_changed = true;
        }
    }

    pub fn set_migrated_to(&mut self, channel_id: Option<ChannelId>) {
        if self.migrated_to != channel_id {
            self.migrated_to = channel_id;
            self.meta.is_changed = true;
        }
        if channel_id.is_some() {
            self.set_active(false);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatChanges {
    pub title: bool,
    pub photo: bool,
    pub old_photo_id: Option<i64>,
    pub permissions: bool,
    /// Membership or activity changed; `was_accessible` is the state before
    /// the first such change.
    pub access: bool,
    pub was_accessible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatParticipant {
    pub user_id: UserId,
    pub inviter_user_id: UserId,
    pub joined_date: i32,
    pub status: ParticipantStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFull {
    pub participants: Vec<ChatParticipant>,
    /// Version the participant list is valid for.
    pub version: i32,
    pub creator_user_id: UserId,
    pub description: String,
    pub invite_link: String,

    /// Cleared for records read from disk and after a consistency check
    /// failed; such records are refetched on the next request.
    #[serde(skip)]
    pub is_up_to_date: bool,
    #[serde(skip)]
    pub meta: RecordMeta,
}

impl Default for ChatFull {
    fn default() -> Self {
        Self {
            participants: Vec::new(),
            version: -1,
            creator_user_id: UserId::default(),
            description: String::new(),
            invite_link: String::new(),
            is_up_to_date: false,
            meta: RecordMeta::default(),
        }
    }
}

impl ChatFull {
    pub fn participant(&self, user_id: UserId) -> Option<&ChatParticipant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: UserId) -> Option<&mut ChatParticipant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    /// Returns `true` if a participant was removed.
    pub fn remove_participant(&mut self, user_id: UserId) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.user_id != user_id);
        before != self.participants.len()
    }
}
