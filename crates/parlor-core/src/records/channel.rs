use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parlor_shared::constants::CHANNEL_CACHE_VERSION;
use parlor_shared::{ChannelId, ParticipantStatus, RestrictedRights};

use super::{Photo, RecordMeta};

/// A supergroup or broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub title: String,
    pub username: String,
    pub photo: Option<Photo>,
    /// Our own status in the channel.
    pub status: ParticipantStatus,
    pub access_hash: i64,
    pub date: i32,
    /// 0 when unknown.
    pub participant_count: i32,
    pub is_megagroup: bool,
    pub is_verified: bool,
    pub sign_messages: bool,
    pub has_linked_channel: bool,
    pub default_permissions: RestrictedRights,
    pub version: i32,
    pub cache_version: u32,

    #[serde(skip)]
    pub changes: ChannelChanges,
    #[serde(skip)]
    pub meta: RecordMeta,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            title: String::new(),
            username: String::new(),
            photo: None,
            status: ParticipantStatus::Left,
            access_hash: 0,
            date: 0,
            participant_count: 0,
            is_megagroup: false,
            is_verified: false,
            sign_messages: false,
            has_linked_channel: false,
            default_permissions: RestrictedRights::default(),
            version: -1,
            cache_version: CHANNEL_CACHE_VERSION,
            changes: ChannelChanges::default(),
            meta: RecordMeta::default(),
        }
    }
}

impl Channel {
    pub fn photo_id(&self) -> Option<i64> {
        self.photo.as_ref().map(|photo| photo.id)
    }

    /// Public channels stay readable without membership.
    pub fn is_accessible(&self) -> bool {
        (self.status.is_member() || !self.username.is_empty()) && !self.status.is_banned()
    }

    pub fn set_title(&mut self, title: &str) {
        if self.title != title {
            self.title = title.to_string();
            self.changes.title = true;
            self.meta.is_changed = true;
        }
    }

    pub fn set_username(&mut self, username: &str) {
        if self.username != username {
            self.username = username.to_string();
            self.changes.username = true;
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
            if self.changes.old_status.is_none() {
                self.changes.old_status = Some(self.status.clone());
            }
            self.status = status;
            self.meta.is_changed = true;
        }
    }

    pub fn set_participant_count(&mut self, participant_count: i32) {
        if self.participant_count != participant_count {
            self.participant_count = participant_count;
            self.meta.is_changed = true;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelChanges {
    pub title: bool,
    pub username: bool,
    pub photo: bool,
    pub old_photo_id: Option<i64>,
    pub permissions: bool,
    /// Status before the first status change since the last commit.
    pub old_status: Option<ParticipantStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelFull {
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

    #[serde(skip)]
    pub expires_at: DateTime<Utc>,
    /// Bumped on every local speculative change to the counters.
    #[serde(skip)]
    pub speculative_version: u32,
    /// `speculative_version` at the time the last refresh was requested.
    #[serde(skip)]
    pub repair_request_version: u32,
    #[serde(skip)]
    pub meta: RecordMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_channel_is_accessible_without_membership() {
        let mut channel = Channel {
            username: "news".into(),
            ..Channel::default()
        };
        assert!(channel.is_accessible());
        channel.set_status(ParticipantStatus::Banned { until_date: 0 });
        assert!(!channel.is_accessible());
        assert_eq!(channel.changes.old_status, Some(ParticipantStatus::Left));
    }

    #[test]
    fn test_full_record_from_disk_is_expired() {
        let full = ChannelFull::default();
        assert!(full.expires_at <= Utc::now());
    }
}
