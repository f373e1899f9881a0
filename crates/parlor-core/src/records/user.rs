use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parlor_shared::constants::USER_CACHE_VERSION;

use super::{Photo, RecordMeta};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub phone_number: String,
    pub access_hash: Option<i64>,
    pub photo: Option<Photo>,
    /// Unix time of the last known online status, 0 if hidden.
    pub was_online: i32,
    pub is_contact: bool,
    pub is_mutual_contact: bool,
    pub is_deleted: bool,
    pub is_bot: bool,
    pub is_verified: bool,
    pub cache_version: u32,

    #[serde(skip)]
    pub changes: UserChanges,
    #[serde(skip)]
    pub meta: RecordMeta,
}

impl Default for User {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            username: String::new(),
            phone_number: String::new(),
            access_hash: None,
            photo: None,
            was_online: 0,
            is_contact: false,
            is_mutual_contact: false,
            is_deleted: false,
            is_bot: false,
            is_verified: false,
            cache_version: USER_CACHE_VERSION,
            changes: UserChanges::default(),
            meta: RecordMeta::default(),
        }
    }
}

impl User {
    pub fn full_name(&self) -> String {
        if self.last_name.is_empty() {
            return self.first_name.clone();
        }
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn photo_id(&self) -> Option<i64> {
        self.photo.as_ref().map(|photo| photo.id)
    }

    pub fn set_name(&mut self, first_name: &str, last_name: &str) {
        if self.first_name != first_name || self.last_name != last_name {
            self.first_name = first_name.to_string();
            self.last_name = last_name.to_string();
            self.changes.name = true;
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

    pub fn set_contact(&mut self, is_contact: bool, is_mutual_contact: bool) {
        let is_mutual_contact = is_contact && is_mutual_contact;
        if self.is_contact != is_contact || self.is_mutual_contact != is_mutual_contact {
            self.is_contact = is_contact;
            self.is_mutual_contact = is_mutual_contact;
            self.changes.is_contact = true;
            self.meta.is_changed = true;
        }
    }

    /// Online status is not persisted, so this only raises the status flag.
    pub fn set_was_online(&mut self, was_online: i32) {
        if self.was_online != was_online {
            self.was_online = was_online;
            self.changes.status = true;
        }
    }

    pub fn set_deleted(&mut self, is_deleted: bool) {
        if self.is_deleted != is_deleted {
            self.is_deleted = is_deleted;
            self.changes.deleted = true;
            self.meta.is_changed = true;
        }
    }
}

/// Field-level changes since the last commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub name: bool,
    pub username: bool,
    pub photo: bool,
    pub old_photo_id: Option<i64>,
    pub is_contact: bool,
    pub status: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserFull {
    pub about: String,
    pub is_blocked: bool,
    pub can_be_called: bool,
    pub common_chat_count: i32,

    /// Not persisted: a full record read back from disk is always expired.
    #[serde(skip)]
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub meta: RecordMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_only_flag_real_changes() {
        let mut user = User::default();
        user.set_name("Ada", "");
        assert!(user.changes.name);
        assert!(user.meta.is_changed);

        user.changes = UserChanges::default();
        user.meta.is_changed = false;
        user.set_name("Ada", "");
        assert!(!user.changes.name);
        assert!(!user.meta.is_changed);
    }

    #[test]
    fn test_photo_change_keeps_first_old_id() {
        let mut user = User {
            photo: Some(Photo {
                id: 1,
                ..Photo::default()
            }),
            ..User::default()
        };
        user.set_photo(Some(Photo {
            id: 2,
            ..Photo::default()
        }));
        user.set_photo(None);
        assert_eq!(user.changes.old_photo_id, Some(1));
        assert_eq!(user.photo_id(), None);
    }

    #[test]
    fn test_status_is_not_a_persisted_change() {
        let mut user = User::default();
        user.set_was_online(100);
        assert!(user.changes.status);
        assert!(!user.meta.is_changed);
    }

    #[test]
    fn test_mutual_requires_contact() {
        let mut user = User::default();
        user.set_contact(false, true);
        assert!(!user.is_mutual_contact);
        assert!(!user.changes.is_contact);
    }
}
