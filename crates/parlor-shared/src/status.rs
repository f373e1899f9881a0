//! Participant status of a user inside a basic group or channel.

use serde::{Deserialize, Serialize};

/// Rights granted to an administrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRights {
    pub can_change_info: bool,
    pub can_post_messages: bool,
    pub can_edit_messages: bool,
    pub can_delete_messages: bool,
    pub can_invite_users: bool,
    pub can_restrict_members: bool,
    pub can_pin_messages: bool,
    pub can_promote_members: bool,
    pub can_manage_calls: bool,
    pub is_anonymous: bool,
}

impl AdminRights {
    pub fn all() -> Self {
        Self {
            can_change_info: true,
            can_post_messages: true,
            can_edit_messages: true,
            can_delete_messages: true,
            can_invite_users: true,
            can_restrict_members: true,
            can_pin_messages: true,
            can_promote_members: true,
            can_manage_calls: true,
            is_anonymous: false,
        }
    }
}

/// What a restricted member (or every member, for default permissions) may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedRights {
    pub can_send_messages: bool,
    pub can_send_media: bool,
    pub can_send_polls: bool,
    pub can_add_web_page_previews: bool,
    pub can_change_info: bool,
    pub can_invite_users: bool,
    pub can_pin_messages: bool,
}

impl RestrictedRights {
    pub fn full() -> Self {
        Self {
            can_send_messages: true,
            can_send_media: true,
            can_send_polls: true,
            can_add_web_page_previews: true,
            can_change_info: true,
            can_invite_users: true,
            can_pin_messages: true,
        }
    }

    pub fn none() -> Self {
        Self {
            can_send_messages: false,
            can_send_media: false,
            can_send_polls: false,
            can_add_web_page_previews: false,
            can_change_info: false,
            can_invite_users: false,
            can_pin_messages: false,
        }
    }
}

impl Default for RestrictedRights {
    fn default() -> Self {
        Self::full()
    }
}

/// Status of a participant. `until_date` is a unix timestamp, 0 means forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantStatus {
    Creator {
        is_member: bool,
        rank: String,
        is_anonymous: bool,
    },
    Administrator {
        rights: AdminRights,
        rank: String,
        can_be_edited: bool,
    },
    Member,
    Restricted {
        is_member: bool,
        until_date: i64,
        rights: RestrictedRights,
    },
    Left,
    Banned {
        until_date: i64,
    },
}

impl Default for ParticipantStatus {
    fn default() -> Self {
        ParticipantStatus::Left
    }
}

impl ParticipantStatus {
    pub fn creator() -> Self {
        ParticipantStatus::Creator {
            is_member: true,
            rank: String::new(),
            is_anonymous: false,
        }
    }

    pub fn administrator(rights: AdminRights) -> Self {
        ParticipantStatus::Administrator {
            rights,
            rank: String::new(),
            can_be_edited: true,
        }
    }

    pub fn restricted(is_member: bool, until_date: i64, rights: RestrictedRights) -> Self {
        ParticipantStatus::Restricted {
            is_member,
            until_date,
            rights,
        }
    }

    pub fn is_creator(&self) -> bool {
        matches!(self, ParticipantStatus::Creator { .. })
    }

    /// Creators count as administrators.
    pub fn is_administrator(&self) -> bool {
        matches!(
            self,
            ParticipantStatus::Creator { .. } | ParticipantStatus::Administrator { .. }
        )
    }

    pub fn is_member(&self) -> bool {
        match self {
            ParticipantStatus::Creator { is_member, .. } => *is_member,
            ParticipantStatus::Administrator { .. } | ParticipantStatus::Member => true,
            ParticipantStatus::Restricted { is_member, .. } => *is_member,
            ParticipantStatus::Left | ParticipantStatus::Banned { .. } => false,
        }
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, ParticipantStatus::Restricted { .. })
    }

    pub fn is_banned(&self) -> bool {
        matches!(self, ParticipantStatus::Banned { .. })
    }

    pub fn until_date(&self) -> i64 {
        match self {
            ParticipantStatus::Restricted { until_date, .. }
            | ParticipantStatus::Banned { until_date } => *until_date,
            _ => 0,
        }
    }

    pub fn can_invite_users(&self) -> bool {
        match self {
            ParticipantStatus::Creator { .. } => true,
            ParticipantStatus::Administrator { rights, .. } => rights.can_invite_users,
            ParticipantStatus::Member => true,
            ParticipantStatus::Restricted {
                is_member, rights, ..
            } => *is_member && rights.can_invite_users,
            _ => false,
        }
    }

    pub fn can_restrict_members(&self) -> bool {
        match self {
            ParticipantStatus::Creator { .. } => true,
            ParticipantStatus::Administrator { rights, .. } => rights.can_restrict_members,
            _ => false,
        }
    }

    pub fn can_promote_members(&self) -> bool {
        match self {
            ParticipantStatus::Creator { .. } => true,
            ParticipantStatus::Administrator { rights, .. } => rights.can_promote_members,
            _ => false,
        }
    }

    /// Same status with membership forced to `is_member` where the variant
    /// carries it. Used when comparing a requested status against "what the
    /// user would have after being added".
    pub fn with_member(&self, is_member: bool) -> Self {
        match self.clone() {
            ParticipantStatus::Creator {
                rank, is_anonymous, ..
            } => ParticipantStatus::Creator {
                is_member,
                rank,
                is_anonymous,
            },
            ParticipantStatus::Restricted {
                until_date, rights, ..
            } => ParticipantStatus::Restricted {
                is_member,
                until_date,
                rights,
            },
            ParticipantStatus::Left if is_member => ParticipantStatus::Member,
            ParticipantStatus::Member if !is_member => ParticipantStatus::Left,
            other => other,
        }
    }

    /// Lift an expired restriction or ban. Returns `true` if the status changed.
    pub fn update_restrictions(&mut self, now: i64) -> bool {
        let until_date = self.until_date();
        if until_date == 0 || until_date > now {
            return false;
        }
        *self = match self {
            ParticipantStatus::Restricted { is_member: true, .. } => ParticipantStatus::Member,
            _ => ParticipantStatus::Left,
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_predicates() {
        assert!(ParticipantStatus::creator().is_member());
        assert!(ParticipantStatus::creator().is_administrator());
        assert!(ParticipantStatus::administrator(AdminRights::all()).is_member());
        assert!(ParticipantStatus::Member.is_member());
        assert!(!ParticipantStatus::Left.is_member());
        assert!(!ParticipantStatus::Banned { until_date: 0 }.is_member());

        let restricted = ParticipantStatus::restricted(false, 0, RestrictedRights::none());
        assert!(restricted.is_restricted());
        assert!(!restricted.is_member());
        assert!(restricted.with_member(true).is_member());
    }

    #[test]
    fn test_with_member_maps_plain_statuses() {
        assert_eq!(
            ParticipantStatus::Left.with_member(true),
            ParticipantStatus::Member
        );
        assert_eq!(
            ParticipantStatus::Member.with_member(false),
            ParticipantStatus::Left
        );
        let banned = ParticipantStatus::Banned { until_date: 10 };
        assert_eq!(banned.with_member(true), banned);
    }

    #[test]
    fn test_update_restrictions_expiry() {
        let mut status = ParticipantStatus::restricted(true, 100, RestrictedRights::none());
        assert!(!status.update_restrictions(99));
        assert!(status.update_restrictions(100));
        assert_eq!(status, ParticipantStatus::Member);

        let mut banned = ParticipantStatus::Banned { until_date: 50 };
        assert!(banned.update_restrictions(60));
        assert_eq!(banned, ParticipantStatus::Left);

        let mut forever = ParticipantStatus::Banned { until_date: 0 };
        assert!(!forever.update_restrictions(i64::MAX));
    }

    #[test]
    fn test_rights_accessors() {
        let admin = ParticipantStatus::administrator(AdminRights {
            can_restrict_members: true,
            ..AdminRights::default()
        });
        assert!(admin.can_restrict_members());
        assert!(!admin.can_promote_members());
        assert!(!ParticipantStatus::Member.can_restrict_members());
        assert!(ParticipantStatus::creator().can_promote_members());
    }
}
