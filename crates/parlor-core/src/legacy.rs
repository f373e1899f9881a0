//! Compatibility read of user records written in the old layout.
//!
//! The old layout stored the contact relation as a two-bit link state
//! (bit 0: we have the user in our contacts, bit 1: they have us). It also
//! predates `cache_version`, so an upgraded record always counts as
//! outdated and gets refetched once.

use serde::{Deserialize, Serialize};

use parlor_shared::codec::CodecError;

use crate::records::{Photo, User};

const LINK_OUTBOUND: u8 = 1 << 0;
const LINK_INBOUND: u8 = 1 << 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LegacyUserV1 {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub phone_number: String,
    /// 0 when unknown.
    pub access_hash: i64,
    pub photo: Option<Photo>,
    pub was_online: i32,
    pub link_state: u8,
    pub is_deleted: bool,
    pub is_bot: bool,
}

/// Decode the body of a blob tagged with the legacy format.
pub fn decode_user(body: &[u8]) -> Result<User, CodecError> {
    let old: LegacyUserV1 = bincode::deserialize(body)?;

    let is_contact = old.link_state & LINK_OUTBOUND != 0;
    let is_mutual_contact = is_contact && old.link_state & LINK_INBOUND != 0;
    tracing::info!(link_state = old.link_state, "Decoded legacy user record");

    Ok(User {
        first_name: old.first_name,
        last_name: old.last_name,
        username: old.username,
        phone_number: old.phone_number,
        access_hash: (old.access_hash != 0).then_some(old.access_hash),
        photo: old.photo,
        was_online: old.was_online,
        is_contact,
        is_mutual_contact,
        is_deleted: old.is_deleted,
        is_bot: old.is_bot,
        is_verified: false,
        cache_version: 0,
        ..User::default()
    })
}

#[cfg(test)]
pub(crate) fn encode_user(old: &LegacyUserV1) -> Vec<u8> {
    let mut out = vec![parlor_shared::constants::FORMAT_TAG_LEGACY];
    out.extend(bincode::serialize(old).unwrap());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Entity;

    fn legacy(link_state: u8) -> LegacyUserV1 {
        LegacyUserV1 {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            username: String::new(),
            phone_number: String::new(),
            access_hash: 77,
            photo: None,
            was_online: 0,
            link_state,
            is_deleted: false,
            is_bot: false,
        }
    }

    #[test]
    fn test_link_state_maps_to_contact_flags() {
        let (user, outdated) = User::decode(&encode_user(&legacy(0))).unwrap();
        assert!(outdated);
        assert!(!user.is_contact);

        let (user, _) = User::decode(&encode_user(&legacy(LINK_OUTBOUND))).unwrap();
        assert!(user.is_contact);
        assert!(!user.is_mutual_contact);

        let (user, _) =
            User::decode(&encode_user(&legacy(LINK_OUTBOUND | LINK_INBOUND))).unwrap();
        assert!(user.is_mutual_contact);
        assert_eq!(user.access_hash, Some(77));
    }

    #[test]
    fn test_inbound_only_is_not_a_contact() {
        let (user, _) = User::decode(&encode_user(&legacy(LINK_INBOUND))).unwrap();
        assert!(!user.is_contact);
        assert!(!user.is_mutual_contact);
        assert_eq!(user.cache_version, 0);
    }
}
