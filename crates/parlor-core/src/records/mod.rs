//! Canonical records for every entity family and their full-info
//! extensions.
//!
//! Persistent fields are serialized with `bincode`; bookkeeping that only
//! makes sense for the running process lives in [`RecordMeta`] and the
//! per-family change sets, both skipped by serde.

pub mod channel;
pub mod chat;
pub mod secret_chat;
pub mod user;

use std::fmt::Display;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use parlor_shared::codec::{self, CodecError};
use parlor_shared::constants::*;
use parlor_shared::{ChannelId, ChatId, DialogId, SecretChatId, UserId};
use parlor_store::LogEventId;

use crate::entity_store::EntityStore;

pub use channel::{Channel, ChannelChanges, ChannelFull};
pub use chat::{Chat, ChatChanges, ChatFull, ChatParticipant};
pub use secret_chat::{SecretChat, SecretChatState};
pub use user::{User, UserChanges, UserFull};

/// A profile or group photo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub small_file_id: i64,
    pub big_file_id: i64,
}

/// Change tracking and persistence state of a record.
///
/// Mutation code only ever sets `is_changed` / `need_save_to_database`; the
/// commit pipeline is the only place that clears them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMeta {
    /// Collaborators must be told about this record.
    pub is_changed: bool,
    /// The persisted copy is out of date.
    pub need_save_to_database: bool,
    /// A persisted copy exists.
    pub is_saved: bool,
    /// A keyed-store write is in flight.
    pub is_being_saved: bool,
    /// Another write was requested while one was in flight.
    pub save_pending: bool,
    /// An outdated-cache refetch was already scheduled.
    pub is_repaired: bool,
    /// Any authoritative data (network, disk or log) has been applied.
    pub is_received: bool,
    /// Write-ahead-log entry covering the latest unsaved state.
    pub log_event_id: Option<LogEventId>,
}

/// Identifier types usable as record keys.
pub trait RecordId:
    Copy + Eq + Hash + Display + Into<DialogId> + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn raw(self) -> i64;
}

impl RecordId for UserId {
    fn raw(self) -> i64 {
        self.0
    }
}

impl RecordId for ChatId {
    fn raw(self) -> i64 {
        self.0
    }
}

impl RecordId for ChannelId {
    fn raw(self) -> i64 {
        self.0
    }
}

impl RecordId for SecretChatId {
    fn raw(self) -> i64 {
        i64::from(self.0)
    }
}

/// A family of records owned by the [`EntityStore`].
pub trait Entity: Serialize + DeserializeOwned + Default + Clone + Send + 'static {
    type Id: RecordId;

    const KEY_PREFIX: &'static str;

    /// Full-info records are not covered by the write-ahead log.
    const LOG_EVENT_KIND: Option<u32>;

    const CACHE_VERSION: u32;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn cache_version(&self) -> u32 {
        Self::CACHE_VERSION
    }

    fn table(store: &EntityStore) -> &std::collections::HashMap<Self::Id, Self>;

    fn table_mut(store: &mut EntityStore) -> &mut std::collections::HashMap<Self::Id, Self>;

    /// Decode a persisted blob. The flag is `true` when the blob used an
    /// older layout and the record should be written back.
    fn decode(data: &[u8]) -> Result<(Self, bool), CodecError> {
        codec::from_bytes(data).map(|record| (record, false))
    }
}

pub fn storage_key<E: Entity>(id: E::Id) -> String {
    format!("{}{}", E::KEY_PREFIX, id.raw())
}

macro_rules! entity {
    ($record:ty, $id:ty, $prefix:expr, $log_kind:expr, $version:expr, $table:ident $(, $versioned:ident)?) => {
        impl Entity for $record {
            type Id = $id;

            const KEY_PREFIX: &'static str = $prefix;
            const LOG_EVENT_KIND: Option<u32> = $log_kind;
            const CACHE_VERSION: u32 = $version;

            fn meta(&self) -> &RecordMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut RecordMeta {
                &mut self.meta
            }

            $(
                fn cache_version(&self) -> u32 {
                    self.$versioned
                }
            )?

            fn table(store: &EntityStore) -> &std::collections::HashMap<$id, Self> {
                &store.$table
            }

            fn table_mut(store: &mut EntityStore) -> &mut std::collections::HashMap<$id, Self> {
                &mut store.$table
            }
        }
    };
}

entity!(
    Chat,
    ChatId,
    KEY_PREFIX_CHAT,
    Some(LOG_EVENT_CHAT),
    CHAT_CACHE_VERSION,
    chats,
    cache_version
);
entity!(
    Channel,
    ChannelId,
    KEY_PREFIX_CHANNEL,
    Some(LOG_EVENT_CHANNEL),
    CHANNEL_CACHE_VERSION,
    channels,
    cache_version
);
entity!(
    SecretChat,
    SecretChatId,
    KEY_PREFIX_SECRET_CHAT,
    Some(LOG_EVENT_SECRET_CHAT),
    SECRET_CHAT_CACHE_VERSION,
    secret_chats,
    cache_version
);
entity!(UserFull, UserId, KEY_PREFIX_USER_FULL, None, 1, users_full);
entity!(ChatFull, ChatId, KEY_PREFIX_CHAT_FULL, None, 1, chats_full);
entity!(ChannelFull, ChannelId, KEY_PREFIX_CHANNEL_FULL, None, 1, channels_full);

// Users carry a legacy layout, so their impl is written out by hand.
impl Entity for User {
    type Id = UserId;

    const KEY_PREFIX: &'static str = KEY_PREFIX_USER;
    const LOG_EVENT_KIND: Option<u32> = Some(LOG_EVENT_USER);
    const CACHE_VERSION: u32 = USER_CACHE_VERSION;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn cache_version(&self) -> u32 {
        self.cache_version
    }

    fn table(store: &EntityStore) -> &std::collections::HashMap<UserId, Self> {
        &store.users
    }

    fn table_mut(store: &mut EntityStore) -> &mut std::collections::HashMap<UserId, Self> {
        &mut store.users
    }

    fn decode(data: &[u8]) -> Result<(Self, bool), CodecError> {
        let (tag, body) = codec::split_tag(data)?;
        if tag == FORMAT_TAG_LEGACY {
            return crate::legacy::decode_user(body).map(|user| (user, true));
        }
        codec::from_bytes(data).map(|user| (user, false))
    }
}

/// Saturating counter update used by speculative changes.
///
/// Returns `true` if `count` changed.
pub fn speculative_add_count(count: &mut i32, delta: i32, min_count: i32) -> bool {
    let new_count = count.saturating_add(delta).max(min_count);
    if new_count == *count {
        return false;
    }
    *count = new_count;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_keys() {
        assert_eq!(storage_key::<User>(UserId(7)), "us7");
        assert_eq!(storage_key::<UserFull>(UserId(7)), "usf7");
        assert_eq!(storage_key::<Channel>(ChannelId(9)), "ch9");
        assert_eq!(storage_key::<SecretChat>(SecretChatId(-3)), "sc-3");
    }

    #[test]
    fn test_speculative_add_count_clamps() {
        let mut count = 1;
        assert!(speculative_add_count(&mut count, -3, 0));
        assert_eq!(count, 0);
        assert!(!speculative_add_count(&mut count, -1, 0));
        assert!(speculative_add_count(&mut count, 2, 0));
        assert_eq!(count, 2);
        assert!(!speculative_add_count(&mut count, 0, 0));
    }
}
