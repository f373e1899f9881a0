//! Canonical in-memory records, one table per family.
//!
//! Other components hold identifiers, never references: a record is
//! borrowed only for the duration of one synchronous operation.

use std::collections::HashMap;

use parlor_shared::{ChannelId, ChatId, SecretChatId, UserId};

use crate::records::{Channel, ChannelFull, Chat, ChatFull, Entity, SecretChat, User, UserFull};

#[derive(Debug, Default)]
pub struct EntityStore {
    pub(crate) users: HashMap<UserId, User>,
    pub(crate) chats: HashMap<ChatId, Chat>,
    pub(crate) channels: HashMap<ChannelId, Channel>,
    pub(crate) secret_chats: HashMap<SecretChatId, SecretChat>,
    pub(crate) users_full: HashMap<UserId, UserFull>,
    pub(crate) chats_full: HashMap<ChatId, ChatFull>,
    pub(crate) channels_full: HashMap<ChannelId, ChannelFull>,
}

impl EntityStore {
    pub fn get<E: Entity>(&self, id: E::Id) -> Option<&E> {
        E::table(self).get(&id)
    }

    pub fn get_mut<E: Entity>(&mut self, id: E::Id) -> Option<&mut E> {
        E::table_mut(self).get_mut(&id)
    }

    /// Insert an empty record if none exists. Only used when the first
    /// information about `id` arrives.
    pub fn get_or_create<E: Entity>(&mut self, id: E::Id) -> &mut E {
        E::table_mut(self).entry(id).or_default()
    }

    pub fn contains<E: Entity>(&self, id: E::Id) -> bool {
        E::table(self).contains_key(&id)
    }

    pub(crate) fn insert<E: Entity>(&mut self, id: E::Id, record: E) {
        E::table_mut(self).insert(id, record);
    }

    /// Base records are never removed; this is for full records only.
    pub(crate) fn remove<E: Entity>(&mut self, id: E::Id) -> Option<E> {
        E::table_mut(self).remove(&id)
    }

    pub fn count<E: Entity>(&self) -> usize {
        E::table(self).len()
    }

    fn saving<E: Entity>(&self) -> usize {
        E::table(self)
            .values()
            .filter(|record| record.meta().is_being_saved)
            .count()
    }

    /// Records with a keyed-store write in flight, over all families.
    pub fn saves_in_flight(&self) -> usize {
        self.saving::<User>()
            + self.saving::<Chat>()
            + self.saving::<Channel>()
            + self.saving::<SecretChat>()
            + self.saving::<UserFull>()
            + self.saving::<ChatFull>()
            + self.saving::<ChannelFull>()
    }
}
