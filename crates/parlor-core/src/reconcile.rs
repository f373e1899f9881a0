//! Update reconciliation.
//!
//! Authoritative data enters here: network responses through the
//! `on_get_*` handlers and pushed deltas through [`Engine::on_update`].
//! Versioned membership deltas are applied only when they extend the local
//! version by exactly one; anything further ahead is a gap and is repaired
//! by refetching the group.

use parlor_shared::constants::{
    CHANNEL_CACHE_VERSION, CHAT_CACHE_VERSION, SECRET_CHAT_CACHE_VERSION, USER_CACHE_VERSION,
};
use parlor_shared::{
    AdminRights, ChannelId, ChatId, DialogId, ParticipantStatus, RestrictedRights, UserId,
};

use crate::backend::{ChannelData, ChatData, RemoteChat, RemoteSecretChat, RemoteUser};
use crate::engine::{Engine, EngineState};
use crate::propagate::Family;
use crate::records::{
    speculative_add_count, Channel, ChatFull, ChatParticipant, Chat, Photo, SecretChat, User,
};
use crate::speculative::{EffectOrigin, StatusClass};
use crate::updates::Update;

/// How a versioned delta relates to the local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    Apply,
    /// Same version, but the delta only corrects a counter.
    ApplyCountOnly,
    Stale,
    Gap,
}

pub fn classify_version(local: i32, incoming: i32, count_only: bool) -> VersionCheck {
    if Some(incoming) == local.checked_add(1) {
        VersionCheck::Apply
    } else if incoming == local && count_only {
        VersionCheck::ApplyCountOnly
    } else if incoming <= local {
        VersionCheck::Stale
    } else {
        VersionCheck::Gap
    }
}

impl Engine {
    // ------------------------------------------------------------------
    // Network responses
    // ------------------------------------------------------------------

    pub(crate) fn on_get_users(&self, state: &mut EngineState, users: Vec<RemoteUser>) {
        for user in users {
            self.on_get_user(state, user);
        }
    }

    pub(crate) fn on_get_user(&self, state: &mut EngineState, remote: RemoteUser) {
        let data = match remote {
            RemoteUser::Empty(user_id) => {
                if !state.records.contains::<User>(user_id) {
                    tracing::error!(%user_id, "Received empty user for an unknown id");
                }
                return;
            }
            RemoteUser::User(data) => data,
        };
        let user_id = data.id;
        if !user_id.is_valid() {
            tracing::error!(%user_id, "Received invalid user");
            return;
        }

        let user = state.records.get_or_create::<User>(user_id);
        if !user.meta.is_received {
            user.meta.is_received = true;
            user.meta.is_changed = true;
        }
        user.set_name(&data.first_name, &data.last_name);
        user.set_username(&data.username);
        user.set_photo(data.photo);
        user.set_contact(data.is_contact, data.is_mutual_contact);
        user.set_deleted(data.is_deleted);
        user.set_was_online(data.was_online);
        if data.access_hash.is_some() && user.access_hash != data.access_hash {
            user.access_hash = data.access_hash;
            user.meta.need_save_to_database = true;
        }
        if user.phone_number != data.phone_number
            || user.is_bot != data.is_bot
            || user.is_verified != data.is_verified
        {
            user.phone_number = data.phone_number;
            user.is_bot = data.is_bot;
            user.is_verified = data.is_verified;
            user.meta.is_changed = true;
        }
        if user.cache_version != USER_CACHE_VERSION {
            user.cache_version = USER_CACHE_VERSION;
            user.meta.need_save_to_database = true;
        }

        User::commit(self, state, user_id, false);
    }

    pub(crate) fn on_get_chats(&self, state: &mut EngineState, chats: Vec<RemoteChat>) {
        for chat in chats {
            self.on_get_chat(state, chat);
        }
    }

    pub(crate) fn on_get_chat(&self, state: &mut EngineState, remote: RemoteChat) {
        match remote {
            RemoteChat::Empty(chat_id) => {
                if !state.records.contains::<Chat>(chat_id) {
                    tracing::error!(%chat_id, "Received empty chat for an unknown id");
                }
            }
            RemoteChat::Chat(data) => self.on_get_basic_group(state, data),
            RemoteChat::ChatForbidden { id, title } => {
                if !id.is_valid() {
                    tracing::error!(chat_id = %id, "Received invalid chat");
                    return;
                }
                let chat = state.records.get_or_create::<Chat>(id);
                mark_received(&mut chat.meta);
                chat.set_title(&title);
                chat.set_status(ParticipantStatus::Banned { until_date: 0 });
                if chat.participant_count != 0 {
                    chat.participant_count = 0;
                    chat.meta.is_changed = true;
                }
                Chat::commit(self, state, id, false);
            }
            RemoteChat::Channel(data) => self.on_get_channel(state, data),
            RemoteChat::ChannelForbidden {
                id,
                access_hash,
                title,
                until_date,
            } => {
                if !id.is_valid() {
                    tracing::error!(channel_id = %id, "Received invalid channel");
                    return;
                }
                let channel = state.records.get_or_create::<Channel>(id);
                mark_received(&mut channel.meta);
                if channel.access_hash != access_hash {
                    channel.access_hash = access_hash;
                    channel.meta.need_save_to_database = true;
                }
                channel.set_title(&title);
                channel.set_status(ParticipantStatus::Banned { until_date });
                channel.set_participant_count(0);
                Channel::commit(self, state, id, false);
            }
        }
    }

    fn on_get_basic_group(&self, state: &mut EngineState, data: ChatData) {
        let chat_id = data.id;
        if !chat_id.is_valid() {
            tracing::error!(%chat_id, "Received invalid chat");
            return;
        }

        let chat = state.records.get_or_create::<Chat>(chat_id);
        mark_received(&mut chat.meta);
        chat.set_title(&data.title);
        chat.set_photo(data.photo);
        if let Some(permissions) = data.default_permissions {
            chat.set_default_permissions(permissions);
        }
        if chat.date != data.date {
            chat.date = data.date;
            chat.meta.is_changed = true;
        }

        let mut version_advanced = false;
        if data.version >= chat.version {
            if data.version > chat.version {
                chat.version = data.version;
                chat.meta.is_changed = true;
                version_advanced = true;
            }
            if chat.participant_count != data.participant_count {
                chat.participant_count = data.participant_count;
                chat.meta.is_changed = true;
            }
            chat.set_status(data.status);
            chat.set_active(data.is_active);
        } else {
            tracing::debug!(%chat_id, version = data.version, local = chat.version, "Ignoring outdated group state");
        }
        chat.set_migrated_to(data.migrated_to);
        if chat.cache_version != CHAT_CACHE_VERSION {
            chat.cache_version = CHAT_CACHE_VERSION;
            chat.meta.need_save_to_database = true;
        }

        if version_advanced {
            if let Some(full) = state.records.get_mut::<ChatFull>(chat_id) {
                if full.version != data.version {
                    full.is_up_to_date = false;
                }
            }
        }
        Chat::commit(self, state, chat_id, false);
    }

    fn on_get_channel(&self, state: &mut EngineState, data: ChannelData) {
        let channel_id = data.id;
        if !channel_id.is_valid() {
            tracing::error!(%channel_id, "Received invalid channel");
            return;
        }

        let channel = state.records.get_or_create::<Channel>(channel_id);
        mark_received(&mut channel.meta);
        if channel.access_hash != data.access_hash {
            channel.access_hash = data.access_hash;
            channel.meta.need_save_to_database = true;
        }
        channel.set_title(&data.title);
        channel.set_username(&data.username);
        channel.set_photo(data.photo);
        if let Some(permissions) = data.default_permissions {
            channel.set_default_permissions(permissions);
        }
        if channel.date != data.date
            || channel.is_megagroup != data.is_megagroup
            || channel.is_verified != data.is_verified
            || channel.sign_messages != data.sign_messages
            || channel.has_linked_channel != data.has_linked_channel
        {
            channel.date = data.date;
            channel.is_megagroup = data.is_megagroup;
            channel.is_verified = data.is_verified;
            channel.sign_messages = data.sign_messages;
            channel.has_linked_channel = data.has_linked_channel;
            channel.meta.is_changed = true;
        }
        if data.participant_count != 0 {
            channel.set_participant_count(data.participant_count);
        }
        if data.version > channel.version {
            channel.version = data.version;
            channel.meta.is_changed = true;
        }
        channel.set_status(data.status);
        if channel.cache_version != CHANNEL_CACHE_VERSION {
            channel.cache_version = CHANNEL_CACHE_VERSION;
            channel.meta.need_save_to_database = true;
        }

        Channel::commit(self, state, channel_id, false);
    }

    pub(crate) fn on_get_secret_chat(&self, state: &mut EngineState, remote: RemoteSecretChat) {
        let secret_chat_id = remote.id;
        if !secret_chat_id.is_valid() {
            tracing::error!(%secret_chat_id, "Received invalid secret chat");
            return;
        }

        let secret_chat = state.records.get_or_create::<SecretChat>(secret_chat_id);
        mark_received(&mut secret_chat.meta);
        if secret_chat.access_hash != remote.access_hash
            || secret_chat.user_id != remote.user_id
            || secret_chat.is_outbound != remote.is_outbound
            || secret_chat.ttl != remote.ttl
            || secret_chat.date != remote.date
            || secret_chat.layer != remote.layer
        {
            secret_chat.access_hash = remote.access_hash;
            secret_chat.user_id = remote.user_id;
            secret_chat.is_outbound = remote.is_outbound;
            secret_chat.ttl = remote.ttl;
            secret_chat.date = remote.date;
            secret_chat.layer = remote.layer;
            secret_chat.meta.is_changed = true;
        }
        secret_chat.set_state(remote.state);
        if secret_chat.cache_version != SECRET_CHAT_CACHE_VERSION {
            secret_chat.cache_version = SECRET_CHAT_CACHE_VERSION;
            secret_chat.meta.need_save_to_database = true;
        }

        SecretChat::commit(self, state, secret_chat_id, false);
    }

    // ------------------------------------------------------------------
    // Update stream
    // ------------------------------------------------------------------

    /// Apply one delta from the backend's update stream.
    pub fn on_update(&self, update: Update) {
        let mut state = self.state();
        match update {
            Update::Users(users) => self.on_get_users(&mut state, users),
            Update::Chats(chats) => self.on_get_chats(&mut state, chats),
            Update::UserName {
                user_id,
                first_name,
                last_name,
                username,
            } => {
                if let Some(user) = known_user(&mut state, user_id) {
                    user.set_name(&first_name, &last_name);
                    user.set_username(&username);
                    User::commit(self, &mut state, user_id, false);
                }
            }
            Update::UserPhoto { user_id, photo } => {
                self.on_update_user_photo(&mut state, user_id, photo);
            }
            Update::UserStatus {
                user_id,
                was_online,
            } => {
                if let Some(user) = known_user(&mut state, user_id) {
                    user.set_was_online(was_online);
                    User::commit(self, &mut state, user_id, false);
                }
            }
            Update::UserIsContact {
                user_id,
                is_contact,
                is_mutual_contact,
            } => {
                if let Some(user) = known_user(&mut state, user_id) {
                    user.set_contact(is_contact, is_mutual_contact);
                    User::commit(self, &mut state, user_id, false);
                }
            }
            Update::ChatParticipantAdd {
                chat_id,
                user_id,
                inviter_user_id,
                date,
                version,
            } => self.on_chat_participant_add(
                &mut state,
                chat_id,
                ChatParticipant {
                    user_id,
                    inviter_user_id,
                    joined_date: date,
                    status: ParticipantStatus::Member,
                },
                version,
            ),
            Update::ChatParticipantDelete {
                chat_id,
                user_id,
                version,
            } => self.on_chat_participant_delete(&mut state, chat_id, user_id, version),
            Update::ChatParticipantAdmin {
                chat_id,
                user_id,
                is_admin,
                version,
            } => self.on_chat_participant_admin(&mut state, chat_id, user_id, is_admin, version),
            Update::ChatParticipants {
                chat_id,
                participants,
                version,
            } => self.on_chat_participants(&mut state, chat_id, participants, version),
            Update::ChatDefaultPermissions {
                chat_id,
                permissions,
                version,
            } => self.on_chat_default_permissions(&mut state, chat_id, permissions, version),
            Update::ChannelParticipant {
                channel_id,
                user_id,
                old_status,
                new_status,
                version,
            } => self.on_channel_participant(
                &mut state, channel_id, user_id, old_status, new_status, version,
            ),
            Update::Channel(channel_id) => {
                if state.records.contains::<Channel>(channel_id) {
                    self.invalidate_channel_full(&mut state, channel_id);
                    self.spawn_record_refetch(channel_id.into());
                } else {
                    tracing::debug!(%channel_id, "Ignoring update for an unknown channel");
                }
            }
            Update::SecretChat(secret_chat) => self.on_get_secret_chat(&mut state, secret_chat),
        }
    }

    fn on_update_user_photo(&self, state: &mut EngineState, user_id: UserId, photo: Option<Photo>) {
        if let Some(user) = known_user(state, user_id) {
            user.set_photo(photo);
            User::commit(self, state, user_id, false);
        }
    }

    fn on_chat_version_gap(&self, chat_id: ChatId, local: i32, incoming: i32) {
        tracing::info!(%chat_id, local, incoming, "Group version gap, refetching members");
        self.spawn_full_refetch(chat_id.into());
    }

    fn on_chat_participant_add(
        &self,
        state: &mut EngineState,
        chat_id: ChatId,
        participant: ChatParticipant,
        version: i32,
    ) {
        let Some(old_version) = state.records.get::<Chat>(chat_id).map(|chat| chat.version) else {
            tracing::debug!(%chat_id, "Ignoring participant delta for an unknown group");
            return;
        };
        let user_id = participant.user_id;
        let effect = StatusClass::of(&ParticipantStatus::Member);

        match classify_version(old_version, version, false) {
            VersionCheck::Stale => {
                tracing::debug!(%chat_id, version, local = old_version, "Ignoring stale participant delta");
                return;
            }
            VersionCheck::Gap => {
                state.take_pending_effect(chat_id.into(), user_id, effect);
                self.on_chat_version_gap(chat_id, old_version, version);
                return;
            }
            VersionCheck::Apply | VersionCheck::ApplyCountOnly => {}
        }

        let confirmed = state.take_pending_effect(chat_id.into(), user_id, effect);
        let is_me = user_id == self.my_user_id();
        if let Some(chat) = state.records.get_mut::<Chat>(chat_id) {
            chat.version = version;
            chat.meta.is_changed = true;
            if !confirmed {
                speculative_add_count(&mut chat.participant_count, 1, 0);
            }
            if is_me {
                chat.set_status(ParticipantStatus::Member);
            }
        }

        if let Some(full) = state.records.get_mut::<ChatFull>(chat_id) {
            if full.version == old_version {
                if full.participant(user_id).is_none() {
                    full.participants.push(participant);
                }
                full.version = version;
            } else {
                full.is_up_to_date = false;
            }
            full.meta.is_changed = true;
            ChatFull::commit(self, state, chat_id, false);
        }
        Chat::commit(self, state, chat_id, false);
    }

    fn on_chat_participant_delete(
        &self,
        state: &mut EngineState,
        chat_id: ChatId,
        user_id: UserId,
        version: i32,
    ) {
        let Some(old_version) = state.records.get::<Chat>(chat_id).map(|chat| chat.version) else {
            tracing::debug!(%chat_id, "Ignoring participant delta for an unknown group");
            return;
        };
        // A deleted account can leave without a version bump.
        let count_only = state
            .records
            .get::<User>(user_id)
            .is_some_and(|user| user.is_deleted)
            && state
                .records
                .get::<ChatFull>(chat_id)
                .is_some_and(|full| full.participant(user_id).is_some());
        let effect = StatusClass::of(&ParticipantStatus::Left);

        let check = classify_version(old_version, version, count_only);
        match check {
            VersionCheck::Stale => {
                tracing::debug!(%chat_id, version, local = old_version, "Ignoring stale participant delta");
                return;
            }
            VersionCheck::Gap => {
                state.take_pending_effect(chat_id.into(), user_id, effect);
                self.on_chat_version_gap(chat_id, old_version, version);
                return;
            }
            VersionCheck::Apply | VersionCheck::ApplyCountOnly => {}
        }

        let confirmed = state.take_pending_effect(chat_id.into(), user_id, effect);
        let is_me = user_id == self.my_user_id();
        if let Some(chat) = state.records.get_mut::<Chat>(chat_id) {
            if check == VersionCheck::Apply {
                chat.version = version;
            }
            chat.meta.is_changed = true;
            if !confirmed {
                speculative_add_count(&mut chat.participant_count, -1, 0);
            }
            if is_me {
                chat.set_status(ParticipantStatus::Left);
            }
        }

        if let Some(full) = state.records.get_mut::<ChatFull>(chat_id) {
            full.remove_participant(user_id);
            if check == VersionCheck::Apply && full.version == old_version {
                full.version = version;
            } else {
                if check == VersionCheck::ApplyCountOnly {
                    tracing::info!(%chat_id, %user_id, "Deleted account left without a version bump, rechecking members");
                }
                full.is_up_to_date = false;
            }
            full.meta.is_changed = true;
            ChatFull::commit(self, state, chat_id, false);
        }
        Chat::commit(self, state, chat_id, false);
    }

    fn on_chat_participant_admin(
        &self,
        state: &mut EngineState,
        chat_id: ChatId,
        user_id: UserId,
        is_admin: bool,
        version: i32,
    ) {
        let Some(old_version) = state.records.get::<Chat>(chat_id).map(|chat| chat.version) else {
            tracing::debug!(%chat_id, "Ignoring participant delta for an unknown group");
            return;
        };
        match classify_version(old_version, version, false) {
            VersionCheck::Stale => {
                tracing::debug!(%chat_id, version, local = old_version, "Ignoring stale admin delta");
                return;
            }
            VersionCheck::Gap => {
                self.on_chat_version_gap(chat_id, old_version, version);
                return;
            }
            VersionCheck::Apply | VersionCheck::ApplyCountOnly => {}
        }

        let status = if is_admin {
            ParticipantStatus::administrator(AdminRights::all())
        } else {
            ParticipantStatus::Member
        };
        let is_me = user_id == self.my_user_id();
        if let Some(chat) = state.records.get_mut::<Chat>(chat_id) {
            chat.version = version;
            chat.meta.is_changed = true;
            if is_me && !chat.status.is_creator() {
                chat.set_status(status.clone());
            }
        }

        if let Some(full) = state.records.get_mut::<ChatFull>(chat_id) {
            if full.version == old_version {
                if let Some(participant) = full.participant_mut(user_id) {
                    if !participant.status.is_creator() {
                        participant.status = status;
                    }
                }
                full.version = version;
            } else {
                full.is_up_to_date = false;
            }
            full.meta.is_changed = true;
            ChatFull::commit(self, state, chat_id, false);
        }
        Chat::commit(self, state, chat_id, false);
    }

    fn on_chat_participants(
        &self,
        state: &mut EngineState,
        chat_id: ChatId,
        participants: Vec<ChatParticipant>,
        version: i32,
    ) {
        let Some(chat) = state.records.get::<Chat>(chat_id) else {
            tracing::debug!(%chat_id, "Ignoring members of an unknown group");
            return;
        };
        let full_version = state
            .records
            .get::<ChatFull>(chat_id)
            .map_or(-1, |full| full.version);
        if version < chat.version || version < full_version {
            tracing::debug!(%chat_id, version, local = chat.version, "Ignoring stale member list");
            return;
        }

        let my_user_id = self.my_user_id();
        let my_status = participants
            .iter()
            .find(|participant| participant.user_id == my_user_id)
            .map(|participant| participant.status.clone());
        let participant_count = i32::try_from(participants.len()).unwrap_or(i32::MAX);

        let full = state.records.get_or_create::<ChatFull>(chat_id);
        mark_received(&mut full.meta);
        if let Some(creator) = participants.iter().find(|p| p.status.is_creator()) {
            full.creator_user_id = creator.user_id;
        }
        if full.participants != participants || full.version != version {
            full.participants = participants;
            full.version = version;
            full.meta.is_changed = true;
        }
        full.is_up_to_date = true;
        ChatFull::commit(self, state, chat_id, false);

        if let Some(chat) = state.records.get_mut::<Chat>(chat_id) {
            if chat.version != version || chat.participant_count != participant_count {
                chat.version = version;
                chat.participant_count = participant_count;
                chat.meta.is_changed = true;
            }
            if let Some(status) = my_status {
                chat.set_status(status);
            }
        }
        Chat::commit(self, state, chat_id, false);
    }

    fn on_chat_default_permissions(
        &self,
        state: &mut EngineState,
        chat_id: ChatId,
        permissions: RestrictedRights,
        version: i32,
    ) {
        let Some(chat) = state.records.get_mut::<Chat>(chat_id) else {
            tracing::debug!(%chat_id, "Ignoring permissions of an unknown group");
            return;
        };
        if version < chat.default_permissions_version {
            tracing::debug!(%chat_id, version, local = chat.default_permissions_version, "Ignoring stale permissions");
            return;
        }
        if chat.default_permissions_version != version {
            chat.default_permissions_version = version;
            chat.meta.is_changed = true;
        }
        chat.set_default_permissions(permissions);
        Chat::commit(self, state, chat_id, false);
    }

    fn on_channel_participant(
        &self,
        state: &mut EngineState,
        channel_id: ChannelId,
        user_id: UserId,
        old_status: ParticipantStatus,
        new_status: ParticipantStatus,
        version: Option<i32>,
    ) {
        let Some(local_version) = state
            .records
            .get::<Channel>(channel_id)
            .map(|channel| channel.version)
        else {
            tracing::debug!(%channel_id, "Ignoring participant delta for an unknown channel");
            return;
        };
        let dialog_id = DialogId::Channel(channel_id);
        let effect = StatusClass::of(&new_status);

        if let Some(version) = version {
            match classify_version(local_version, version, false) {
                VersionCheck::Stale => {
                    tracing::debug!(%channel_id, version, local = local_version, "Ignoring stale participant delta");
                    return;
                }
                VersionCheck::Gap => {
                    tracing::info!(%channel_id, local = local_version, incoming = version, "Channel version gap, refetching");
                    state.take_pending_effect(dialog_id, user_id, effect);
                    self.invalidate_channel_full(state, channel_id);
                    // The base record carries the version.
                    self.spawn_record_refetch(dialog_id);
                    self.spawn_full_refetch(dialog_id);
                    self.spawn_administrators_refetch(dialog_id);
                    return;
                }
                VersionCheck::Apply | VersionCheck::ApplyCountOnly => {
                    if let Some(channel) = state.records.get_mut::<Channel>(channel_id) {
                        channel.version = version;
                        channel.meta.is_changed = true;
                    }
                }
            }
        }

        if state.take_pending_effect(dialog_id, user_id, effect) {
            tracing::debug!(%channel_id, %user_id, "Participant change already applied locally");
        } else {
            self.speculative_add_channel_user(
                state,
                channel_id,
                &new_status,
                &old_status,
                EffectOrigin::Remote,
            );
        }

        if user_id == self.my_user_id() {
            if let Some(channel) = state.records.get_mut::<Channel>(channel_id) {
                channel.set_status(new_status.clone());
            }
        }
        if old_status.is_administrator() || new_status.is_administrator() {
            self.update_dialog_administrator(state, dialog_id, user_id, &new_status);
        }
        Channel::commit(self, state, channel_id, false);
    }
}

fn mark_received(meta: &mut crate::records::RecordMeta) {
    if !meta.is_received {
        meta.is_received = true;
        meta.is_changed = true;
    }
}

fn known_user(state: &mut EngineState, user_id: UserId) -> Option<&mut User> {
    let user = state.records.get_mut::<User>(user_id);
    if user.is_none() {
        tracing::debug!(%user_id, "Ignoring update for an unknown user");
    }
    user
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version_applies() {
        assert_eq!(classify_version(5, 6, false), VersionCheck::Apply);
        assert_eq!(classify_version(5, 6, true), VersionCheck::Apply);
    }

    #[test]
    fn test_old_and_duplicate_versions_are_stale() {
        assert_eq!(classify_version(5, 5, false), VersionCheck::Stale);
        assert_eq!(classify_version(5, 3, false), VersionCheck::Stale);
        assert_eq!(classify_version(5, 3, true), VersionCheck::Stale);
    }

    #[test]
    fn test_same_version_count_only_applies() {
        assert_eq!(classify_version(5, 5, true), VersionCheck::ApplyCountOnly);
    }

    #[test]
    fn test_skipped_versions_are_a_gap() {
        assert_eq!(classify_version(5, 7, false), VersionCheck::Gap);
        assert_eq!(classify_version(5, 10, true), VersionCheck::Gap);
        assert_eq!(classify_version(i32::MAX, 0, false), VersionCheck::Stale);
    }
}
