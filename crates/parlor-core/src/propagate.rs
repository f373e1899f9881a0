//! Family-specific commits.
//!
//! Each family first turns its field-level change set into notifications
//! and cross-record effects, then hands over to
//! [`Engine::finish_commit`] for the flag drain, persistence and repair.

use std::mem;

use chrono::{DateTime, Utc};

use parlor_shared::{ChannelId, ChatId, DialogId, SecretChatId, UserId};

use crate::backend::Administrator;
use crate::engine::{Engine, EngineState};
use crate::events::Event;
use crate::records::{Channel, ChannelFull, Chat, ChatFull, Entity, SecretChat, User, UserFull};

pub(crate) trait Family: Entity {
    /// Propagate the record's pending changes and run the commit pipeline.
    fn commit(engine: &Engine, state: &mut EngineState, id: Self::Id, from_database: bool);
}

impl Family for User {
    fn commit(engine: &Engine, state: &mut EngineState, user_id: UserId, from_database: bool) {
        let Some(user) = state.records.get_mut::<User>(user_id) else {
            return;
        };
        let changes = mem::take(&mut user.changes);
        let search_text = format!("{} {}", user.full_name(), user.username);
        let is_contact = user.is_contact && !user.is_deleted;
        let is_deleted = user.is_deleted;
        let new_photo_id = user.photo_id();
        let was_online = user.was_online;

        if changes.name || changes.username || changes.is_contact || changes.deleted {
            if is_contact {
                state.contacts.update(user_id, &search_text);
            } else {
                state.contacts.remove(user_id);
            }
        }

        if changes.name {
            engine.emit(Event::TitleChanged(user_id.into()));
            if let Some(secret_chats) = state.secret_chats_by_user.get(&user_id) {
                for secret_chat_id in secret_chats {
                    engine.emit(Event::TitleChanged((*secret_chat_id).into()));
                }
            }
        }

        if changes.photo {
            state.user_photos.remove(&user_id);
            engine.emit(Event::PhotoChanged {
                dialog_id: user_id.into(),
                old_photo_id: changes.old_photo_id,
                new_photo_id,
            });
        }

        if changes.is_contact {
            engine.emit(Event::ContactChanged {
                user_id,
                is_contact,
            });
        }

        if changes.status {
            engine.emit(Event::UserStatusChanged {
                user_id,
                was_online,
            });
        }

        if changes.deleted && is_deleted {
            engine.drop_full_record::<UserFull>(state, user_id);
        }

        if engine.finish_commit::<User>(state, user_id, from_database) {
            engine.emit(Event::UserUpdated(user_id));
        }
    }
}

impl Family for Chat {
    fn commit(engine: &Engine, state: &mut EngineState, chat_id: ChatId, from_database: bool) {
        let Some(chat) = state.records.get_mut::<Chat>(chat_id) else {
            return;
        };
        let changes = mem::take(&mut chat.changes);
        let new_photo_id = chat.photo_id();
        let is_accessible = chat.is_accessible();
        let dialog_id = DialogId::Chat(chat_id);

        if changes.title {
            engine.emit(Event::TitleChanged(dialog_id));
        }
        if changes.photo {
            engine.emit(Event::PhotoChanged {
                dialog_id,
                old_photo_id: changes.old_photo_id,
                new_photo_id,
            });
        }
        if changes.permissions {
            engine.emit(Event::PermissionsChanged(dialog_id));
        }

        if changes.access && changes.was_accessible && !is_accessible {
            tracing::info!(%chat_id, "Lost access to basic group");
            engine.drop_full_record::<ChatFull>(state, chat_id);
            state.administrators.remove(&dialog_id);
            engine.emit(Event::AccessLost(dialog_id));
        }

        if engine.finish_commit::<Chat>(state, chat_id, from_database) {
            engine.emit(Event::ChatUpdated(chat_id));
        }
    }
}

impl Family for Channel {
    fn commit(engine: &Engine, state: &mut EngineState, channel_id: ChannelId, from_database: bool) {
        let Some(channel) = state.records.get_mut::<Channel>(channel_id) else {
            return;
        };
        let changes = mem::take(&mut channel.changes);
        let new_photo_id = channel.photo_id();
        let status = channel.status.clone();
        let is_public = !channel.username.is_empty();
        let is_accessible = channel.is_accessible();
        let dialog_id = DialogId::Channel(channel_id);

        if changes.title {
            engine.emit(Event::TitleChanged(dialog_id));
        }
        if changes.photo {
            engine.emit(Event::PhotoChanged {
                dialog_id,
                old_photo_id: changes.old_photo_id,
                new_photo_id,
            });
        }
        if changes.permissions {
            engine.emit(Event::PermissionsChanged(dialog_id));
        }

        if let Some(old_status) = changes.old_status {
            if old_status.is_creator() != status.is_creator() {
                tracing::debug!(%channel_id, "Ownership changed, forgetting administered channels");
                state.administered_channels = None;
            }
            if old_status.until_date() != status.until_date() {
                engine.arm_restriction_timer(state, channel_id, status.until_date());
            }
            if old_status.is_administrator() != status.is_administrator() {
                let my_user_id = engine.my_user_id();
                engine.update_dialog_administrator(state, dialog_id, my_user_id, &status);
            }
            engine.invalidate_channel_full(state, channel_id);

            let was_accessible = (old_status.is_member() || is_public) && !old_status.is_banned();
            if was_accessible && !is_accessible {
                tracing::info!(%channel_id, "Lost access to channel");
                engine.drop_full_record::<ChannelFull>(state, channel_id);
                engine.emit(Event::AccessLost(dialog_id));
            }
        } else if from_database && status.until_date() != 0 {
            engine.arm_restriction_timer(state, channel_id, status.until_date());
        }

        if engine.finish_commit::<Channel>(state, channel_id, from_database) {
            engine.emit(Event::ChannelUpdated(channel_id));
        }
    }
}

impl Family for SecretChat {
    fn commit(
        engine: &Engine,
        state: &mut EngineState,
        secret_chat_id: SecretChatId,
        from_database: bool,
    ) {
        let Some(user_id) = state
            .records
            .get::<SecretChat>(secret_chat_id)
            .map(|secret_chat| secret_chat.user_id)
        else {
            return;
        };
        let secret_chats = state.secret_chats_by_user.entry(user_id).or_default();
        if !secret_chats.contains(&secret_chat_id) {
            secret_chats.push(secret_chat_id);
        }

        if engine.finish_commit::<SecretChat>(state, secret_chat_id, from_database) {
            engine.emit(Event::SecretChatUpdated(secret_chat_id));
        }
    }
}

impl Family for UserFull {
    fn commit(engine: &Engine, state: &mut EngineState, user_id: UserId, from_database: bool) {
        if engine.finish_commit::<UserFull>(state, user_id, from_database) {
            engine.emit(Event::UserFullUpdated(user_id));
        }
    }
}

impl Family for ChatFull {
    fn commit(engine: &Engine, state: &mut EngineState, chat_id: ChatId, from_database: bool) {
        let Some(full) = state.records.get::<ChatFull>(chat_id) else {
            return;
        };
        if full.meta.is_changed {
            let administrators: Vec<Administrator> = full
                .participants
                .iter()
                .filter_map(|participant| {
                    Administrator::from_status(participant.user_id, &participant.status)
                })
                .collect();
            engine.set_dialog_administrators(state, chat_id.into(), administrators);
        }

        if engine.finish_commit::<ChatFull>(state, chat_id, from_database) {
            engine.emit(Event::ChatFullUpdated(chat_id));
        }
    }
}

impl Family for ChannelFull {
    fn commit(engine: &Engine, state: &mut EngineState, channel_id: ChannelId, from_database: bool) {
        let Some(full) = state.records.get_mut::<ChannelFull>(channel_id) else {
            return;
        };
        // A zero participant count is unknown, not empty.
        if full.participant_count != 0 && full.administrator_count > full.participant_count {
            full.administrator_count = full.participant_count;
        }
        let participant_count = full.participant_count;

        if engine.finish_commit::<ChannelFull>(state, channel_id, from_database) {
            engine.emit(Event::ChannelFullUpdated(channel_id));
        }

        if participant_count != 0 {
            if let Some(channel) = state.records.get_mut::<Channel>(channel_id) {
                if channel.participant_count != participant_count {
                    channel.set_participant_count(participant_count);
                    Channel::commit(engine, state, channel_id, false);
                }
            }
        }
    }
}

impl Engine {
    /// Make the next full-info request for the channel refetch.
    pub(crate) fn invalidate_channel_full(&self, state: &mut EngineState, channel_id: ChannelId) {
        if let Some(full) = state.records.get_mut::<ChannelFull>(channel_id) {
            full.expires_at = DateTime::<Utc>::default();
        }
    }
}
