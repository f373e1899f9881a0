//! Administrator lists of groups and channels, and the list of channels the
//! current user owns.

use bytes::Bytes;

use parlor_shared::codec;
use parlor_shared::constants::KEY_PREFIX_ADMINISTRATORS;
use parlor_shared::{CacheError, ChannelId, DialogId, ParticipantStatus, UserId};

use crate::backend::{Administrator, RemoteChat};
use crate::engine::{Engine, EngineState};
use crate::events::Event;
use crate::records::Channel;

impl Administrator {
    /// `None` for statuses without administrator rights.
    pub fn from_status(user_id: UserId, status: &ParticipantStatus) -> Option<Self> {
        match status {
            ParticipantStatus::Creator { rank, .. } => Some(Self {
                user_id,
                rank: rank.clone(),
                is_creator: true,
            }),
            ParticipantStatus::Administrator { rank, .. } => Some(Self {
                user_id,
                rank: rank.clone(),
                is_creator: false,
            }),
            _ => None,
        }
    }
}

fn administrators_key(dialog_id: DialogId) -> String {
    format!("{}{}", KEY_PREFIX_ADMINISTRATORS, dialog_id.to_key())
}

fn encode_administrators(state: &EngineState, dialog_id: DialogId) -> Option<Vec<u8>> {
    let administrators = state.administrators.get(&dialog_id)?;
    match codec::to_bytes(administrators) {
        Ok(data) => Some(data),
        Err(e) => {
            tracing::error!(%dialog_id, error = %e, "Failed to encode administrators");
            None
        }
    }
}

impl Engine {
    /// Administrators of a basic group or channel: memory, then disk, then
    /// network. A list read from disk is returned at once and refreshed in
    /// the background.
    pub async fn get_dialog_administrators(
        &self,
        dialog_id: DialogId,
    ) -> Result<Vec<Administrator>, CacheError> {
        if !matches!(dialog_id, DialogId::Chat(_) | DialogId::Channel(_)) {
            return Err(CacheError::InvalidArgument(format!(
                "{dialog_id} has no administrators"
            )));
        }

        if let Some(administrators) = self.administrators(dialog_id) {
            return Ok(administrators);
        }

        self.load_administrators(dialog_id).await;
        if let Some(administrators) = self.administrators(dialog_id) {
            let engine = self.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.reload_dialog_administrators(dialog_id).await {
                    tracing::warn!(%dialog_id, error = %e, "Failed to refresh administrators");
                }
            });
            return Ok(administrators);
        }

        self.reload_dialog_administrators(dialog_id).await?;
        Ok(self.administrators(dialog_id).unwrap_or_default())
    }

    pub(crate) async fn reload_dialog_administrators(
        &self,
        dialog_id: DialogId,
    ) -> Result<(), CacheError> {
        match dialog_id {
            DialogId::Channel(channel_id) => {
                let administrators = self
                    .inner
                    .backend
                    .get_channel_administrators(channel_id)
                    .await
                    .map_err(|e| e.into_cache_error(dialog_id))?;
                self.on_get_administrators(dialog_id, administrators);
                Ok(())
            }
            // Derived from the participant list when the full record commits.
            DialogId::Chat(chat_id) => {
                self.submit_full_fetch(chat_id.into())
                    .wait()
                    .await
                    .unwrap_or(Ok(()))
            }
            DialogId::User(_) | DialogId::SecretChat(_) => Ok(()),
        }
    }

    pub(crate) fn spawn_administrators_refetch(&self, dialog_id: DialogId) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.reload_dialog_administrators(dialog_id).await {
                tracing::warn!(%dialog_id, error = %e, "Failed to refetch administrators");
            }
        });
    }

    fn on_get_administrators(&self, dialog_id: DialogId, administrators: Vec<Administrator>) {
        let mut state = self.state();
        self.set_dialog_administrators(&mut state, dialog_id, administrators);
    }

    async fn load_administrators(&self, dialog_id: DialogId) {
        if !self.inner.config.use_database {
            return;
        }
        let key = administrators_key(dialog_id);
        let waiter = {
            let mut state = self.state();
            let in_flight = self.inner.loads.is_in_flight(&key);
            if !state.attempted_loads.insert(key.clone()) && !in_flight {
                return;
            }

            let engine = self.clone();
            let load_key = key.clone();
            self.inner.loads.submit(key, move || async move {
                let data = match engine.inner.store.get(&load_key).await {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::warn!(key = %load_key, error = %e, "Failed to load administrators");
                        None
                    }
                };
                let Some(data) = data else {
                    return;
                };
                if !engine.on_load_administrators(dialog_id, &data) {
                    tracing::error!(key = %load_key, "Corrupted administrator list, erasing");
                    if let Err(e) = engine.inner.store.erase(&load_key).await {
                        tracing::warn!(key = %load_key, error = %e, "Failed to erase administrators");
                    }
                }
            })
        };
        waiter.wait().await;
    }

    /// Returns `false` if `data` does not decode.
    fn on_load_administrators(&self, dialog_id: DialogId, data: &[u8]) -> bool {
        let Ok(administrators) = codec::from_bytes::<Vec<Administrator>>(data) else {
            return false;
        };
        self.state()
            .administrators
            .entry(dialog_id)
            .or_insert(administrators);
        true
    }

    pub(crate) fn set_dialog_administrators(
        &self,
        state: &mut EngineState,
        dialog_id: DialogId,
        administrators: Vec<Administrator>,
    ) {
        if state.administrators.get(&dialog_id) == Some(&administrators) {
            return;
        }
        tracing::debug!(%dialog_id, count = administrators.len(), "Administrators changed");
        state.administrators.insert(dialog_id, administrators);
        self.save_administrators(state, dialog_id);
        self.emit(Event::AdministratorsChanged(dialog_id));
    }

    /// Patch one entry of a known list.
    pub(crate) fn update_dialog_administrator(
        &self,
        state: &mut EngineState,
        dialog_id: DialogId,
        user_id: UserId,
        status: &ParticipantStatus,
    ) {
        let Some(current) = state.administrators.get(&dialog_id) else {
            return;
        };
        let mut administrators = current.clone();
        let position = administrators
            .iter()
            .position(|administrator| administrator.user_id == user_id);

        match (Administrator::from_status(user_id, status), position) {
            (Some(administrator), Some(index)) => administrators[index] = administrator,
            (Some(administrator), None) => administrators.push(administrator),
            (None, Some(index)) => {
                administrators.remove(index);
            }
            (None, None) => return,
        }
        self.set_dialog_administrators(state, dialog_id, administrators);
    }

    /// One write per list at a time. A change during a write marks the list
    /// and the write's completion saves the latest version.
    fn save_administrators(&self, state: &mut EngineState, dialog_id: DialogId) {
        if !self.inner.config.use_database {
            return;
        }
        if let Some(resave) = state.administrator_saves.get_mut(&dialog_id) {
            *resave = true;
            return;
        }
        if let Some(data) = encode_administrators(state, dialog_id) {
            state.administrator_saves.insert(dialog_id, false);
            self.spawn_administrators_save(dialog_id, data);
        }
    }

    fn spawn_administrators_save(&self, dialog_id: DialogId, data: Vec<u8>) {
        let engine = self.clone();
        tokio::spawn(async move {
            let key = administrators_key(dialog_id);
            if let Err(e) = engine.inner.store.set(&key, Bytes::from(data)).await {
                tracing::warn!(key = %key, error = %e, "Failed to save administrators");
            }
            engine.on_administrators_saved(dialog_id);
        });
    }

    fn on_administrators_saved(&self, dialog_id: DialogId) {
        let mut state = self.state();
        let resave = state
            .administrator_saves
            .remove(&dialog_id)
            .unwrap_or(false);
        if !resave {
            return;
        }
        if let Some(data) = encode_administrators(&state, dialog_id) {
            state.administrator_saves.insert(dialog_id, false);
            self.spawn_administrators_save(dialog_id, data);
        }
    }

    // ------------------------------------------------------------------
    // Administered channels
    // ------------------------------------------------------------------

    /// Public channels owned by the current user.
    pub async fn get_administered_channels(&self) -> Result<Vec<ChannelId>, CacheError> {
        let cached = self.state().administered_channels.clone();
        if let Some(channel_ids) = cached {
            return Ok(channel_ids);
        }

        let chats = self
            .inner
            .backend
            .get_administered_public_channels()
            .await
            .map_err(|e| e.into_cache_error(self.my_user_id().into()))?;
        Ok(self.on_get_administered_channels(chats))
    }

    fn on_get_administered_channels(&self, chats: Vec<RemoteChat>) -> Vec<ChannelId> {
        let mut state = self.state();
        let candidates: Vec<ChannelId> = chats
            .iter()
            .filter_map(|chat| match chat {
                RemoteChat::Channel(data) => Some(data.id),
                _ => None,
            })
            .collect();
        self.on_get_chats(&mut state, chats);

        let channel_ids: Vec<ChannelId> = candidates
            .into_iter()
            .filter(|channel_id| {
                state
                    .records
                    .get::<Channel>(*channel_id)
                    .is_some_and(|channel| channel.status.is_creator())
            })
            .collect();
        state.administered_channels = Some(channel_ids.clone());
        channel_ids
    }
}
