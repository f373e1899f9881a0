//! Full-info records with a freshness window.
//!
//! User and channel full records expire a fixed time after they were
//! fetched; basic group full records stay fresh until a consistency check
//! fails. Expired records are still served to interactive sessions while a
//! refresh runs in the background. Bots wait for the refresh.

use std::time::Duration;

use chrono::{DateTime, Utc};

use parlor_shared::{CacheError, ChannelId, ChatId, DialogId, UserId};

use crate::backend::{RemoteChannelFull, RemoteChatFull, RemoteUserFull};
use crate::coalescer::Waiter;
use crate::engine::{Engine, EngineState};
use crate::propagate::Family;
use crate::records::{Channel, ChannelFull, Chat, ChatFull, RecordMeta, User, UserFull};

/// How often a channel full fetch is repeated because the counters moved
/// speculatively while it was in flight.
const MAX_FULL_REFRESH_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Freshness {
    Fresh,
    Stale,
    Absent,
}

fn assign<T: PartialEq>(field: &mut T, value: T, changed: &mut bool) {
    if *field != value {
        *field = value;
        *changed = true;
    }
}

fn mark_received(meta: &mut RecordMeta) {
    if !meta.is_received {
        meta.is_received = true;
        meta.is_changed = true;
    }
}

impl Engine {
    fn freshness(&self, dialog_id: DialogId) -> Freshness {
        let now = self.inner.clock.now();
        let state = self.state();
        let by_expiry = |expires_at: Option<DateTime<Utc>>| match expires_at {
            None => Freshness::Absent,
            Some(expires_at) if expires_at > now => Freshness::Fresh,
            Some(_) => Freshness::Stale,
        };
        match dialog_id {
            DialogId::User(user_id) => {
                by_expiry(state.records.get::<UserFull>(user_id).map(|full| full.expires_at))
            }
            DialogId::Chat(chat_id) => match state.records.get::<ChatFull>(chat_id) {
                None => Freshness::Absent,
                Some(full) if full.is_up_to_date => Freshness::Fresh,
                Some(_) => Freshness::Stale,
            },
            DialogId::Channel(channel_id) => by_expiry(
                state
                    .records
                    .get::<ChannelFull>(channel_id)
                    .map(|full| full.expires_at),
            ),
            DialogId::SecretChat(_) => Freshness::Absent,
        }
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let now = self.inner.clock.now();
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(now)
    }

    /// Make sure the full record of `dialog_id` is available, fetching it
    /// when it is missing or expired.
    pub async fn get_full_record(&self, dialog_id: DialogId) -> Result<(), CacheError> {
        if let DialogId::SecretChat(_) = dialog_id {
            return Err(CacheError::InvalidArgument(
                "Secret chats have no full info".into(),
            ));
        }
        let tries = self.inner.config.default_get_tries;
        self.get_record(dialog_id, tries).await?;
        if matches!(dialog_id, DialogId::Chat(_) | DialogId::Channel(_))
            && !self.have_dialog_access(dialog_id)
        {
            return Err(CacheError::NoAccess(dialog_id));
        }

        let mut freshness = self.freshness(dialog_id);
        if freshness == Freshness::Absent {
            self.load_full_from_database(dialog_id).await;
            freshness = self.freshness(dialog_id);
        }

        match freshness {
            Freshness::Fresh => Ok(()),
            Freshness::Absent => self
                .submit_full_fetch(dialog_id)
                .wait()
                .await
                .unwrap_or_else(|| Err(CacheError::Transient("full info fetch aborted".into()))),
            Freshness::Stale if self.inner.config.is_bot => {
                if let Some(Err(e)) = self.submit_full_fetch(dialog_id).wait().await {
                    tracing::warn!(%dialog_id, error = %e, "Failed to refresh full info, serving stale copy");
                }
                Ok(())
            }
            Freshness::Stale => {
                tracing::debug!(%dialog_id, "Serving stale full info while refreshing");
                drop(self.submit_full_fetch(dialog_id));
                Ok(())
            }
        }
    }

    pub async fn get_user_full(&self, user_id: UserId) -> Result<UserFull, CacheError> {
        let dialog_id = DialogId::User(user_id);
        self.get_full_record(dialog_id).await?;
        self.user_full(user_id).ok_or(CacheError::NotFound(dialog_id))
    }

    pub async fn get_chat_full(&self, chat_id: ChatId) -> Result<ChatFull, CacheError> {
        let dialog_id = DialogId::Chat(chat_id);
        self.get_full_record(dialog_id).await?;
        self.chat_full(chat_id).ok_or(CacheError::NotFound(dialog_id))
    }

    pub async fn get_channel_full(&self, channel_id: ChannelId) -> Result<ChannelFull, CacheError> {
        let dialog_id = DialogId::Channel(channel_id);
        self.get_full_record(dialog_id).await?;
        self.channel_full(channel_id).ok_or(CacheError::NotFound(dialog_id))
    }

    async fn load_full_from_database(&self, dialog_id: DialogId) {
        match dialog_id {
            DialogId::User(user_id) => self.load_from_database::<UserFull>(user_id).await,
            DialogId::Chat(chat_id) => self.load_from_database::<ChatFull>(chat_id).await,
            DialogId::Channel(channel_id) => {
                self.load_from_database::<ChannelFull>(channel_id).await
            }
            DialogId::SecretChat(_) => {}
        }
    }

    /// Join or start the network fetch of a full record.
    pub(crate) fn submit_full_fetch(&self, dialog_id: DialogId) -> Waiter<Result<(), CacheError>> {
        let engine = self.clone();
        self.inner
            .full_fetches
            .submit(dialog_id, move || async move { engine.fetch_full_record(dialog_id).await })
    }

    pub(crate) fn spawn_full_refetch(&self, dialog_id: DialogId) {
        let waiter = self.submit_full_fetch(dialog_id);
        tokio::spawn(async move {
            if let Some(Err(e)) = waiter.wait().await {
                tracing::warn!(%dialog_id, error = %e, "Failed to refetch full info");
            }
        });
    }

    async fn fetch_full_record(&self, dialog_id: DialogId) -> Result<(), CacheError> {
        match dialog_id {
            DialogId::User(user_id) => self.fetch_user_full(user_id).await,
            DialogId::Chat(chat_id) => self.fetch_chat_full(chat_id).await,
            DialogId::Channel(channel_id) => self.fetch_channel_full(channel_id).await,
            DialogId::SecretChat(_) => Err(CacheError::InvalidArgument(
                "Secret chats have no full info".into(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    async fn fetch_user_full(&self, user_id: UserId) -> Result<(), CacheError> {
        tracing::debug!(%user_id, "Fetching user full info");
        let full = self
            .inner
            .backend
            .get_full_user(user_id)
            .await
            .map_err(|e| e.into_cache_error(user_id.into()))?;
        self.on_get_user_full(user_id, full);
        Ok(())
    }

    fn on_get_user_full(&self, user_id: UserId, remote: RemoteUserFull) {
        let expires_at = self.expiry(self.inner.config.user_full_ttl);
        let mut state = self.state();
        self.on_get_user(&mut state, remote.user);
        if !state.records.contains::<User>(user_id) {
            tracing::warn!(%user_id, "Full info for an unknown user");
            return;
        }

        let full = state.records.get_or_create::<UserFull>(user_id);
        mark_received(&mut full.meta);
        let mut changed = false;
        assign(&mut full.about, remote.about, &mut changed);
        assign(&mut full.is_blocked, remote.is_blocked, &mut changed);
        assign(&mut full.can_be_called, remote.can_be_called, &mut changed);
        assign(&mut full.common_chat_count, remote.common_chat_count, &mut changed);
        full.meta.is_changed |= changed;
        full.expires_at = expires_at;
        UserFull::commit(self, &mut state, user_id, false);
    }

    // ------------------------------------------------------------------
    // Basic groups
    // ------------------------------------------------------------------

    async fn fetch_chat_full(&self, chat_id: ChatId) -> Result<(), CacheError> {
        tracing::debug!(%chat_id, "Fetching group full info");
        let full = self
            .inner
            .backend
            .get_full_chat(chat_id)
            .await
            .map_err(|e| e.into_cache_error(chat_id.into()))?;
        self.on_get_chat_full(chat_id, full);
        Ok(())
    }

    fn on_get_chat_full(&self, chat_id: ChatId, remote: RemoteChatFull) {
        let mut state = self.state();
        self.on_get_users(&mut state, remote.users);
        self.on_get_chats(&mut state, remote.chats);
        if !state.records.contains::<Chat>(chat_id) {
            tracing::warn!(%chat_id, "Full info for an unknown group");
            return;
        }

        let my_user_id = self.my_user_id();
        let my_status = remote
            .participants
            .iter()
            .find(|participant| participant.user_id == my_user_id)
            .map(|participant| participant.status.clone());
        let participant_count = i32::try_from(remote.participants.len()).unwrap_or(i32::MAX);
        let version = remote.version;

        let full = state.records.get_or_create::<ChatFull>(chat_id);
        mark_received(&mut full.meta);
        let mut changed = false;
        assign(&mut full.participants, remote.participants, &mut changed);
        assign(&mut full.version, version, &mut changed);
        assign(&mut full.creator_user_id, remote.creator_user_id, &mut changed);
        assign(&mut full.description, remote.description, &mut changed);
        assign(&mut full.invite_link, remote.invite_link, &mut changed);
        full.meta.is_changed |= changed;
        full.is_up_to_date = true;
        ChatFull::commit(self, &mut state, chat_id, false);

        if let Some(chat) = state.records.get_mut::<Chat>(chat_id) {
            if version >= chat.version {
                let mut changed = false;
                assign(&mut chat.version, version, &mut changed);
                assign(&mut chat.participant_count, participant_count, &mut changed);
                chat.meta.is_changed |= changed;
                if let Some(status) = my_status {
                    chat.set_status(status);
                }
            }
        }
        Chat::commit(self, &mut state, chat_id, false);
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    async fn fetch_channel_full(&self, channel_id: ChannelId) -> Result<(), CacheError> {
        let mut retries = 0;
        loop {
            let requested_version = self.begin_channel_full_request(channel_id);
            tracing::debug!(%channel_id, retries, "Fetching channel full info");
            let full = self
                .inner
                .backend
                .get_full_channel(channel_id)
                .await
                .map_err(|e| e.into_cache_error(channel_id.into()))?;

            let current_version = self.channel_full_speculative_version(channel_id);
            if current_version != requested_version && retries < MAX_FULL_REFRESH_RETRIES {
                tracing::debug!(%channel_id, "Counters changed during fetch, repeating");
                retries += 1;
                continue;
            }
            self.on_get_channel_full(channel_id, full);
            return Ok(());
        }
    }

    fn begin_channel_full_request(&self, channel_id: ChannelId) -> u32 {
        let mut state = self.state();
        match state.records.get_mut::<ChannelFull>(channel_id) {
            Some(full) => {
                full.repair_request_version = full.speculative_version;
                full.speculative_version
            }
            None => 0,
        }
    }

    fn channel_full_speculative_version(&self, channel_id: ChannelId) -> u32 {
        let state = self.state();
        let version = state
            .records
            .get::<ChannelFull>(channel_id)
            .map_or(0, |full| full.speculative_version);
        version
    }

    fn on_get_channel_full(&self, channel_id: ChannelId, mut remote: RemoteChannelFull) {
        let expires_at = self.expiry(self.inner.config.channel_full_ttl);
        let users = std::mem::take(&mut remote.users);
        let chats = std::mem::take(&mut remote.chats);
        let mut state = self.state();
        self.on_get_users(&mut state, users);
        self.on_get_chats(&mut state, chats);
        self.apply_channel_full(&mut state, channel_id, remote_fields(remote), expires_at);
    }

    fn apply_channel_full(
        &self,
        state: &mut EngineState,
        channel_id: ChannelId,
        remote: ChannelFull,
        expires_at: DateTime<Utc>,
    ) {
        if !state.records.contains::<Channel>(channel_id) {
            tracing::warn!(%channel_id, "Full info for an unknown channel");
            return;
        }

        let full = state.records.get_or_create::<ChannelFull>(channel_id);
        mark_received(&mut full.meta);
        let mut changed = false;
        assign(&mut full.description, remote.description, &mut changed);
        assign(&mut full.participant_count, remote.participant_count, &mut changed);
        assign(&mut full.administrator_count, remote.administrator_count, &mut changed);
        assign(&mut full.restricted_count, remote.restricted_count, &mut changed);
        assign(&mut full.banned_count, remote.banned_count, &mut changed);
        assign(&mut full.invite_link, remote.invite_link, &mut changed);
        assign(&mut full.slow_mode_delay, remote.slow_mode_delay, &mut changed);
        assign(
            &mut full.slow_mode_next_send_date,
            remote.slow_mode_next_send_date,
            &mut changed,
        );
        assign(&mut full.linked_channel_id, remote.linked_channel_id, &mut changed);
        assign(&mut full.can_get_participants, remote.can_get_participants, &mut changed);
        assign(
            &mut full.is_all_history_available,
            remote.is_all_history_available,
            &mut changed,
        );
        full.meta.is_changed |= changed;
        full.expires_at = expires_at;
        ChannelFull::commit(self, state, channel_id, false);
    }
}

fn remote_fields(remote: RemoteChannelFull) -> ChannelFull {
    ChannelFull {
        description: remote.description,
        participant_count: remote.participant_count,
        administrator_count: remote.administrator_count,
        restricted_count: remote.restricted_count,
        banned_count: remote.banned_count,
        invite_link: remote.invite_link,
        slow_mode_delay: remote.slow_mode_delay,
        slow_mode_next_send_date: remote.slow_mode_next_send_date,
        linked_channel_id: remote.linked_channel_id,
        can_get_participants: remote.can_get_participants,
        is_all_history_available: remote.is_all_history_available,
        ..ChannelFull::default()
    }
}
