//! Base-record queries: memory, then the persistent store, then the
//! network.

use parlor_shared::{CacheError, ChannelId, ChatId, DialogId, SecretChatId, UserId};

use crate::backend::{RemoteChat, RemoteUser};
use crate::engine::Engine;
use crate::records::{Channel, Chat, SecretChat, User};

impl Engine {
    /// Make sure the base record of `dialog_id` is in memory.
    ///
    /// Each try falls back one level further: with 3 tries the persistent
    /// store and then the network are consulted, with 2 only the network,
    /// with 1 only memory. Secret chats are never fetched.
    pub async fn get_record(&self, dialog_id: DialogId, mut tries: u32) -> Result<(), CacheError> {
        if !dialog_id.is_valid() {
            return Err(CacheError::NotFound(dialog_id));
        }

        loop {
            if self.has_record(dialog_id) {
                return Ok(());
            }
            if tries > 2 {
                // Returns at once if the read already finished, joins it if
                // another caller started it.
                self.load_record_from_database(dialog_id).await;
                tries -= 1;
                continue;
            }
            if tries > 1 && !matches!(dialog_id, DialogId::SecretChat(_)) {
                self.fetch_record(dialog_id).await?;
                tries -= 1;
                continue;
            }
            return Err(CacheError::NotFound(dialog_id));
        }
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<User, CacheError> {
        let dialog_id = DialogId::User(user_id);
        self.get_record(dialog_id, self.inner.config.default_get_tries)
            .await?;
        self.user(user_id).ok_or(CacheError::NotFound(dialog_id))
    }

    pub async fn get_chat(&self, chat_id: ChatId) -> Result<Chat, CacheError> {
        let dialog_id = DialogId::Chat(chat_id);
        self.get_record(dialog_id, self.inner.config.default_get_tries)
            .await?;
        self.chat(chat_id).ok_or(CacheError::NotFound(dialog_id))
    }

    pub async fn get_channel(&self, channel_id: ChannelId) -> Result<Channel, CacheError> {
        let dialog_id = DialogId::Channel(channel_id);
        self.get_record(dialog_id, self.inner.config.default_get_tries)
            .await?;
        self.channel(channel_id).ok_or(CacheError::NotFound(dialog_id))
    }

    pub async fn get_secret_chat(
        &self,
        secret_chat_id: SecretChatId,
    ) -> Result<SecretChat, CacheError> {
        let dialog_id = DialogId::SecretChat(secret_chat_id);
        self.get_record(dialog_id, self.inner.config.default_get_tries)
            .await?;
        self.secret_chat(secret_chat_id)
            .ok_or(CacheError::NotFound(dialog_id))
    }

    fn has_record(&self, dialog_id: DialogId) -> bool {
        let state = self.state();
        match dialog_id {
            DialogId::User(id) => state.records.contains::<User>(id),
            DialogId::Chat(id) => state.records.contains::<Chat>(id),
            DialogId::Channel(id) => state.records.contains::<Channel>(id),
            DialogId::SecretChat(id) => state.records.contains::<SecretChat>(id),
        }
    }

    async fn load_record_from_database(&self, dialog_id: DialogId) {
        match dialog_id {
            DialogId::User(id) => self.load_from_database::<User>(id).await,
            DialogId::Chat(id) => self.load_from_database::<Chat>(id).await,
            DialogId::Channel(id) => self.load_from_database::<Channel>(id).await,
            DialogId::SecretChat(id) => self.load_from_database::<SecretChat>(id).await,
        }
    }

    /// Fetch the base record from the backend and apply it.
    pub(crate) async fn fetch_record(&self, dialog_id: DialogId) -> Result<(), CacheError> {
        let backend = &self.inner.backend;
        match dialog_id {
            DialogId::User(user_id) => {
                let users = backend
                    .get_users(vec![user_id])
                    .await
                    .map_err(|e| e.into_cache_error(dialog_id))?;
                self.apply_users(users);
            }
            DialogId::Chat(chat_id) => {
                let chats = backend
                    .get_chats(vec![chat_id])
                    .await
                    .map_err(|e| e.into_cache_error(dialog_id))?;
                self.apply_chats(chats);
            }
            DialogId::Channel(channel_id) => {
                let chats = backend
                    .get_channels(vec![channel_id])
                    .await
                    .map_err(|e| e.into_cache_error(dialog_id))?;
                self.apply_chats(chats);
            }
            DialogId::SecretChat(_) => {
                return Err(CacheError::InvalidArgument(
                    "Secret chats can't be fetched".into(),
                ))
            }
        }
        Ok(())
    }

    pub(crate) fn spawn_record_refetch(&self, dialog_id: DialogId) {
        if matches!(dialog_id, DialogId::SecretChat(_)) {
            return;
        }
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.fetch_record(dialog_id).await {
                tracing::warn!(%dialog_id, error = %e, "Failed to refetch record");
            }
        });
    }

    fn apply_users(&self, users: Vec<RemoteUser>) {
        let mut state = self.state();
        self.on_get_users(&mut state, users);
    }

    fn apply_chats(&self, chats: Vec<RemoteChat>) {
        let mut state = self.state();
        self.on_get_chats(&mut state, chats);
    }
}
