#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use parlor_core::backend::{
    ChannelData, ChatData, RemoteChannelFull, RemoteChat, RemoteChatFull, RemoteUser,
    RemoteUserFull, UserData,
};
use parlor_core::records::ChatParticipant;
use parlor_core::{
    Administrator, Backend, ChannelId, ChatId, Engine, EngineConfig, ManualClock, NetworkError,
    ParticipantStatus, UserId,
};
use parlor_store::{MemoryLog, MemoryStore};

pub const ME: UserId = UserId(1);

/// A backend answering from fixed tables and counting every call.
#[derive(Default)]
pub struct ScriptedBackend {
    pub users: Mutex<HashMap<UserId, UserData>>,
    pub chats: Mutex<HashMap<ChatId, ChatData>>,
    pub channels: Mutex<HashMap<ChannelId, ChannelData>>,
    pub chat_fulls: Mutex<HashMap<ChatId, RemoteChatFull>>,
    pub channel_fulls: Mutex<HashMap<ChannelId, RemoteChannelFull>>,
    pub participants: Mutex<HashMap<(ChannelId, UserId), ParticipantStatus>>,
    /// Mutating calls, in order, with the status they asked for.
    pub mutations: Mutex<Vec<(&'static str, Option<ParticipantStatus>)>>,
    pub reject_mutations: AtomicBool,
    pub fetch_delay: Mutex<Duration>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl ScriptedBackend {
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub fn add_user(&self, data: UserData) {
        self.users.lock().unwrap().insert(data.id, data);
    }

    pub fn set_channel_full(&self, full: RemoteChannelFull) {
        self.channel_fulls
            .lock()
            .unwrap()
            .insert(full.channel_id, full);
    }

    pub fn set_chat_full(&self, full: RemoteChatFull) {
        self.chat_fulls.lock().unwrap().insert(full.chat_id, full);
    }

    fn count(&self, method: &'static str) {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
    }

    async fn delay(&self) {
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn mutate(
        &self,
        method: &'static str,
        status: Option<ParticipantStatus>,
    ) -> Result<(), NetworkError> {
        self.count(method);
        if self.reject_mutations.load(Ordering::SeqCst) {
            return Err(NetworkError::Forbidden("CHAT_ADMIN_REQUIRED".into()));
        }
        self.mutations.lock().unwrap().push((method, status));
        Ok(())
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn get_users(&self, user_ids: Vec<UserId>) -> Result<Vec<RemoteUser>, NetworkError> {
        self.count("get_users");
        let users = self.users.lock().unwrap();
        Ok(user_ids
            .into_iter()
            .map(|id| match users.get(&id) {
                Some(data) => RemoteUser::User(data.clone()),
                None => RemoteUser::Empty(id),
            })
            .collect())
    }

    async fn get_full_user(&self, user_id: UserId) -> Result<RemoteUserFull, NetworkError> {
        self.count("get_full_user");
        self.delay().await;
        let data = self
            .users
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .ok_or(NetworkError::NotFound)?;
        Ok(RemoteUserFull {
            user: RemoteUser::User(data),
            about: "about".into(),
            is_blocked: false,
            can_be_called: true,
            common_chat_count: 2,
        })
    }

    async fn get_chats(&self, chat_ids: Vec<ChatId>) -> Result<Vec<RemoteChat>, NetworkError> {
        self.count("get_chats");
        let chats = self.chats.lock().unwrap();
        Ok(chat_ids
            .into_iter()
            .map(|id| match chats.get(&id) {
                Some(data) => RemoteChat::Chat(data.clone()),
                None => RemoteChat::Empty(id),
            })
            .collect())
    }

    async fn get_full_chat(&self, chat_id: ChatId) -> Result<RemoteChatFull, NetworkError> {
        self.count("get_full_chat");
        self.delay().await;
        self.chat_fulls
            .lock()
            .unwrap()
            .get(&chat_id)
            .cloned()
            .ok_or(NetworkError::NotFound)
    }

    async fn get_channels(
        &self,
        channel_ids: Vec<ChannelId>,
    ) -> Result<Vec<RemoteChat>, NetworkError> {
        self.count("get_channels");
        let channels = self.channels.lock().unwrap();
        Ok(channel_ids
            .into_iter()
            .filter_map(|id| channels.get(&id).cloned().map(RemoteChat::Channel))
            .collect())
    }

    async fn get_full_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<RemoteChannelFull, NetworkError> {
        self.count("get_full_channel");
        self.delay().await;
        self.channel_fulls
            .lock()
            .unwrap()
            .get(&channel_id)
            .cloned()
            .ok_or(NetworkError::NotFound)
    }

    async fn get_channel_administrators(
        &self,
        _channel_id: ChannelId,
    ) -> Result<Vec<Administrator>, NetworkError> {
        self.count("get_channel_administrators");
        Ok(vec![Administrator {
            user_id: ME,
            rank: String::new(),
            is_creator: true,
        }])
    }

    async fn get_channel_participant(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> Result<ParticipantStatus, NetworkError> {
        self.count("get_channel_participant");
        Ok(self
            .participants
            .lock()
            .unwrap()
            .get(&(channel_id, user_id))
            .cloned()
            .unwrap_or(ParticipantStatus::Left))
    }

    async fn get_administered_public_channels(&self) -> Result<Vec<RemoteChat>, NetworkError> {
        self.count("get_administered_public_channels");
        Ok(self
            .channels
            .lock()
            .unwrap()
            .values()
            .cloned()
            .map(RemoteChat::Channel)
            .collect())
    }

    async fn add_chat_user(&self, _: ChatId, _: UserId) -> Result<(), NetworkError> {
        self.mutate("add_chat_user", None)
    }

    async fn edit_chat_admin(&self, _: ChatId, _: UserId, _: bool) -> Result<(), NetworkError> {
        self.mutate("edit_chat_admin", None)
    }

    async fn delete_chat_user(&self, _: ChatId, _: UserId) -> Result<(), NetworkError> {
        self.mutate("delete_chat_user", None)
    }

    async fn invite_to_channel(&self, _: ChannelId, _: UserId) -> Result<(), NetworkError> {
        self.mutate("invite_to_channel", None)
    }

    async fn edit_channel_admin(
        &self,
        _: ChannelId,
        _: UserId,
        status: ParticipantStatus,
    ) -> Result<(), NetworkError> {
        self.mutate("edit_channel_admin", Some(status))
    }

    async fn edit_channel_banned(
        &self,
        _: ChannelId,
        _: UserId,
        status: ParticipantStatus,
    ) -> Result<(), NetworkError> {
        self.mutate("edit_channel_banned", Some(status))
    }
}

pub struct Harness {
    pub engine: Engine,
    pub backend: Arc<ScriptedBackend>,
    pub store: Arc<MemoryStore>,
    pub log: Arc<MemoryLog>,
    pub clock: Arc<ManualClock>,
}

pub fn config() -> EngineConfig {
    EngineConfig {
        settle_delay: Duration::from_millis(10),
        ..EngineConfig::new(ME)
    }
}

pub fn harness_with(config: EngineConfig) -> Harness {
    let backend = Arc::new(ScriptedBackend::default());
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryLog::new());
    let clock = Arc::new(ManualClock::default());
    let engine = Engine::new(
        config,
        backend.clone(),
        store.clone(),
        log.clone(),
        clock.clone(),
    );
    Harness {
        engine,
        backend,
        store,
        log,
        clock,
    }
}

pub fn harness() -> Harness {
    harness_with(config())
}

/// Let spawned saves, refetches and timers run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

pub fn user_data(id: i64, first_name: &str) -> UserData {
    UserData {
        id: UserId(id),
        access_hash: Some(id * 100),
        first_name: first_name.into(),
        ..UserData::default()
    }
}

pub fn chat_data(id: i64, version: i32, participant_count: i32) -> ChatData {
    ChatData {
        id: ChatId(id),
        title: format!("group {id}"),
        participant_count,
        version,
        status: ParticipantStatus::Member,
        is_active: true,
        ..ChatData::default()
    }
}

pub fn channel_data(id: i64, status: ParticipantStatus, participant_count: i32) -> ChannelData {
    ChannelData {
        id: ChannelId(id),
        access_hash: id * 7,
        title: format!("channel {id}"),
        status,
        participant_count,
        is_megagroup: true,
        ..ChannelData::default()
    }
}

pub fn channel_full(id: i64, participant_count: i32) -> RemoteChannelFull {
    RemoteChannelFull {
        channel_id: ChannelId(id),
        participant_count,
        administrator_count: 1,
        can_get_participants: true,
        ..RemoteChannelFull::default()
    }
}

pub fn members(ids: impl IntoIterator<Item = i64>) -> Vec<ChatParticipant> {
    ids.into_iter()
        .map(|id| ChatParticipant {
            user_id: UserId(id),
            inviter_user_id: ME,
            joined_date: 0,
            status: ParticipantStatus::Member,
        })
        .collect()
}
