//! The engine handle and the state it owns.
//!
//! Every record lives in one [`EngineState`] behind a mutex that is never
//! held across an `.await`: a logical update is applied and committed in
//! one critical section, and all suspension happens outside it. The
//! operations themselves are spread over the sibling modules as further
//! `impl Engine` blocks.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use parlor_shared::{CacheError, ChannelId, ChatId, DialogId, SecretChatId, UserId};
use parlor_store::{KeyValueStore, WriteAheadLog};

use crate::backend::{Administrator, Backend};
use crate::clock::Clock;
use crate::coalescer::QueryCoalescer;
use crate::config::EngineConfig;
use crate::contacts_index::ContactsIndex;
use crate::entity_store::EntityStore;
use crate::events::{Event, EventSink};
use crate::records::{
    Channel, ChannelFull, Chat, ChatFull, Photo, SecretChat, User, UserFull,
};
use crate::speculative::StatusClass;

/// Everything mutable. Only touched while holding [`Inner::state`].
#[derive(Default)]
pub(crate) struct EngineState {
    pub records: EntityStore,
    /// Storage keys a load was already issued for.
    pub attempted_loads: HashSet<String>,
    /// Own speculative effects not yet confirmed by the update stream,
    /// by dialog and participant.
    pub pending_effects: HashMap<(DialogId, UserId), Vec<StatusClass>>,
    pub administrators: HashMap<DialogId, Vec<Administrator>>,
    /// Administrator lists being written, with whether another write is
    /// due once the current one lands.
    pub administrator_saves: HashMap<DialogId, bool>,
    /// `None` until fetched, and again after it became stale.
    pub administered_channels: Option<Vec<ChannelId>>,
    pub contacts: ContactsIndex,
    pub user_photos: HashMap<UserId, Vec<Photo>>,
    pub secret_chats_by_user: HashMap<UserId, Vec<SecretChatId>>,
    pub restriction_timers: HashMap<ChannelId, AbortHandle>,
}

pub(crate) struct Inner {
    pub config: EngineConfig,
    pub backend: Arc<dyn Backend>,
    pub store: Arc<dyn KeyValueStore>,
    pub log: Arc<dyn WriteAheadLog>,
    pub clock: Arc<dyn Clock>,
    pub events: EventSink,
    pub state: Mutex<EngineState>,
    /// Keyed-store reads, by storage key.
    pub loads: QueryCoalescer<String, ()>,
    /// Network fetches of full records.
    pub full_fetches: QueryCoalescer<DialogId, Result<(), CacheError>>,
}

/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<Inner>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn Backend>,
        store: Arc<dyn KeyValueStore>,
        log: Arc<dyn WriteAheadLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        tracing::debug!(
            my_user_id = %config.my_user_id,
            use_database = config.use_database,
            is_bot = config.is_bot,
            "Creating engine"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                backend,
                store,
                log,
                clock,
                events: EventSink::default(),
                state: Mutex::new(EngineState::default()),
                loads: QueryCoalescer::new(),
                full_fetches: QueryCoalescer::new(),
            }),
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: Event) {
        self.inner.events.emit(event);
    }

    pub(crate) fn my_user_id(&self) -> UserId {
        self.inner.config.my_user_id
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn user(&self, user_id: UserId) -> Option<User> {
        self.state().records.get::<User>(user_id).cloned()
    }

    pub fn user_full(&self, user_id: UserId) -> Option<UserFull> {
        self.state().records.get::<UserFull>(user_id).cloned()
    }

    pub fn chat(&self, chat_id: ChatId) -> Option<Chat> {
        self.state().records.get::<Chat>(chat_id).cloned()
    }

    pub fn chat_full(&self, chat_id: ChatId) -> Option<ChatFull> {
        self.state().records.get::<ChatFull>(chat_id).cloned()
    }

    pub fn channel(&self, channel_id: ChannelId) -> Option<Channel> {
        self.state().records.get::<Channel>(channel_id).cloned()
    }

    pub fn channel_full(&self, channel_id: ChannelId) -> Option<ChannelFull> {
        self.state().records.get::<ChannelFull>(channel_id).cloned()
    }

    pub fn secret_chat(&self, secret_chat_id: SecretChatId) -> Option<SecretChat> {
        self.state().records.get::<SecretChat>(secret_chat_id).cloned()
    }

    /// Known administrators of a group-like dialog, if loaded.
    pub fn administrators(&self, dialog_id: DialogId) -> Option<Vec<Administrator>> {
        self.state().administrators.get(&dialog_id).cloned()
    }

    pub fn user_photos(&self, user_id: UserId) -> Option<Vec<Photo>> {
        self.state().user_photos.get(&user_id).cloned()
    }

    /// Remember profile photos fetched by the caller. Dropped as soon as the
    /// user's current photo changes.
    pub fn set_user_photos(&self, user_id: UserId, photos: Vec<Photo>) {
        self.state().user_photos.insert(user_id, photos);
    }

    pub fn search_contacts(&self, query: &str, limit: usize) -> Vec<UserId> {
        self.state().contacts.search(query, limit)
    }

    /// Whether the dialog can be read, answered from cached records only.
    pub fn have_dialog_access(&self, dialog_id: DialogId) -> bool {
        let state = self.state();
        match dialog_id {
            DialogId::User(user_id) => state.records.contains::<User>(user_id),
            DialogId::Chat(chat_id) => state
                .records
                .get::<Chat>(chat_id)
                .is_some_and(Chat::is_accessible),
            DialogId::Channel(channel_id) => state
                .records
                .get::<Channel>(channel_id)
                .is_some_and(Channel::is_accessible),
            DialogId::SecretChat(secret_chat_id) => state
                .records
                .get::<SecretChat>(secret_chat_id)
                .is_some_and(SecretChat::is_accessible),
        }
    }
}
