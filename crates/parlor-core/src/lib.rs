//! # parlor-core
//!
//! The entity cache of a chat client: users, basic groups, channels and
//! secret chats, with their full-info extensions.
//!
//! [`Engine`] keeps one canonical in-memory record per entity, persists it
//! through the storage boundaries of `parlor-store`, reconciles it with the
//! backend's update stream and applies the user's own membership changes
//! speculatively until the backend confirms them. Collaborators learn about
//! changes through [`Event`]s.

pub mod backend;
pub mod clock;
pub mod coalescer;
pub mod commit;
pub mod config;
pub mod contacts_index;
pub mod entity_store;
pub mod error;
pub mod events;
pub mod records;
pub mod updates;

mod administrators;
mod engine;
mod full_info;
mod legacy;
mod persistence;
mod propagate;
mod query;
mod reconcile;
mod speculative;
mod timers;

pub use backend::{Administrator, Backend, OfflineBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::NetworkError;
pub use events::Event;
pub use reconcile::{classify_version, VersionCheck};
pub use speculative::{
    classify_status_change, plan_participant_steps, ParticipantAction, ParticipantStep,
    StatusClass,
};
pub use updates::Update;

pub use parlor_shared::{
    AdminRights, CacheError, ChannelId, ChatId, DialogId, ParticipantStatus, RestrictedRights,
    SecretChatId, UserId,
};
