//! # parlor-shared
//!
//! Types shared by every parlor crate: entity identifiers, participant
//! statuses, constants, the record codec and the public error taxonomy.

pub mod codec;
pub mod constants;
pub mod error;
pub mod status;
pub mod types;

pub use error::CacheError;
pub use status::{AdminRights, ParticipantStatus, RestrictedRights};
pub use types::{ChannelId, ChatId, DialogId, SecretChatId, UserId};
