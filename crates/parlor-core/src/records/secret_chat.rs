use serde::{Deserialize, Serialize};

use parlor_shared::constants::SECRET_CHAT_CACHE_VERSION;
use parlor_shared::UserId;

use super::RecordMeta;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretChatState {
    #[default]
    Waiting,
    Active,
    Closed,
}

/// An end-to-end encrypted one-to-one chat. Its title and photo are those
/// of the peer user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretChat {
    pub access_hash: i64,
    pub user_id: UserId,
    pub state: SecretChatState,
    pub is_outbound: bool,
    /// Self-destruct timer in seconds.
    pub ttl: i32,
    pub date: i32,
    pub layer: i32,
    pub cache_version: u32,

    #[serde(skip)]
    pub meta: RecordMeta,
}

impl Default for SecretChat {
    fn default() -> Self {
        Self {
            access_hash: 0,
            user_id: UserId::default(),
            state: SecretChatState::Waiting,
            is_outbound: false,
            ttl: 0,
            date: 0,
            layer: 0,
            cache_version: SECRET_CHAT_CACHE_VERSION,
            meta: RecordMeta::default(),
        }
    }
}

impl SecretChat {
    pub fn is_accessible(&self) -> bool {
        self.state != SecretChatState::Closed
    }

    pub fn set_state(&mut self, state: SecretChatState) {
        if self.state != state {
            self.state = state;
            self.meta.is_changed = true;
        }
    }
}
