use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_CHANNEL_ID, MAX_CHAT_ID, MAX_USER_ID};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident($inner:ty), $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
        )]
        pub struct $name(pub $inner);

        impl $name {
            pub fn get(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, " {}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of a user account. Never reused by the backend.
    UserId(i64),
    "user"
);
entity_id!(
    /// Identifier of a basic group.
    ChatId(i64),
    "chat"
);
entity_id!(
    /// Identifier of a supergroup or broadcast channel.
    ChannelId(i64),
    "channel"
);
entity_id!(
    /// Identifier of an end-to-end encrypted chat.
    SecretChatId(i32),
    "secret chat"
);

// Validity is a property of the number, not of whether we know the entity.

impl UserId {
    pub fn is_valid(self) -> bool {
        self.0 > 0 && self.0 <= MAX_USER_ID
    }
}

impl ChatId {
    pub fn is_valid(self) -> bool {
        self.0 > 0 && self.0 <= MAX_CHAT_ID
    }
}

impl ChannelId {
    pub fn is_valid(self) -> bool {
        self.0 > 0 && self.0 <= MAX_CHANNEL_ID
    }
}

impl SecretChatId {
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Any conversation the engine can describe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DialogId {
    User(UserId),
    Chat(ChatId),
    Channel(ChannelId),
    SecretChat(SecretChatId),
}

impl DialogId {
    pub fn is_valid(&self) -> bool {
        match self {
            DialogId::User(id) => id.is_valid(),
            DialogId::Chat(id) => id.is_valid(),
            DialogId::Channel(id) => id.is_valid(),
            DialogId::SecretChat(id) => id.is_valid(),
        }
    }

    /// Short, stable string used as a persistent-store key suffix.
    pub fn to_key(&self) -> String {
        match self {
            DialogId::User(id) => format!("u{}", id.0),
            DialogId::Chat(id) => format!("g{}", id.0),
            DialogId::Channel(id) => format!("c{}", id.0),
            DialogId::SecretChat(id) => format!("s{}", id.0),
        }
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogId::User(id) => fmt::Display::fmt(id, f),
            DialogId::Chat(id) => fmt::Display::fmt(id, f),
            DialogId::Channel(id) => fmt::Display::fmt(id, f),
            DialogId::SecretChat(id) => fmt::Display::fmt(id, f),
        }
    }
}

impl From<UserId> for DialogId {
    fn from(id: UserId) -> Self {
        DialogId::User(id)
    }
}

impl From<ChatId> for DialogId {
    fn from(id: ChatId) -> Self {
        DialogId::Chat(id)
    }
}

impl From<ChannelId> for DialogId {
    fn from(id: ChannelId) -> Self {
        DialogId::Channel(id)
    }
}

impl From<SecretChatId> for DialogId {
    fn from(id: SecretChatId) -> Self {
        DialogId::SecretChat(id)
    }
}
