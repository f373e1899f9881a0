/// Largest identifier the backend assigns to users.
pub const MAX_USER_ID: i64 = (1 << 40) - 1;

/// Largest identifier the backend assigns to basic groups.
pub const MAX_CHAT_ID: i64 = 999_999_999_999;

/// Largest identifier the backend assigns to channels.
pub const MAX_CHANNEL_ID: i64 = 1_000_000_000_000 - (1 << 31);

/// Default lifetime of a user full-info record, in seconds.
pub const USER_FULL_EXPIRE_SECS: i64 = 60;

/// Default lifetime of a channel full-info record, in seconds.
pub const CHANNEL_FULL_EXPIRE_SECS: i64 = 60;

/// Delay between two chained backend calls that must not race each other
/// (add-then-restrict, ban-then-unban), in milliseconds.
pub const SETTLE_DELAY_MS: u64 = 1_000;

/// Default number of memory -> disk -> network fallback tries.
pub const DEFAULT_GET_TRIES: u32 = 3;

/// Persisted layout versions. A record stored with a smaller version is
/// refetched once after it is loaded.
pub const USER_CACHE_VERSION: u32 = 4;
pub const CHAT_CACHE_VERSION: u32 = 3;
pub const CHANNEL_CACHE_VERSION: u32 = 8;
pub const SECRET_CHAT_CACHE_VERSION: u32 = 1;

/// Leading byte of every persisted record.
pub const FORMAT_TAG_LEGACY: u8 = 1;
pub const FORMAT_TAG_CURRENT: u8 = 2;

/// Persistent-store key prefixes.
pub const KEY_PREFIX_USER: &str = "us";
pub const KEY_PREFIX_USER_FULL: &str = "usf";
pub const KEY_PREFIX_CHAT: &str = "gr";
pub const KEY_PREFIX_CHAT_FULL: &str = "grf";
pub const KEY_PREFIX_CHANNEL: &str = "ch";
pub const KEY_PREFIX_CHANNEL_FULL: &str = "chf";
pub const KEY_PREFIX_SECRET_CHAT: &str = "sc";
pub const KEY_PREFIX_ADMINISTRATORS: &str = "adm";

/// Write-ahead-log entry kinds.
pub const LOG_EVENT_USER: u32 = 1;
pub const LOG_EVENT_CHAT: u32 = 2;
pub const LOG_EVENT_CHANNEL: u32 = 3;
pub const LOG_EVENT_SECRET_CHAT: u32 = 4;
