//! Engine configuration loaded from environment variables.
//!
//! All settings have sensible defaults so an engine can be built with zero
//! configuration in tests.

use std::time::Duration;

use parlor_shared::constants::{
    CHANNEL_FULL_EXPIRE_SECS, DEFAULT_GET_TRIES, SETTLE_DELAY_MS, USER_FULL_EXPIRE_SECS,
};
use parlor_shared::UserId;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The account this engine runs for. Needed to recognise changes to our
    /// own membership.
    /// Env: `PARLOR_MY_USER_ID`
    pub my_user_id: UserId,

    /// Whether records are loaded from and saved to the persistent store.
    /// Env: `PARLOR_USE_DATABASE` (true/false)
    /// Default: `true`
    pub use_database: bool,

    /// Bot sessions wait for fresh full info instead of accepting a stale
    /// copy.
    /// Env: `PARLOR_IS_BOT` (true/false)
    /// Default: `false`
    pub is_bot: bool,

    /// Lifetime of user full info.
    /// Env: `PARLOR_USER_FULL_TTL_SECS`
    /// Default: 60 s
    pub user_full_ttl: Duration,

    /// Lifetime of channel full info.
    /// Env: `PARLOR_CHANNEL_FULL_TTL_SECS`
    /// Default: 60 s
    pub channel_full_ttl: Duration,

    /// Pause between chained backend calls (add then restrict, ban then
    /// unban).
    /// Env: `PARLOR_SETTLE_DELAY_MS`
    /// Default: 1000 ms
    pub settle_delay: Duration,

    /// Fallback tries used by the public getters: memory, then disk, then
    /// network.
    /// Env: `PARLOR_GET_TRIES`
    /// Default: 3
    pub default_get_tries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            my_user_id: UserId::default(),
            use_database: true,
            is_bot: false,
            user_full_ttl: Duration::from_secs(USER_FULL_EXPIRE_SECS as u64),
            channel_full_ttl: Duration::from_secs(CHANNEL_FULL_EXPIRE_SECS as u64),
            settle_delay: Duration::from_millis(SETTLE_DELAY_MS),
            default_get_tries: DEFAULT_GET_TRIES,
        }
    }
}

impl EngineConfig {
    pub fn new(my_user_id: UserId) -> Self {
        Self {
            my_user_id,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(id) = parse_var::<i64>("PARLOR_MY_USER_ID") {
            config.my_user_id = UserId(id);
        }

        if let Ok(val) = std::env::var("PARLOR_USE_DATABASE") {
            config.use_database = val != "false" && val != "0";
        }

        if let Ok(val) = std::env::var("PARLOR_IS_BOT") {
            config.is_bot = val == "true" || val == "1";
        }

        if let Some(secs) = parse_var::<u64>("PARLOR_USER_FULL_TTL_SECS") {
            config.user_full_ttl = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_var::<u64>("PARLOR_CHANNEL_FULL_TTL_SECS") {
            config.channel_full_ttl = Duration::from_secs(secs);
        }

        if let Some(ms) = parse_var::<u64>("PARLOR_SETTLE_DELAY_MS") {
            config.settle_delay = Duration::from_millis(ms);
        }

        if let Some(tries) = parse_var::<u32>("PARLOR_GET_TRIES") {
            config.default_get_tries = tries;
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(var = name, value = %value, "Invalid value, using default");
            None
        }
    }
}
