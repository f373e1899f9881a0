//! Human-readable and JSON rendering of cached records.

use anyhow::{Context, Result};
use serde_json::{json, Value};

use parlor_core::records::{Channel, Chat, SecretChat, User};
use parlor_core::{Administrator, Engine};
use parlor_shared::constants::*;
use parlor_shared::{DialogId, ParticipantStatus};
use parlor_store::Database;

const FAMILIES: [(&str, &str); 8] = [
    ("users", KEY_PREFIX_USER),
    ("user full", KEY_PREFIX_USER_FULL),
    ("basic groups", KEY_PREFIX_CHAT),
    ("group full", KEY_PREFIX_CHAT_FULL),
    ("channels", KEY_PREFIX_CHANNEL),
    ("channel full", KEY_PREFIX_CHANNEL_FULL),
    ("secret chats", KEY_PREFIX_SECRET_CHAT),
    ("admin lists", KEY_PREFIX_ADMINISTRATORS),
];

/// Stored keys per family, plus the total. Prefixes overlap (`us` / `usf`),
/// so a key only counts for a family when the rest of it is the id.
pub fn record_counts(db: &Database) -> parlor_store::Result<Vec<(&'static str, usize)>> {
    let mut counts = Vec::with_capacity(FAMILIES.len() + 1);
    for (family, prefix) in FAMILIES {
        let count = db
            .keys_with_prefix(prefix)?
            .iter()
            .filter(|key| is_family_key(key, prefix))
            .count();
        counts.push((family, count));
    }
    counts.push(("total", db.count_values()?));
    Ok(counts)
}

fn is_family_key(key: &str, prefix: &str) -> bool {
    let Some(rest) = key.strip_prefix(prefix) else {
        return false;
    };
    if prefix == KEY_PREFIX_ADMINISTRATORS {
        return !rest.is_empty();
    }
    rest.parse::<i64>().is_ok()
}

pub async fn show(engine: &Engine, dialog_id: DialogId, full: bool, as_json: bool) -> Result<()> {
    let (summary, record) = match dialog_id {
        DialogId::User(user_id) => {
            let user = engine.get_user(user_id).await.context(cache_miss(dialog_id))?;
            (user_line(&user), serde_json::to_value(&user)?)
        }
        DialogId::Chat(chat_id) => {
            let chat = engine.get_chat(chat_id).await.context(cache_miss(dialog_id))?;
            (chat_line(&chat), serde_json::to_value(&chat)?)
        }
        DialogId::Channel(channel_id) => {
            let channel = engine
                .get_channel(channel_id)
                .await
                .context(cache_miss(dialog_id))?;
            (channel_line(&channel), serde_json::to_value(&channel)?)
        }
        DialogId::SecretChat(secret_chat_id) => {
            let secret_chat = engine
                .get_secret_chat(secret_chat_id)
                .await
                .context(cache_miss(dialog_id))?;
            (secret_chat_line(&secret_chat), serde_json::to_value(&secret_chat)?)
        }
    };

    let full_info = if full {
        Some(full_value(engine, dialog_id).await?)
    } else {
        None
    };

    if as_json {
        let mut out = json!({ "dialog": dialog_id.to_key(), "record": record });
        if let Some(full_info) = full_info {
            out["full"] = full_info;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{dialog_id}: {summary}");
    if let Some(full_info) = full_info {
        println!("{}", serde_json::to_string_pretty(&full_info)?);
    }
    Ok(())
}

async fn full_value(engine: &Engine, dialog_id: DialogId) -> Result<Value> {
    let value = match dialog_id {
        DialogId::User(user_id) => serde_json::to_value(
            engine
                .get_user_full(user_id)
                .await
                .context(cache_miss(dialog_id))?,
        )?,
        DialogId::Chat(chat_id) => serde_json::to_value(
            engine
                .get_chat_full(chat_id)
                .await
                .context(cache_miss(dialog_id))?,
        )?,
        DialogId::Channel(channel_id) => serde_json::to_value(
            engine
                .get_channel_full(channel_id)
                .await
                .context(cache_miss(dialog_id))?,
        )?,
        DialogId::SecretChat(_) => Value::Null,
    };
    Ok(value)
}

fn cache_miss(dialog_id: DialogId) -> String {
    format!("{dialog_id} is not in the cache")
}

fn status_label(status: &ParticipantStatus) -> &'static str {
    match status {
        ParticipantStatus::Creator { .. } => "creator",
        ParticipantStatus::Administrator { .. } => "administrator",
        ParticipantStatus::Member => "member",
        ParticipantStatus::Restricted { .. } => "restricted",
        ParticipantStatus::Left => "left",
        ParticipantStatus::Banned { .. } => "banned",
    }
}

fn user_line(user: &User) -> String {
    let mut line = user.full_name();
    if !user.username.is_empty() {
        line.push_str(&format!(" (@{})", user.username));
    }
    if user.is_bot {
        line.push_str(" [bot]");
    }
    if user.is_contact {
        line.push_str(if user.is_mutual_contact {
            " [mutual contact]"
        } else {
            " [contact]"
        });
    }
    line
}

fn chat_line(chat: &Chat) -> String {
    format!(
        "\"{}\", {} members, version {}, {}",
        chat.title,
        chat.participant_count,
        chat.version,
        status_label(&chat.status)
    )
}

fn channel_line(channel: &Channel) -> String {
    let kind = if channel.is_megagroup {
        "supergroup"
    } else {
        "broadcast"
    };
    format!(
        "\"{}\" ({kind}), {} members, {}",
        channel.title,
        channel.participant_count,
        status_label(&channel.status)
    )
}

fn secret_chat_line(secret_chat: &SecretChat) -> String {
    format!(
        "with {}, {:?}, layer {}",
        secret_chat.user_id, secret_chat.state, secret_chat.layer
    )
}

pub fn administrator_line(administrator: &Administrator) -> String {
    let role = if administrator.is_creator {
        "creator"
    } else {
        "administrator"
    };
    if administrator.rank.is_empty() {
        format!("{} {role}", administrator.user_id)
    } else {
        format!("{} {role} \"{}\"", administrator.user_id, administrator.rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_shared::UserId;

    #[test]
    fn test_user_line() {
        let user = User {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            username: "ada".into(),
            is_contact: true,
            ..User::default()
        };
        assert_eq!(user_line(&user), "Ada Lovelace (@ada) [contact]");
    }

    #[test]
    fn test_overlapping_prefixes_are_told_apart() {
        assert!(is_family_key("us5", KEY_PREFIX_USER));
        assert!(!is_family_key("usf5", KEY_PREFIX_USER));
        assert!(is_family_key("usf5", KEY_PREFIX_USER_FULL));
        assert!(!is_family_key("chf30", KEY_PREFIX_CHANNEL));
        assert!(is_family_key("admc30", KEY_PREFIX_ADMINISTRATORS));
    }

    #[test]
    fn test_record_counts() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("stats.db")).unwrap();
        db.set_value("us1", b"a").unwrap();
        db.set_value("us2", b"b").unwrap();
        db.set_value("usf1", b"c").unwrap();
        db.set_value("ch30", b"d").unwrap();

        let counts = record_counts(&db).unwrap();
        assert!(counts.contains(&("users", 2)));
        assert!(counts.contains(&("user full", 1)));
        assert!(counts.contains(&("channels", 1)));
        assert!(counts.contains(&("secret chats", 0)));
        assert_eq!(counts.last(), Some(&("total", 4)));
    }

    #[test]
    fn test_administrator_line() {
        let administrator = Administrator {
            user_id: UserId(7),
            rank: "owner".into(),
            is_creator: true,
        };
        assert_eq!(administrator_line(&administrator), "user 7 creator \"owner\"");
    }
}
