//! # parlor
//!
//! Offline inspection of a parlor entity cache.
//!
//! Opens the SQLite database that backs the cache, replays any write-ahead
//! log entries left by a crashed session and prints cached records. No
//! network backend is attached: everything shown comes from disk.

mod report;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use parlor_core::{Engine, EngineConfig, OfflineBackend, SystemClock};
use parlor_shared::{ChannelId, ChatId, DialogId, SecretChatId, UserId};
use parlor_store::{Database, SqliteStore};

#[derive(Debug, Parser)]
#[command(name = "parlor", version, about = "Inspect a parlor entity cache")]
struct Cli {
    /// Database file. Defaults to the platform data directory.
    #[arg(long, env = "PARLOR_DB_PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Re-apply pending write-ahead log entries and wait until they are saved.
    Replay,
    /// Count stored records per family.
    Stats,
    /// Print a cached record, e.g. `user:5`, `chat:10`, `channel:30`, `secret:7`.
    Show {
        #[arg(value_parser = parse_dialog)]
        dialog: DialogId,
        /// Include the cached full info.
        #[arg(long)]
        full: bool,
        #[arg(long)]
        json: bool,
    },
    /// Print the cached administrators of a basic group or channel.
    Admins {
        #[arg(value_parser = parse_dialog)]
        dialog: DialogId,
    },
}

fn parse_dialog(value: &str) -> Result<DialogId, String> {
    let (kind, id) = value
        .split_once(':')
        .ok_or_else(|| format!("expected <kind>:<id>, got `{value}`"))?;
    let invalid = |_| format!("invalid id `{id}`");
    let dialog_id = match kind {
        "user" => DialogId::User(UserId(id.parse().map_err(invalid)?)),
        "chat" => DialogId::Chat(ChatId(id.parse().map_err(invalid)?)),
        "channel" => DialogId::Channel(ChannelId(id.parse().map_err(invalid)?)),
        "secret" => DialogId::SecretChat(SecretChatId(id.parse().map_err(invalid)?)),
        other => return Err(format!("unknown dialog kind `{other}`")),
    };
    if !dialog_id.is_valid() {
        return Err(format!("{dialog_id} is not a valid id"));
    }
    Ok(dialog_id)
}

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parlor_core=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Open the cache
    // -----------------------------------------------------------------------
    let path = match cli.db {
        Some(path) => path,
        None => Database::default_path()?,
    };
    if !path.exists() {
        bail!("no cache at {}", path.display());
    }
    let store = Arc::new(
        SqliteStore::open_at(&path)
            .with_context(|| format!("failed to open {}", path.display()))?,
    );

    let config = EngineConfig::from_env();
    info!(?config, path = %path.display(), "Opening entity cache");
    let engine = Engine::new(
        config,
        Arc::new(OfflineBackend),
        store.clone(),
        store.clone(),
        Arc::new(SystemClock),
    );

    // -----------------------------------------------------------------------
    // 3. Recover, then run the command
    // -----------------------------------------------------------------------
    let replayed = engine.replay_log()?;

    match cli.command {
        Command::Replay => {
            engine.flush().await;
            println!("replayed {replayed} log entries");
        }
        Command::Stats => {
            engine.flush().await;
            let (schema, counts) = store.with_database(|db| {
                Ok::<_, parlor_store::StoreError>((db.schema_version()?, report::record_counts(db)?))
            })?;
            println!("schema version {schema}");
            for (family, count) in counts {
                println!("{family:<16} {count}");
            }
        }
        Command::Show { dialog, full, json } => {
            report::show(&engine, dialog, full, json).await?;
        }
        Command::Admins { dialog } => {
            let administrators = engine
                .get_dialog_administrators(dialog)
                .await
                .with_context(|| format!("no administrators cached for {dialog}"))?;
            for administrator in administrators {
                println!("{}", report::administrator_line(&administrator));
            }
        }
    }

    engine.flush().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dialog() {
        assert_eq!(parse_dialog("user:5"), Ok(DialogId::User(UserId(5))));
        assert_eq!(parse_dialog("chat:10"), Ok(DialogId::Chat(ChatId(10))));
        assert_eq!(
            parse_dialog("channel:30"),
            Ok(DialogId::Channel(ChannelId(30)))
        );
        assert_eq!(
            parse_dialog("secret:7"),
            Ok(DialogId::SecretChat(SecretChatId(7)))
        );
    }

    #[test]
    fn test_parse_dialog_rejects_garbage() {
        assert!(parse_dialog("user").is_err());
        assert!(parse_dialog("user:abc").is_err());
        assert!(parse_dialog("group:5").is_err());
        assert!(parse_dialog("user:0").is_err());
    }

    #[test]
    fn test_cli_parses_show() {
        let cli = Cli::try_parse_from(["parlor", "--db", "/tmp/x.db", "show", "channel:3", "--full"])
            .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        match cli.command {
            Command::Show { dialog, full, json } => {
                assert_eq!(dialog, DialogId::Channel(ChannelId(3)));
                assert!(full);
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
