//! `taskbot` — chat-driven personal task manager bot.
//!
//! Long-polls the Telegram Bot API and runs one conversation per chat.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/taskbot/config.toml`).
//!
//! ```bash
//! TASKBOT_TOKEN=123:abc cargo run --bin taskbot
//!
//! # Keep the message ledger in memory, snapshotted on shutdown
//! cargo run --bin taskbot -- --token 123:abc --ledger memory --ledger-snapshot ledger.bin
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskbot::config::{CliArgs, Config, LedgerKind};
use taskbot::dispatch::Dispatcher;
use taskbot::engine::Engine;
use taskbot::ledger::memory::InMemoryLedger;
use taskbot::ledger::sqlite::SqliteLedger;
use taskbot::ledger::{LedgerBackend, LedgerError};
use taskbot::store::sqlite::{Database, DatabaseError, SqliteTaskStore};
use taskbot::transport::TransportError;
use taskbot::transport::telegram::TelegramTransport;

/// Errors that prevent the bot from starting.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("failed to open database: {0}")]
    Database(#[from] DatabaseError),

    #[error("failed to load ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("bot api unreachable: {0}")]
    Transport(#[from] TransportError),
}

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "taskbot failed");
        std::process::exit(1);
    }
}

/// Initialize logging to stderr, or to `file_path` when given.
///
/// Returns a [`WorkerGuard`] for file logging that must be held until
/// shutdown to ensure all buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some((log_dir, file_name)) = file_path.and_then(|p| Some((p.parent()?, p.file_name()?)))
    else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(config: Config) -> Result<(), StartupError> {
    let db = Database::open(&config.database_path)?;
    let store = Arc::new(SqliteTaskStore::new(db.clone()));

    let ledger = Arc::new(match config.ledger {
        LedgerKind::Sqlite => {
            LedgerBackend::Sqlite(SqliteLedger::with_max_len(db, config.max_ledger_len))
        }
        LedgerKind::Memory => LedgerBackend::Memory(
            InMemoryLedger::load_from(&config.ledger_snapshot_path, config.max_ledger_len)
                .await?,
        ),
    });

    let transport = TelegramTransport::new(config.telegram_options())?;
    let username = transport.get_me().await?;
    tracing::info!(
        bot = %username,
        database = %config.database_path.display(),
        ledger = ?config.ledger,
        "taskbot starting"
    );

    let engine = Arc::new(Engine::new(
        Arc::new(transport),
        store,
        Arc::clone(&ledger),
        config.engine_config(),
    ));
    Dispatcher::new(engine, config.dispatch_config())
        .run(shutdown_signal())
        .await;

    if let LedgerBackend::Memory(memory) = ledger.as_ref() {
        if let Err(e) = memory.save_to(&config.ledger_snapshot_path).await {
            tracing::error!(error = %e, "failed to save ledger snapshot");
        }
    }

    tracing::info!("taskbot exiting");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c, running until the transport closes");
        std::future::pending::<()>().await;
    }
}
