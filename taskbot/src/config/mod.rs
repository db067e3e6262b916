//! Configuration for the `taskbot` binary.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskbot/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dispatch::{DEFAULT_WORKER_BUFFER, DEFAULT_WORKER_IDLE, DispatchConfig};
use crate::engine::{DEFAULT_OPERATION_TIMEOUT, EngineConfig};
use crate::ledger::memory::DEFAULT_MAX_LEDGER_LEN;
use crate::transport::telegram::TelegramOptions;

/// Official Bot API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The Bot API base URL is not an HTTP(S) URL.
    #[error("invalid api_base_url {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No bot token was given on the command line, environment or file.
    #[error("bot token missing (use --token, TASKBOT_TOKEN or [telegram].token)")]
    MissingToken,

    /// A timeout setting can never succeed.
    #[error("invalid {field}: {reason}")]
    InvalidTimeout {
        /// The offending setting.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    telegram: TelegramFileConfig,
    storage: StorageFileConfig,
    engine: EngineFileConfig,
}

/// `[telegram]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TelegramFileConfig {
    token: Option<String>,
    api_base_url: Option<String>,
    poll_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// `[storage]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    database_path: Option<PathBuf>,
    ledger: Option<LedgerKind>,
    ledger_snapshot_path: Option<PathBuf>,
    max_ledger_len: Option<usize>,
}

/// `[engine]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct EngineFileConfig {
    operation_timeout_secs: Option<u64>,
    sweep_user_messages: Option<bool>,
    worker_buffer: Option<usize>,
    worker_idle_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Where the message ledger lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    /// `ledger` table in the bot database; survives restarts.
    #[default]
    Sqlite,
    /// In-process queues, saved to a snapshot file on shutdown.
    Memory,
}

/// Bot token; never printed in full.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BotToken(String);

impl BotToken {
    /// Wrap a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building API URLs.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BotToken(***)")
    }
}

/// Fully resolved bot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // -- Telegram --
    /// Bot API token.
    pub token: BotToken,
    /// Bot API root URL, without trailing slash.
    pub api_base_url: String,
    /// Long-poll timeout for `getUpdates`.
    pub poll_timeout: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,

    // -- Storage --
    /// SQLite database holding tasks, states and (optionally) the ledger.
    pub database_path: PathBuf,
    /// Ledger backend.
    pub ledger: LedgerKind,
    /// Snapshot file of the in-memory ledger.
    pub ledger_snapshot_path: PathBuf,
    /// Maximum pending handles kept per chat.
    pub max_ledger_len: usize,

    // -- Engine --
    /// Bound on each store, ledger and transport call.
    pub operation_timeout: Duration,
    /// Delete the user's own messages along with the bot's prompts.
    pub sweep_user_messages: bool,
    /// Per-chat queue capacity.
    pub worker_buffer: usize,
    /// Idle time after which a chat worker exits.
    pub worker_idle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: BotToken::default(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            poll_timeout: Duration::from_secs(25),
            request_timeout: Duration::from_secs(35),
            database_path: PathBuf::from("taskbot.db"),
            ledger: LedgerKind::default(),
            ledger_snapshot_path: PathBuf::from("ledger.bin"),
            max_ledger_len: DEFAULT_MAX_LEDGER_LEN,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            sweep_user_messages: true,
            worker_buffer: DEFAULT_WORKER_BUFFER,
            worker_idle: DEFAULT_WORKER_IDLE,
        }
    }
}

impl Config {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read or
    /// parsed, if no token is configured, or if the API URL is invalid.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `Config` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let token = cli
            .token
            .clone()
            .or_else(|| file.telegram.token.clone())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let api_base_url = validate_api_url(
            cli.api_base_url
                .as_deref()
                .or(file.telegram.api_base_url.as_deref())
                .unwrap_or(DEFAULT_API_BASE_URL),
        )?;

        let poll_timeout = file
            .telegram
            .poll_timeout_secs
            .map_or(defaults.poll_timeout, Duration::from_secs);
        let request_timeout = file
            .telegram
            .request_timeout_secs
            .map_or(defaults.request_timeout, Duration::from_secs);
        if request_timeout <= poll_timeout {
            return Err(ConfigError::InvalidTimeout {
                field: "request_timeout_secs",
                reason: "must be greater than poll_timeout_secs",
            });
        }

        let operation_timeout = file
            .engine
            .operation_timeout_secs
            .map_or(defaults.operation_timeout, Duration::from_secs);
        if operation_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                field: "operation_timeout_secs",
                reason: "must be at least 1",
            });
        }

        Ok(Self {
            token: BotToken::new(token),
            api_base_url,
            poll_timeout,
            request_timeout,
            database_path: cli
                .database
                .clone()
                .or_else(|| file.storage.database_path.clone())
                .unwrap_or(defaults.database_path),
            ledger: cli
                .ledger
                .or(file.storage.ledger)
                .unwrap_or(defaults.ledger),
            ledger_snapshot_path: cli
                .ledger_snapshot
                .clone()
                .or_else(|| file.storage.ledger_snapshot_path.clone())
                .unwrap_or(defaults.ledger_snapshot_path),
            max_ledger_len: file
                .storage
                .max_ledger_len
                .unwrap_or(defaults.max_ledger_len),
            operation_timeout,
            sweep_user_messages: file
                .engine
                .sweep_user_messages
                .unwrap_or(defaults.sweep_user_messages),
            worker_buffer: file
                .engine
                .worker_buffer
                .unwrap_or(defaults.worker_buffer),
            worker_idle: file
                .engine
                .worker_idle_secs
                .map_or(defaults.worker_idle, Duration::from_secs),
        })
    }

    /// Options for [`TelegramTransport`](crate::transport::telegram::TelegramTransport).
    #[must_use]
    pub fn telegram_options(&self) -> TelegramOptions {
        TelegramOptions {
            token: self.token.expose().to_string(),
            api_base_url: self.api_base_url.clone(),
            poll_timeout: self.poll_timeout,
            request_timeout: self.request_timeout,
        }
    }

    /// Engine settings.
    #[must_use]
    pub const fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            operation_timeout: self.operation_timeout,
            sweep_user_messages: self.sweep_user_messages,
        }
    }

    /// Dispatcher settings.
    #[must_use]
    pub const fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            worker_buffer: self.worker_buffer,
            worker_idle: self.worker_idle,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Chat-driven personal task manager bot")]
pub struct CliArgs {
    /// Path to config file (default: `~/.config/taskbot/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bot API token.
    #[arg(long, env = "TASKBOT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Bot API root URL (for a local Bot API server).
    #[arg(long, env = "TASKBOT_API_URL")]
    pub api_base_url: Option<String>,

    /// SQLite database path.
    #[arg(long, env = "TASKBOT_DATABASE")]
    pub database: Option<PathBuf>,

    /// Message ledger backend.
    #[arg(long, value_enum)]
    pub ledger: Option<LedgerKind>,

    /// Snapshot file for the in-memory ledger.
    #[arg(long)]
    pub ledger_snapshot: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOT_LOG")]
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_api_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskbot").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
