//! Configuration management for the chat relay.
//!
//! The relay reads an optional JSON file at `~/.chatrelay/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (a `.env` file in the working directory is loaded first)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `TELEGRAM_TOKEN` → telegram.bot_token
//! - `CHATGPT_TOKEN` → backend.api_key
//! - `CHATGPT_API_BASE` → backend.base_url
//! - `CHATGPT_MODEL` → backend.model
//! - `ONLY_ALLOW_WHITELISTED_TELEGRAM_IDS` → access.restricted (`"true"` enables)
//! - `WHITELISTED_TELEGRAM_IDS` → access.allowed_users (comma separated)
//! - `RELAY_LOG_LEVEL` / `RELAY_LOG_FORMAT` → observability.*
//! - `RELAY_BIND_ADDRESS` / `RELAY_PORT` → server.*

use crate::error::{Result, ResultExt};
use crate::validation::{ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".chatrelay"),
        |dirs| dirs.home_dir().join(".chatrelay"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Telegram transport
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Local stdin/stdout transport
    #[serde(default)]
    pub cli: CliConfig,

    /// Language-model backend
    #[serde(default)]
    pub backend: BackendConfig,

    /// Sender allow-list
    #[serde(default)]
    pub access: AccessConfig,

    /// Typing indicator throttling
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Health/stats HTTP server
    #[serde(default)]
    pub server: ServerConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str::<Self>(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with `.env` and environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        let mut config = Self::load()?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply process environment overrides to the configuration.
    pub fn apply_env_overrides(&mut self) -> ValidationResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Every recognized variable is applied; values that cannot be parsed
    /// are reported afterwards and leave the field unchanged.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ValidationResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_TOKEN") {
            self.telegram.bot_token = Some(token);
        }

        if let Some(key) = lookup("CHATGPT_TOKEN") {
            self.backend.api_key = Some(key);
        }
        if let Some(base) = lookup("CHATGPT_API_BASE") {
            self.backend.base_url = base;
        }
        if let Some(model) = lookup("CHATGPT_MODEL") {
            self.backend.model = model;
        }

        if let Some(flag) = lookup("ONLY_ALLOW_WHITELISTED_TELEGRAM_IDS") {
            self.access.restricted = flag.trim() == "true";
        }
        if let Some(ids) = lookup("WHITELISTED_TELEGRAM_IDS") {
            self.access.allowed_users = parse_id_list(&ids);
        }

        if let Some(level) = lookup("RELAY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("RELAY_LOG_FORMAT") {
            self.observability.log_format = format;
        }

        if let Some(bind) = lookup("RELAY_BIND_ADDRESS") {
            self.server.host = bind;
        }
        if let Some(port) = lookup("RELAY_PORT") {
            match port.trim().parse() {
                Ok(p) => self.server.port = p,
                Err(e) => {
                    return Err(ValidationError::InvalidValue {
                        field: "server.port (RELAY_PORT)".into(),
                        reason: format!("'{port}' is not a port number: {e}"),
                    })
                }
            }
        }

        Ok(())
    }
}

/// Split a comma separated id list, dropping blanks.
fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

/// Telegram transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bot API token from @BotFather
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Long-poll timeout passed to `getUpdates`
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: None,
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

/// CLI transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// Chat-completions backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API base URL (OpenAI compatible)
    #[serde(default = "default_api_base")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// System prompt sent ahead of the conversation history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,

    /// Watchdog on a single backend call; 0 disables it
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum number of prior messages replayed as context
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Prompts and replies kept in memory across all conversations;
    /// the oldest are forgotten first
    #[serde(default = "default_max_stored_messages")]
    pub max_stored_messages: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            api_key: None,
            model: default_model(),
            system_message: None,
            timeout_secs: default_timeout(),
            max_history: default_max_history(),
            max_stored_messages: default_max_stored_messages(),
        }
    }
}

/// Sender allow-list.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccessConfig {
    /// Only allow listed senders when set
    #[serde(default)]
    pub restricted: bool,

    #[serde(default)]
    pub allowed_users: Vec<String>,
}

/// Typing indicator throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum spacing between forwarded indicators
    #[serde(default = "default_progress_interval")]
    pub interval_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_progress_interval(),
        }
    }
}

/// Health/stats HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_poll_timeout() -> u64 {
    30
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_timeout() -> u64 {
    300 // LLM calls can be slow
}
fn default_max_history() -> usize {
    20
}
fn default_max_stored_messages() -> usize {
    10_000
}
fn default_progress_interval() -> u64 {
    4000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    4450
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
