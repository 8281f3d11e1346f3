//! Configuration management for the assistant relay.
//!
//! The relay reads a single configuration file at `~/.relay/config.json`
//! (override with `RELAY_CONFIG`). A `.env` file in the working directory is
//! loaded first so the environment overrides below can live there.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `TELEGRAM_BOT_TOKEN` → telegram.bot_token
//! - `ALLOWED_USERNAME` → telegram.allowed_username
//! - `OWNER_CHAT_ID` → telegram.owner_chat_id
//! - `RELAY_CHANNEL` → channel
//! - `RELAY_ASSISTANT_BIN` → assistant.binary
//! - `RELAY_ASSISTANT_TIMEOUT_SECS` → assistant.timeout_secs
//! - `RELAY_LOG_LEVEL` → observability.log_level
//! - `RELAY_LOG_FORMAT` → observability.log_format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".relay"),
        |dirs| dirs.home_dir().join(".relay"),
    )
}

/// Get the configuration file path.
///
/// `RELAY_CONFIG` takes precedence over the default location.
pub fn config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG")
        .map(|p| PathBuf::from(shellexpand::tilde(&p).into_owned()))
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Which front-end to run
    #[serde(default)]
    pub channel: ChannelKind,

    /// Telegram bot settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// External assistant CLI settings
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Session persistence and scope settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Response delivery limits
    #[serde(default)]
    pub delivery: DeliveryConfig,

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
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with `.env` and environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Ok(user) = std::env::var("ALLOWED_USERNAME") {
            self.telegram.allowed_username = Some(user);
        }
        if let Ok(chat) = std::env::var("OWNER_CHAT_ID") {
            if !chat.trim().is_empty() {
                self.telegram.owner_chat_id = Some(chat.trim().to_string());
            }
        }

        if let Ok(channel) = std::env::var("RELAY_CHANNEL") {
            match channel.to_lowercase().as_str() {
                "telegram" => self.channel = ChannelKind::Telegram,
                "cli" => self.channel = ChannelKind::Cli,
                other => tracing::warn!("Ignoring unknown RELAY_CHANNEL value: {other}"),
            }
        }

        if let Ok(bin) = std::env::var("RELAY_ASSISTANT_BIN") {
            self.assistant.binary = bin;
        }
        if let Ok(secs) = std::env::var("RELAY_ASSISTANT_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse() {
                self.assistant.timeout_secs = s;
            }
        }

        if let Ok(level) = std::env::var("RELAY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("RELAY_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Path of the durable session record.
    pub fn session_file(&self) -> PathBuf {
        self.session
            .state_file
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| config_dir().join("session_data.json"))
    }

    /// Directory used for staged attachments and oversized responses.
    pub fn temp_dir(&self) -> PathBuf {
        self.delivery
            .temp_dir
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| config_dir().join("tmp"))
    }

    /// Scope used when no session record exists yet.
    ///
    /// Falls back to the directory the process was started from.
    pub fn default_scope(&self) -> PathBuf {
        self.session
            .default_scope
            .as_deref()
            .map(expand_path)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

// ============================================================================
// Sections
// ============================================================================

/// Front-end selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Telegram,
    Cli,
}

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token from @BotFather
    #[serde(default)]
    pub bot_token: Option<String>,
    /// The single username allowed to talk to the bot
    #[serde(default)]
    pub allowed_username: Option<String>,
    /// Chat that receives error reports
    #[serde(default)]
    pub owner_chat_id: Option<String>,
    /// Long-poll timeout for getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Discard updates queued while the bot was offline
    #[serde(default = "default_true")]
    pub drop_pending_updates: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_username: None,
            owner_chat_id: None,
            poll_timeout_secs: default_poll_timeout(),
            drop_pending_updates: true,
        }
    }
}

/// External assistant CLI configuration.
///
/// The continuation flags are configurable because the resume contract
/// of the external tool is not fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Binary name or path
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Arguments placed before all generated flags
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Flag that continues the most recent conversation
    #[serde(default = "default_continue_flag")]
    pub continue_flag: String,
    /// Flag that resumes a conversation by token
    #[serde(default = "default_resume_flag")]
    pub resume_flag: String,
    /// Flag carrying an image path
    #[serde(default = "default_image_flag")]
    pub image_flag: String,
    /// Flag carrying the prompt
    #[serde(default = "default_prompt_flag")]
    pub prompt_flag: String,
    /// Maximum runtime of a single invocation
    #[serde(default = "default_assistant_timeout")]
    pub timeout_secs: u64,
    /// Case-insensitive markers that identify a stale session in failure output
    #[serde(default = "default_session_markers")]
    pub session_error_markers: Vec<String>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            extra_args: Vec::new(),
            continue_flag: default_continue_flag(),
            resume_flag: default_resume_flag(),
            image_flag: default_image_flag(),
            prompt_flag: default_prompt_flag(),
            timeout_secs: default_assistant_timeout(),
            session_error_markers: default_session_markers(),
        }
    }
}

/// Session persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Durable session record (default `~/.relay/session_data.json`)
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    /// Scope used before any scope was chosen (default: start directory)
    #[serde(default)]
    pub default_scope: Option<PathBuf>,
    /// Parent of directories created by the `new` scope preset (default: desktop)
    #[serde(default)]
    pub project_root: Option<PathBuf>,
}

/// Response delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Longest text sent inline, in characters
    #[serde(default = "default_inline_limit")]
    pub inline_limit: usize,
    /// Largest file the platform accepts, in bytes
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Staging directory (default `~/.relay/tmp`)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            inline_limit: default_inline_limit(),
            max_file_bytes: default_max_file_bytes(),
            temp_dir: None,
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

    /// Additional module targets to cap at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_poll_timeout() -> u64 {
    30
}
fn default_binary() -> String {
    "claude".into()
}
fn default_continue_flag() -> String {
    "--continue".into()
}
fn default_resume_flag() -> String {
    "--resume".into()
}
fn default_image_flag() -> String {
    "--image".into()
}
fn default_prompt_flag() -> String {
    "-p".into()
}
fn default_assistant_timeout() -> u64 {
    600
}
fn default_session_markers() -> Vec<String> {
    vec!["session".into(), "continue".into()]
}
fn default_inline_limit() -> usize {
    4096
}
fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
