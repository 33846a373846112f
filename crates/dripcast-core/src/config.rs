//! Dripcast configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DripError, Result};

/// Env var that overrides `telegram.bot_token`.
pub const TOKEN_ENV: &str = "DRIPCAST_TELEGRAM_TOKEN";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DripcastConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub bot: BotConfig,
}

impl DripcastConfig {
    /// Load config from the default path (~/.dripcast/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DripError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| DripError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| DripError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Apply environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var(TOKEN_ENV)
            && !token.is_empty()
        {
            tracing::debug!("Using Telegram token from {TOKEN_ENV}");
            self.telegram.bot_token = token;
        }
        self
    }

    /// Reject configs the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_secs == 0 {
            return Err(DripError::Config("scheduler.tick_interval_secs must be > 0".into()));
        }
        if !self.scheduler.min_delay_hours.is_finite() || self.scheduler.min_delay_hours < 0.0 {
            return Err(DripError::Config(
                "scheduler.min_delay_hours must be a non-negative number".into(),
            ));
        }
        if self.telegram.bot_token.is_empty() {
            return Err(DripError::Config(format!(
                "telegram.bot_token is empty (set it in config or via {TOKEN_ENV})"
            )));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Dripcast home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dripcast")
    }
}

/// Tick scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Shortest delay an operator may give a message (~1 minute).
    #[serde(default = "default_min_delay_hours")]
    pub min_delay_hours: f64,
}

fn default_tick_interval() -> u64 { 10 }
fn default_min_delay_hours() -> f64 { 0.016 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            min_delay_hours: default_min_delay_hours(),
        }
    }
}

/// Record store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.dripcast/dripcast.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

fn default_poll_interval() -> u64 { 1 }
fn default_send_timeout() -> u64 { 10 }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_interval: default_poll_interval(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

/// Front-end texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_welcome_text")]
    pub welcome_text: String,
    #[serde(default = "default_already_registered_text")]
    pub already_registered_text: String,
}

fn default_welcome_text() -> String {
    "Hi! You are subscribed. We will be in touch soon.".into()
}
fn default_already_registered_text() -> String { "You are already registered.".into() }

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            welcome_text: default_welcome_text(),
            already_registered_text: default_already_registered_text(),
        }
    }
}
