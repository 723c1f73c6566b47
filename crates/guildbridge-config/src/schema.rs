//! Configuration schema definitions.
//!
//! Every section uses `#[serde(default)]`, so a YAML file only needs the
//! keys it wants to change.

use guildbridge_common::LogFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for GuildBridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Discord REST client configuration.
    pub discord: DiscordConfig,
    /// Bot connection health configuration.
    pub connection: ConnectionConfig,
    /// Transfer job processing configuration.
    pub transfer: TransferConfig,
    /// Command dispatch configuration.
    pub commands: CommandsConfig,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Discord REST client configuration.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token. May be empty; the connection layer then reports "no token".
    pub token: String,
    /// Base URL of the Discord REST API.
    pub api_base_url: String,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_seconds: u64,
    /// Extra delay added on top of every rate-limit wait, in milliseconds.
    pub rate_limit_buffer_ms: u64,
    /// Proactive global request quota; 0 disables it.
    pub global_requests_per_second: u32,
    /// Window in which an identical message to the same channel is rejected.
    pub duplicate_message_window_seconds: u64,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &guildbridge_common::redact_token(&self.token))
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("rate_limit_buffer_ms", &self.rate_limit_buffer_ms)
            .field("global_requests_per_second", &self.global_requests_per_second)
            .field(
                "duplicate_message_window_seconds",
                &self.duplicate_message_window_seconds,
            )
            .finish()
    }
}

/// Bot connection health configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Hard ceiling for a single connection check.
    pub check_timeout_seconds: u64,
    /// Minimum spacing between manual checks.
    pub manual_check_cooldown_seconds: u64,
    /// Interval of the background health probe while connected.
    pub health_check_interval_seconds: u64,
}

/// Transfer job processing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Users processed synchronously when a job starts.
    pub initial_batch_size: u32,
    /// Users processed per background step.
    pub batch_size: u32,
    /// Seconds between background steps.
    pub batch_interval_seconds: u64,
    /// Fallback poll interval for transfer watchers.
    pub poll_interval_seconds: u64,
}

/// Command dispatch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Per-signature cooldown.
    pub cooldown_seconds: u64,
    /// Number of history entries retained.
    pub history_limit: usize,
    /// Guilds sampled when counting authorized members.
    pub authorized_sample_guilds: usize,
    /// Per-guild estimate used when no member data is available.
    pub estimated_members_per_guild: u64,
    /// Tokens refreshed per guild by `refreshtokens`.
    pub tokens_per_guild: u64,
    /// Simulated failure percentage for `refreshtokens`.
    pub refresh_failure_percent: u64,
}

/// Logging section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Level filter directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Optional log file.
    pub file: Option<String>,
}

impl DiscordConfig {
    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Rate-limit buffer as a `Duration`.
    pub fn rate_limit_buffer(&self) -> Duration {
        Duration::from_millis(self.rate_limit_buffer_ms)
    }

    /// Duplicate-message window as a `Duration`.
    pub fn duplicate_message_window(&self) -> Duration {
        Duration::from_secs(self.duplicate_message_window_seconds)
    }

    /// The token, or `None` when unset.
    pub fn token(&self) -> Option<&str> {
        let token = self.token.trim();
        (!token.is_empty()).then_some(token)
    }
}

impl ConnectionConfig {
    /// Check ceiling as a `Duration`.
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_seconds)
    }

    /// Manual check cooldown as a `Duration`.
    pub fn manual_check_cooldown(&self) -> Duration {
        Duration::from_secs(self.manual_check_cooldown_seconds)
    }

    /// Health probe interval as a `Duration`.
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }
}

impl TransferConfig {
    /// Background step interval as a `Duration`.
    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs(self.batch_interval_seconds)
    }

    /// Watcher poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

impl CommandsConfig {
    /// Cooldown as a `Duration`.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

impl LoggingSection {
    /// Convert into the logging crate's configuration.
    pub fn to_logging_config(&self) -> guildbridge_common::LoggingConfig {
        guildbridge_common::LoggingConfig {
            level: self.level.clone(),
            format: self.format,
            file_path: self.file.clone(),
            ..guildbridge_common::LoggingConfig::default()
        }
    }
}
