//! Default values for every configuration section.

use crate::schema::*;
use guildbridge_common::LogFormat;

/// Default Discord REST API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

impl Default for Config {
    fn default() -> Self {
        Self {
            discord: DiscordConfig::default(),
            connection: ConnectionConfig::default(),
            transfer: TransferConfig::default(),
            commands: CommandsConfig::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_seconds: 15,
            rate_limit_buffer_ms: 100,
            global_requests_per_second: 50,
            duplicate_message_window_seconds: 5,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            check_timeout_seconds: 10,
            manual_check_cooldown_seconds: 3,
            health_check_interval_seconds: 300,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            initial_batch_size: 25,
            batch_size: 10,
            batch_interval_seconds: 5,
            poll_interval_seconds: 5,
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 2,
            history_limit: 20,
            authorized_sample_guilds: 3,
            estimated_members_per_guild: 50,
            tokens_per_guild: 10,
            refresh_failure_percent: 5,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}
