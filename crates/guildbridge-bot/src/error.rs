//! Application-wide error types using thiserror.

use guildbridge_common::GuildBridgeError;
use guildbridge_config::ConfigError;
use guildbridge_transfer::TransferError;

/// Main application error type.
#[derive(thiserror::Error, Debug)]
pub enum BotError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Client construction or logging setup failed.
    #[error(transparent)]
    Setup(#[from] GuildBridgeError),

    /// Transfer lookup failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the bot application.
pub type BotResult<T> = Result<T, BotError>;
