//! Command errors

use guildbridge_common::GuildBridgeError;
use guildbridge_transfer::TransferError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by command parsing and dispatch
#[derive(Debug, Error)]
pub enum CommandError {
    /// The first token does not name a command
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    /// A required argument is absent
    #[error("Missing required parameter '{parameter}' for '{command}'")]
    MissingParameter {
        /// Command name
        command: &'static str,
        /// Parameter name
        parameter: &'static str,
    },

    /// An argument could not be parsed
    #[error("Invalid value '{value}' for parameter '{parameter}' of '{command}': {reason}")]
    InvalidParameter {
        /// Command name
        command: &'static str,
        /// Parameter name
        parameter: &'static str,
        /// Raw value supplied
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The connection precondition failed
    #[error("Bot is not connected{}", .reason.as_ref().map(|r| format!(": {}", r)).unwrap_or_default())]
    NotConnected {
        /// Last connection error, if known
        reason: Option<String>,
    },

    /// The same command ran too recently
    #[error("Command '{signature}' is on cooldown, try again in {}s", .remaining.as_secs_f64().ceil())]
    OnCooldown {
        /// Normalized command line
        signature: String,
        /// Time left in the cooldown window
        remaining: Duration,
    },

    /// The same command is still running
    #[error("Command '{0}' is already running")]
    AlreadyRunning(String),

    /// A precondition lookup failed
    #[error("{check} check failed: {message}")]
    CheckFailed {
        /// Which check failed
        check: &'static str,
        /// Failure detail
        message: String,
    },

    /// Transfer layer failure
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Discord or store failure
    #[error(transparent)]
    Base(#[from] GuildBridgeError),
}

impl CommandError {
    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownCommand(_) => "unknown_command",
            Self::MissingParameter { .. } => "missing_parameter",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::NotConnected { .. } => "not_connected",
            Self::OnCooldown { .. } => "on_cooldown",
            Self::AlreadyRunning(_) => "already_running",
            Self::CheckFailed { .. } => "check_failed",
            Self::Transfer(_) => "transfer",
            Self::Base(_) => "internal",
        }
    }

    /// Whether the command was rejected before doing any work
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::OnCooldown { .. } | Self::AlreadyRunning(_))
    }
}
