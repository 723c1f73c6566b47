//! Error types and utilities for GuildBridge

use std::time::Duration;
use thiserror::Error;

/// Result type alias for GuildBridge operations
pub type Result<T> = std::result::Result<T, GuildBridgeError>;

/// Main error type for GuildBridge operations
#[derive(Error, Debug)]
pub enum GuildBridgeError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport level failures (connect, timeout, body read)
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Discord answered with a non-success status
    #[error("Discord API error: {message}")]
    Discord {
        message: String,
        status_code: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Request withheld because of a rate limit
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Job store failures
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors for user input or data
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Generic {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl GuildBridgeError {
    /// Create a new generic error with a custom message
    pub fn new(msg: impl Into<String>) -> Self {
        Self::Generic {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new generic error with a custom message and source
    pub fn with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Generic {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new configuration error with source
    pub fn config_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new network error with source
    pub fn network_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new Discord API error
    pub fn discord(msg: impl Into<String>) -> Self {
        Self::Discord {
            message: msg.into(),
            status_code: None,
            source: None,
        }
    }

    /// Create a new Discord API error with the HTTP status that produced it
    pub fn discord_with_status(msg: impl Into<String>, status: u16) -> Self {
        Self::Discord {
            message: msg.into(),
            status_code: Some(status),
            source: None,
        }
    }

    /// Create a new rate limit error
    pub fn rate_limited(msg: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: msg.into(),
            retry_after,
        }
    }

    /// Create a new store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new store error with source
    pub fn store_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a new validation error with field name
    pub fn validation_field(msg: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// HTTP status carried by a Discord error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Discord { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// Whether this error represents a missing permission or privileged intent
    pub fn is_forbidden(&self) -> bool {
        matches!(self.status_code(), Some(401) | Some(403))
    }

    /// Whether this error was produced by a rate limit
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. }) || self.status_code() == Some(429)
    }
}

// Error conversion implementations for external types

/// Convert from reqwest::Error to GuildBridgeError
impl From<reqwest::Error> for GuildBridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network_with_source("Request timeout", err)
        } else if err.is_connect() {
            Self::network_with_source("Connection failed", err)
        } else if err.is_decode() {
            Self::network_with_source("Failed to decode response body", err)
        } else if err.is_status() {
            let status_code = err.status().map(|s| s.as_u16()).unwrap_or(0);
            Self::network_with_source(format!("HTTP error: {}", status_code), err)
        } else {
            Self::network_with_source("Network request failed", err)
        }
    }
}

/// Convert from serde_yaml::Error to GuildBridgeError
impl From<serde_yaml::Error> for GuildBridgeError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::config_with_source("YAML parsing error", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{error::Error, io};

    #[test]
    fn test_error_creation() {
        let error = GuildBridgeError::new("test message");
        assert!(error.to_string().contains("test message"));

        let config_error = GuildBridgeError::config("config issue");
        assert_eq!(config_error.to_string(), "Configuration error: config issue");

        let discord_error = GuildBridgeError::discord_with_status("Missing Access", 403);
        assert_eq!(discord_error.to_string(), "Discord API error: Missing Access");
        assert_eq!(discord_error.status_code(), Some(403));

        let validation_error = GuildBridgeError::validation_field("must be numeric", "guildId");
        assert!(validation_error.to_string().contains("Validation error"));
        assert!(validation_error.to_string().contains("must be numeric"));
    }

    #[test]
    fn test_forbidden_classification() {
        assert!(GuildBridgeError::discord_with_status("Missing Access", 403).is_forbidden());
        assert!(GuildBridgeError::discord_with_status("Unauthorized", 401).is_forbidden());
        assert!(!GuildBridgeError::discord_with_status("Not Found", 404).is_forbidden());
        assert!(!GuildBridgeError::network("connection reset").is_forbidden());
    }

    #[test]
    fn test_rate_limit_classification() {
        let local = GuildBridgeError::rate_limited("duplicate message", None);
        assert!(local.is_rate_limited());
        assert_eq!(local.to_string(), "Rate limited: duplicate message");

        let remote = GuildBridgeError::discord_with_status("Too Many Requests", 429);
        assert!(remote.is_rate_limited());

        assert!(!GuildBridgeError::store("row missing").is_rate_limited());
    }

    #[test]
    fn test_error_with_source() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let wrapped_error = GuildBridgeError::with_source("Failed to read file", io_error);

        assert!(wrapped_error.to_string().contains("Failed to read file"));
        assert!(wrapped_error.source().is_some());

        let store_error = GuildBridgeError::store_with_source(
            "Failed to persist transfer",
            io::Error::new(io::ErrorKind::PermissionDenied, "Access denied"),
        );
        assert!(store_error.to_string().contains("Store error"));
        assert!(store_error.source().is_some());
    }

    #[test]
    fn test_serde_error_conversion() {
        let invalid_json = r#"{"invalid": json}"#;
        let serde_error = serde_json::from_str::<serde_json::Value>(invalid_json).unwrap_err();
        let error: GuildBridgeError = serde_error.into();

        assert!(error.to_string().contains("Serialization error"));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<Vec<u32>>("key: [unclosed").unwrap_err();
        let error: GuildBridgeError = yaml_error.into();

        assert!(error.to_string().starts_with("Configuration error"));
        assert!(error.source().is_some());
    }
}
