//! Runtime validation of a loaded configuration.

use crate::schema::Config;
use std::fmt;
use url::Url;

/// A single failed validation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path of the offending key.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All validation issues found in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationIssue>);

impl ValidationErrors {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(ValidationIssue {
            field: field.to_string(),
            message: message.into(),
        });
    }

    /// Whether any issue was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether an issue was recorded for `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|issue| issue.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&joined.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a configuration, collecting every issue instead of stopping
    /// at the first one.
    pub fn validate(config: &Config) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        match Url::parse(&config.discord.api_base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(
                "discord.api_base_url",
                format!("unsupported scheme '{}', expected http or https", url.scheme()),
            ),
            Err(e) => errors.push("discord.api_base_url", format!("invalid URL: {}", e)),
        }

        let positive = [
            (
                "discord.request_timeout_seconds",
                config.discord.request_timeout_seconds,
            ),
            (
                "connection.check_timeout_seconds",
                config.connection.check_timeout_seconds,
            ),
            (
                "connection.health_check_interval_seconds",
                config.connection.health_check_interval_seconds,
            ),
            (
                "transfer.initial_batch_size",
                u64::from(config.transfer.initial_batch_size),
            ),
            ("transfer.batch_size", u64::from(config.transfer.batch_size)),
            (
                "transfer.batch_interval_seconds",
                config.transfer.batch_interval_seconds,
            ),
            (
                "transfer.poll_interval_seconds",
                config.transfer.poll_interval_seconds,
            ),
            ("commands.history_limit", config.commands.history_limit as u64),
            (
                "commands.authorized_sample_guilds",
                config.commands.authorized_sample_guilds as u64,
            ),
        ];
        for (field, value) in positive {
            if value == 0 {
                errors.push(field, "must be greater than zero");
            }
        }

        if config.commands.refresh_failure_percent > 100 {
            errors.push(
                "commands.refresh_failure_percent",
                "must be between 0 and 100",
            );
        }

        if config.logging.level.trim().is_empty() {
            errors.push("logging.level", "cannot be empty");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_empty_token_is_accepted() {
        let mut config = Config::default();
        config.discord.token = String::new();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_non_http_url() {
        let mut config = Config::default();
        config.discord.api_base_url = "ftp://discord.com/api".to_string();
        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(errors.has_field("discord.api_base_url"));

        config.discord.api_base_url = "not a url".to_string();
        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(errors.to_string().contains("invalid URL"));
    }

    #[test]
    fn test_collects_every_issue() {
        let mut config = Config::default();
        config.transfer.batch_size = 0;
        config.transfer.batch_interval_seconds = 0;
        config.commands.refresh_failure_percent = 101;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.0.len(), 3);
        assert!(errors.has_field("transfer.batch_size"));
        assert!(errors.has_field("transfer.batch_interval_seconds"));
        assert!(errors.has_field("commands.refresh_failure_percent"));
    }

    proptest! {
        #[test]
        fn prop_failure_percent_bound(percent in 0u64..1000) {
            let mut config = Config::default();
            config.commands.refresh_failure_percent = percent;
            let result = ConfigValidator::validate(&config);
            prop_assert_eq!(result.is_ok(), percent <= 100);
        }

        #[test]
        fn prop_positive_batch_sizes_are_valid(initial in 1u32.., batch in 1u32..) {
            let mut config = Config::default();
            config.transfer.initial_batch_size = initial;
            config.transfer.batch_size = batch;
            prop_assert!(ConfigValidator::validate(&config).is_ok());
        }
    }
}
