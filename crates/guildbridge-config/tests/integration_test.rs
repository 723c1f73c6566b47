//! Integration tests for guildbridge-config crate.

use guildbridge_common::LogFormat;
use guildbridge_config::{Config, ConfigCache, ConfigLoader, ConfigValidator};
use std::sync::Arc;

const FULL_CONFIG: &str = r#"
discord:
  token: "MTIzNDU2Nzg5MDEyMzQ1Njc4OTA.AbCdEf.GhIjKlMnOpQrStUvWxYz"
  api_base_url: "https://discord.com/api/v10"
  request_timeout_seconds: 20
  rate_limit_buffer_ms: 250
  global_requests_per_second: 0
  duplicate_message_window_seconds: 5
connection:
  check_timeout_seconds: 8
  manual_check_cooldown_seconds: 3
  health_check_interval_seconds: 120
transfer:
  initial_batch_size: 25
  batch_size: 10
  batch_interval_seconds: 5
  poll_interval_seconds: 2
commands:
  cooldown_seconds: 2
  history_limit: 50
  authorized_sample_guilds: 3
  estimated_members_per_guild: 50
  tokens_per_guild: 10
  refresh_failure_percent: 5
logging:
  level: "guildbridge_discord=debug,info"
  format: json
  file: "/tmp/guildbridge.log"
"#;

#[test]
fn test_full_config_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, FULL_CONFIG).unwrap();

    let config = ConfigLoader::load_config_with(&path, |_| None).unwrap();
    assert_eq!(config.discord.rate_limit_buffer_ms, 250);
    assert_eq!(config.discord.global_requests_per_second, 0);
    assert_eq!(config.connection.health_check_interval_seconds, 120);
    assert_eq!(config.transfer.poll_interval_seconds, 2);
    assert_eq!(config.commands.history_limit, 50);
    assert_eq!(config.logging.format, LogFormat::Json);

    let logging = config.logging.to_logging_config();
    assert_eq!(logging.file_path.as_deref(), Some("/tmp/guildbridge.log"));
    assert_eq!(logging.format, LogFormat::Json);
}

#[test]
fn test_debug_output_redacts_token() {
    let mut config = Config::default();
    config.discord.token = "super-secret-token".to_string();

    let rendered = format!("{:?}", config);
    assert!(!rendered.contains("super-secret-token"));
    assert!(rendered.contains("oken"));
}

#[test]
fn test_config_cache() {
    let cache = ConfigCache::new(Config::default());
    let before: Arc<Config> = cache.get();

    let mut next = Config::default();
    next.commands.cooldown_seconds = 7;
    assert!(ConfigValidator::validate(&next).is_ok());
    cache.update(next);

    assert_eq!(before.commands.cooldown_seconds, 2);
    assert_eq!(cache.get().commands.cooldown_seconds, 7);
}
