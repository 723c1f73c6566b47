//! Integration tests for guildbridge-bot.
//!
//! The application is wired against the fake Discord API; the REPL runs over
//! in-memory readers and writers.

use guildbridge_bot::repl::run_repl;
use guildbridge_bot::App;
use guildbridge_common::test_utils::init_test_logging;
use guildbridge_common::GuildId;
use guildbridge_config::{Config, ConfigLoader};
use guildbridge_discord::testing::FakeDiscord;
use guildbridge_discord::ConnectionStatus;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio_test::assert_ok;

fn config_with_token() -> Config {
    let mut config = Config::default();
    config.discord.token = "bot-token".to_string();
    config
}

fn fake() -> Arc<FakeDiscord> {
    Arc::new(
        FakeDiscord::new()
            .with_guild(FakeDiscord::guild(1, "Destination", Some(12)))
            .with_channels(GuildId(1), vec![FakeDiscord::text_channel(10, 1, "general")]),
    )
}

fn parse_lines(output: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(output)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_run_command_renders_tagged_json() {
    init_test_logging();
    let app = App::with_api(config_with_token(), fake());

    let reply = app.run_command("getGuilds").await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["command"], "getGuilds");
    assert_eq!(reply["guilds"][0]["name"], "Destination");

    let failure = app.run_command("frobnicate").await;
    assert_eq!(failure["success"], false);
    assert_eq!(failure["kind"], "unknown_command");
    assert_eq!(failure["notice"]["id"], "command-unknown");
}

#[tokio::test]
async fn test_missing_token_reports_not_connected() {
    let app = App::with_api(Config::default(), fake());

    let failure = app.run_command("test").await;
    assert_eq!(failure["kind"], "not_connected");

    let state = app.check().await;
    assert_eq!(state.status, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_check_connects() {
    let app = App::with_api(config_with_token(), fake());
    let state = app.check().await;
    assert!(state.is_connected());
    assert_eq!(state.bot_info.unwrap().username, "GuildBridge");
}

#[tokio::test]
async fn test_repl_round_trip() {
    let app = App::with_api(config_with_token(), fake());
    let input = b"# comment\n\ntest\njoin 1 5\n:history\n:quit\ngetGuilds\n" as &[u8];
    let mut output = Vec::new();

    let handled = assert_ok!(run_repl(&app, input, &mut output).await);
    assert_eq!(handled, 4);

    let replies = parse_lines(&output);
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["command"], "test");
    assert_eq!(replies[1]["status"], "completed");
    assert_eq!(replies[2]["history"].as_array().unwrap().len(), 2);

    app.shutdown().await;
}

#[tokio::test]
async fn test_repl_watch_finished_transfer() {
    let app = App::with_api(config_with_token(), fake());
    let reply = app.run_command("join 1 3").await;
    let transfer_id = reply["transferId"].as_str().unwrap().to_string();

    let script = format!(":watch {}\n:watch not-an-id\n", transfer_id);
    let mut output = Vec::new();
    run_repl(&app, script.as_bytes(), &mut output).await.unwrap();

    let replies = parse_lines(&output);
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["status"], "completed");
    assert_eq!(replies[0]["progress"], 100);
    assert_eq!(replies[1]["success"], false);
}

#[test]
fn test_yaml_configuration_drives_settings() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "discord:\n  token: from-file\ntransfer:\n  batch_interval_seconds: 2\ncommands:\n  cooldown_seconds: 4"
    )
    .unwrap();

    let config = ConfigLoader::load_config_with(file.path(), |_| None).unwrap();
    assert_eq!(
        guildbridge_bot::app::transfer_settings(&config).batch_interval,
        std::time::Duration::from_secs(2)
    );
    assert_eq!(
        guildbridge_bot::app::dispatcher_settings(&config).cooldown,
        std::time::Duration::from_secs(4)
    );
    assert_eq!(config.discord.token(), Some("from-file"));
}
