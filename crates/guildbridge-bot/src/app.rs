//! Application wiring: configuration in, a ready command dispatcher out.

use crate::error::BotResult;
use futures::Stream;
use guildbridge_commands::{CommandDispatcher, DispatcherSettings};
use guildbridge_common::Result;
use guildbridge_config::{Config, ConfigCache};
use guildbridge_discord::{
    BotConnection, BotConnectionState, CheckOutcome, ConnectionSettings, DiscordApi,
    DiscordRestGateway, GatewaySettings, HttpClientConfig,
};
use guildbridge_transfer::{MemoryStore, TransferId, TransferJob, TransferOrchestrator, TransferSettings};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// HTTP client settings from the `discord` section
pub fn http_config(config: &Config) -> HttpClientConfig {
    HttpClientConfig::new(config.discord.api_base_url.clone())
        .with_timeout(config.discord.request_timeout())
        .with_rate_limit_buffer(config.discord.rate_limit_buffer())
        .with_global_rate(config.discord.global_requests_per_second)
}

/// Connection timings from the `connection` section
pub fn connection_settings(config: &Config) -> ConnectionSettings {
    ConnectionSettings {
        check_timeout: config.connection.check_timeout(),
        manual_check_cooldown: config.connection.manual_check_cooldown(),
        health_check_interval: config.connection.health_check_interval(),
    }
}

/// Batch sizes and timings from the `transfer` section
pub fn transfer_settings(config: &Config) -> TransferSettings {
    TransferSettings {
        initial_batch_size: config.transfer.initial_batch_size,
        batch_size: config.transfer.batch_size,
        batch_interval: config.transfer.batch_interval(),
        poll_interval: config.transfer.poll_interval(),
    }
}

/// Dispatcher tuning from the `commands` section
pub fn dispatcher_settings(config: &Config) -> DispatcherSettings {
    DispatcherSettings {
        cooldown: config.commands.cooldown(),
        history_limit: config.commands.history_limit,
        authorized_sample_guilds: config.commands.authorized_sample_guilds,
        estimated_members_per_guild: config.commands.estimated_members_per_guild,
        tokens_per_guild: config.commands.tokens_per_guild,
        refresh_failure_percent: config.commands.refresh_failure_percent,
    }
}

/// The running application
pub struct App {
    config: ConfigCache,
    dispatcher: CommandDispatcher,
}

impl App {
    /// Build the application against the Discord REST API
    pub fn from_config(config: Config) -> BotResult<Self> {
        let gateway = DiscordRestGateway::from_config(
            http_config(&config),
            GatewaySettings {
                duplicate_message_window: config.discord.duplicate_message_window(),
            },
        )?;
        Ok(Self::with_api(config, Arc::new(gateway)))
    }

    /// Build the application against any [`DiscordApi`]
    pub fn with_api(config: Config, api: Arc<dyn DiscordApi>) -> Self {
        let connection = BotConnectionState::new(Arc::clone(&api), connection_settings(&config));
        connection.set_token(config.discord.token().map(str::to_string));

        let transfers = TransferOrchestrator::new(
            Arc::clone(&api),
            Arc::new(MemoryStore::new()),
            transfer_settings(&config),
        );
        let dispatcher =
            CommandDispatcher::new(api, connection, transfers, dispatcher_settings(&config));

        Self {
            config: ConfigCache::new(config),
            dispatcher,
        }
    }

    /// Current configuration
    pub fn config(&self) -> Arc<Config> {
        self.config.get()
    }

    /// Command dispatcher
    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    fn token(&self) -> String {
        self.config
            .get()
            .discord
            .token()
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// Run one command line and render the outcome as JSON
    pub async fn run_command(&self, line: &str) -> Value {
        match self.dispatcher.dispatch(&self.token(), line).await {
            Ok(reply) => reply.to_json(),
            Err(failure) => failure.to_json(),
        }
    }

    /// Probe the connection once
    pub async fn check(&self) -> BotConnection {
        let connection = self.dispatcher.connection();
        match connection.check_connection().await {
            CheckOutcome::Checked(state) => state,
            CheckOutcome::InFlight => connection.wait_until_settled().await,
            CheckOutcome::NoToken => {
                warn!("No bot token configured");
                connection.snapshot()
            }
        }
    }

    /// Snapshots of a transfer until it finishes
    pub async fn watch(
        &self,
        transfer_id: TransferId,
    ) -> BotResult<impl Stream<Item = Result<TransferJob>> + Send> {
        let watch = self.dispatcher.transfers().watch(transfer_id).await?;
        Ok(watch.into_stream())
    }

    /// Stop background transfer work
    pub async fn shutdown(&self) {
        info!("Shutting down");
        self.dispatcher.transfers().shutdown(SHUTDOWN_GRACE).await;
    }
}
