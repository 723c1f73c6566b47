//! [`DiscordApi`] implementation backed by the Discord REST API.

use crate::api::{DiscordApi, MAX_MEMBER_LIMIT};
use crate::http::{HttpClientConfig, RateLimitedHttpClient, RequestOptions};
use crate::models::{
    Channel, CreateMessage, CreateWebhook, ExecuteWebhook, Guild, Member, Message, Role, User,
    Webhook,
};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use guildbridge_common::{ChannelId, GuildBridgeError, GuildId, Result, WebhookId};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Gateway configuration beyond the HTTP client itself.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Window in which an identical `(channel, content)` message is rejected.
    pub duplicate_message_window: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            duplicate_message_window: Duration::from_secs(5),
        }
    }
}

/// Discord REST gateway
#[derive(Debug, Clone)]
pub struct DiscordRestGateway {
    http: RateLimitedHttpClient,
    settings: GatewaySettings,
    recent_messages: Arc<DashMap<(ChannelId, String), Instant>>,
}

impl DiscordRestGateway {
    /// Create a gateway over an existing client
    pub fn new(http: RateLimitedHttpClient, settings: GatewaySettings) -> Self {
        Self {
            http,
            settings,
            recent_messages: Arc::new(DashMap::new()),
        }
    }

    /// Create a gateway with its own client
    pub fn from_config(config: HttpClientConfig, settings: GatewaySettings) -> Result<Self> {
        Ok(Self::new(RateLimitedHttpClient::new(config)?, settings))
    }

    /// The underlying HTTP client
    pub fn http(&self) -> &RateLimitedHttpClient {
        &self.http
    }

    /// Reserve `(channel_id, content)` for the duplicate window, or report how
    /// long until it may be sent again.
    fn reserve_message(&self, channel_id: ChannelId, content: &str) -> Option<Duration> {
        let now = Instant::now();
        let window = self.settings.duplicate_message_window;
        self.recent_messages
            .retain(|_, sent_at| now.duration_since(*sent_at) < window);

        match self.recent_messages.entry((channel_id, content.to_string())) {
            Entry::Occupied(entry) => Some(window.saturating_sub(now.duration_since(*entry.get()))),
            Entry::Vacant(entry) => {
                entry.insert(now);
                None
            }
        }
    }

    async fn channels_via_guild(&self, token: &str, guild_id: GuildId) -> Result<Vec<Channel>> {
        self.http
            .request_json(
                &format!("/guilds/{}/channels", guild_id),
                RequestOptions::get().with_token(token),
            )
            .await
    }

    async fn channels_via_global(&self, token: &str, guild_id: GuildId) -> Result<Vec<Channel>> {
        let channels: Vec<Channel> = self
            .http
            .request_json("/channels", RequestOptions::get().with_token(token))
            .await?;
        Ok(channels
            .into_iter()
            .filter(|channel| channel.guild_id == Some(guild_id))
            .collect())
    }
}

#[async_trait]
impl DiscordApi for DiscordRestGateway {
    #[instrument(skip(self, token))]
    async fn check_status(&self, token: &str) -> Result<User> {
        let user: User = self
            .http
            .request_json("/users/@me", RequestOptions::get().with_token(token))
            .await?;
        info!(bot = %user.tag(), "Bot token verified");
        Ok(user)
    }

    #[instrument(skip(self, token))]
    async fn list_guilds(&self, token: &str) -> Result<Vec<Guild>> {
        let guilds: Vec<Guild> = self
            .http
            .request_json(
                "/users/@me/guilds",
                RequestOptions::get()
                    .with_token(token)
                    .with_query("with_counts", true),
            )
            .await?;
        debug!(count = guilds.len(), "Fetched guilds");
        Ok(guilds)
    }

    #[instrument(skip(self, token))]
    async fn get_guild(&self, token: &str, guild_id: GuildId) -> Result<Guild> {
        self.http
            .request_json(
                &format!("/guilds/{}", guild_id),
                RequestOptions::get()
                    .with_token(token)
                    .with_query("with_counts", true),
            )
            .await
    }

    #[instrument(skip(self, token))]
    async fn list_channels(&self, token: &str, guild_id: GuildId) -> Vec<Channel> {
        let primary_error = match self.channels_via_guild(token, guild_id).await {
            Ok(channels) => return channels,
            Err(e) => e,
        };
        warn!(error = %primary_error, "Guild channel listing failed, trying global channel list");

        match self.channels_via_global(token, guild_id).await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = %e, "Channel listing failed, returning none");
                Vec::new()
            }
        }
    }

    #[instrument(skip(self, token))]
    async fn try_list_roles(&self, token: &str, guild_id: GuildId) -> Result<Vec<Role>> {
        self.http
            .request_json(
                &format!("/guilds/{}/roles", guild_id),
                RequestOptions::get().with_token(token),
            )
            .await
    }

    #[instrument(skip(self, token))]
    async fn try_list_members(
        &self,
        token: &str,
        guild_id: GuildId,
        limit: u16,
    ) -> Result<Vec<Member>> {
        let limit = limit.clamp(1, MAX_MEMBER_LIMIT);
        self.http
            .request_json(
                &format!("/guilds/{}/members", guild_id),
                RequestOptions::get()
                    .with_token(token)
                    .with_query("limit", limit),
            )
            .await
    }

    #[instrument(skip(self, token, content), fields(len = content.len()))]
    async fn send_message(
        &self,
        token: &str,
        channel_id: ChannelId,
        content: &str,
    ) -> Result<Message> {
        if let Some(retry_after) = self.reserve_message(channel_id, content) {
            warn!(%channel_id, "Identical message sent recently, suppressing duplicate");
            return Err(GuildBridgeError::rate_limited(
                format!("Duplicate message to channel {} suppressed", channel_id),
                Some(retry_after),
            ));
        }

        let body = serde_json::to_value(CreateMessage { content })?;
        self.http
            .request_json(
                &format!("/channels/{}/messages", channel_id),
                RequestOptions::post(body).with_token(token),
            )
            .await
    }

    #[instrument(skip(self, token))]
    async fn create_webhook(
        &self,
        token: &str,
        channel_id: ChannelId,
        name: &str,
    ) -> Result<Webhook> {
        let body = serde_json::to_value(CreateWebhook { name })?;
        let webhook: Webhook = self
            .http
            .request_json(
                &format!("/channels/{}/webhooks", channel_id),
                RequestOptions::post(body).with_token(token),
            )
            .await?;
        info!(webhook_id = %webhook.id, "Webhook created");
        Ok(webhook)
    }

    #[instrument(skip(self, token))]
    async fn list_webhooks(&self, token: &str, channel_id: ChannelId) -> Result<Vec<Webhook>> {
        self.http
            .request_json(
                &format!("/channels/{}/webhooks", channel_id),
                RequestOptions::get().with_token(token),
            )
            .await
    }

    #[instrument(skip(self, webhook_token, content))]
    async fn execute_webhook(
        &self,
        webhook_id: WebhookId,
        webhook_token: &str,
        content: &str,
    ) -> Result<()> {
        let body = serde_json::to_value(ExecuteWebhook {
            content,
            username: None,
        })?;
        self.http
            .request_empty(
                &format!("/webhooks/{}/{}", webhook_id, webhook_token),
                RequestOptions::post(body),
            )
            .await
    }

    #[instrument(skip(self, token))]
    async fn delete_webhook(&self, token: &str, webhook_id: WebhookId) -> Result<()> {
        self.http
            .request_empty(
                &format!("/webhooks/{}", webhook_id),
                RequestOptions::delete().with_token(token),
            )
            .await?;
        info!(%webhook_id, "Webhook deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(window: Duration) -> DiscordRestGateway {
        DiscordRestGateway::from_config(
            HttpClientConfig::new("http://127.0.0.1:9"),
            GatewaySettings {
                duplicate_message_window: window,
            },
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_message_rejects_duplicates_within_window() {
        let gateway = gateway(Duration::from_secs(5));
        let channel = ChannelId(1);

        assert!(gateway.reserve_message(channel, "hello").is_none());
        let remaining = gateway.reserve_message(channel, "hello").unwrap();
        assert!(remaining <= Duration::from_secs(5));

        assert!(gateway.reserve_message(channel, "other").is_none());
        assert!(gateway.reserve_message(ChannelId(2), "hello").is_none());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(gateway.reserve_message(channel, "hello").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_send_fails_without_network() {
        let gateway = gateway(Duration::from_secs(5));
        gateway.reserve_message(ChannelId(7), "ping");

        let err = gateway
            .send_message("token", ChannelId(7), "ping")
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }
}
