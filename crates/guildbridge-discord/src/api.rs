//! The Discord operations GuildBridge relies on.

use crate::models::{Channel, Guild, Member, Message, Role, User, Webhook};
use async_trait::async_trait;
use guildbridge_common::{ChannelId, GuildId, Result, WebhookId};
use tracing::warn;

/// Largest page size Discord accepts for member listing.
pub const MAX_MEMBER_LIMIT: u16 = 1000;

/// Discord REST operations used by the command and transfer layers.
///
/// Methods prefixed with `try_` surface failures; their lenient
/// counterparts log a warning and return an empty list instead.
#[async_trait]
pub trait DiscordApi: Send + Sync {
    /// Probe the token and return the bot's identity.
    async fn check_status(&self, token: &str) -> Result<User>;

    /// Guilds the bot belongs to, with approximate counts.
    async fn list_guilds(&self, token: &str) -> Result<Vec<Guild>>;

    /// Fetch a single guild; fails if it does not exist or is inaccessible.
    async fn get_guild(&self, token: &str, guild_id: GuildId) -> Result<Guild>;

    /// Channels of a guild; never fails, an empty list means nothing could be read.
    async fn list_channels(&self, token: &str, guild_id: GuildId) -> Vec<Channel>;

    /// Roles of a guild.
    async fn try_list_roles(&self, token: &str, guild_id: GuildId) -> Result<Vec<Role>>;

    /// Members of a guild, up to `limit`.
    async fn try_list_members(
        &self,
        token: &str,
        guild_id: GuildId,
        limit: u16,
    ) -> Result<Vec<Member>>;

    /// Post a message to a channel.
    async fn send_message(&self, token: &str, channel_id: ChannelId, content: &str)
        -> Result<Message>;

    /// Create a webhook on a channel.
    async fn create_webhook(&self, token: &str, channel_id: ChannelId, name: &str)
        -> Result<Webhook>;

    /// Webhooks of a channel.
    async fn list_webhooks(&self, token: &str, channel_id: ChannelId) -> Result<Vec<Webhook>>;

    /// Post through a webhook using its own token.
    async fn execute_webhook(
        &self,
        webhook_id: WebhookId,
        webhook_token: &str,
        content: &str,
    ) -> Result<()>;

    /// Delete a webhook.
    async fn delete_webhook(&self, token: &str, webhook_id: WebhookId) -> Result<()>;

    /// Roles of a guild, empty on failure.
    async fn list_roles(&self, token: &str, guild_id: GuildId) -> Vec<Role> {
        match self.try_list_roles(token, guild_id).await {
            Ok(roles) => roles,
            Err(e) => {
                warn!(%guild_id, error = %e, "Failed to list roles, returning none");
                Vec::new()
            }
        }
    }

    /// Members of a guild, empty on failure.
    async fn list_members(&self, token: &str, guild_id: GuildId, limit: u16) -> Vec<Member> {
        match self.try_list_members(token, guild_id, limit).await {
            Ok(members) => members,
            Err(e) => {
                warn!(
                    %guild_id,
                    error = %e,
                    "Failed to list members (the members privileged intent may be missing)"
                );
                Vec::new()
            }
        }
    }
}
