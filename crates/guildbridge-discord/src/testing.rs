//! In-memory [`DiscordApi`] for tests of the layers above the gateway.
//!
//! `FakeDiscord` serves canned guilds, channels, roles and members, counts
//! every call by operation name and can be told to fail specific
//! operations.

use crate::api::DiscordApi;
use crate::models::{Channel, Guild, Member, Message, Role, User, Webhook, CHANNEL_TYPE_GUILD_TEXT};
use async_trait::async_trait;
use guildbridge_common::{
    ChannelId, GuildBridgeError, GuildId, MessageId, Result, RoleId, UserId, WebhookId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    bot: Option<User>,
    guilds: Vec<Guild>,
    channels: HashMap<GuildId, Vec<Channel>>,
    roles: HashMap<GuildId, Vec<Role>>,
    members: HashMap<GuildId, Vec<Member>>,
    status_error: Option<String>,
    status_delay: Option<Duration>,
    guild_list_error: Option<String>,
    members_forbidden: bool,
    roles_forbidden: bool,
    send_error: Option<String>,
    sent: Vec<(ChannelId, String)>,
    webhooks: HashMap<ChannelId, Vec<Webhook>>,
    executed_webhooks: Vec<(WebhookId, String)>,
}

/// Scriptable fake Discord API
#[derive(Default)]
pub struct FakeDiscord {
    state: Mutex<FakeState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    next_id: AtomicU64,
}

impl FakeDiscord {
    /// An empty fake whose status probe succeeds
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.lock().bot = Some(Self::user(1, "GuildBridge"));
        fake.next_id.store(900_000, Ordering::Relaxed);
        fake
    }

    /// Build a user
    pub fn user(id: u64, username: &str) -> User {
        User {
            id: UserId(id),
            username: username.to_string(),
            discriminator: "0".to_string(),
            global_name: None,
            bot: false,
        }
    }

    /// Build a guild
    pub fn guild(id: u64, name: &str, approximate_member_count: Option<u64>) -> Guild {
        Guild {
            id: GuildId(id),
            name: name.to_string(),
            icon: None,
            system_channel_id: None,
            approximate_member_count,
            approximate_presence_count: None,
        }
    }

    /// Build a channel
    pub fn channel(id: u64, guild_id: u64, name: &str, kind: u8) -> Channel {
        Channel {
            id: ChannelId(id),
            kind,
            guild_id: Some(GuildId(guild_id)),
            name: Some(name.to_string()),
            position: None,
        }
    }

    /// Build a text channel
    pub fn text_channel(id: u64, guild_id: u64, name: &str) -> Channel {
        Self::channel(id, guild_id, name, CHANNEL_TYPE_GUILD_TEXT)
    }

    /// Build a role
    pub fn role(id: u64, name: &str) -> Role {
        Role {
            id: RoleId(id),
            name: name.to_string(),
            color: 0,
            position: 0,
            managed: false,
        }
    }

    /// Build a member
    pub fn member(id: u64, username: &str) -> Member {
        Member {
            user: Some(Self::user(id, username)),
            nick: None,
            roles: Vec::new(),
            joined_at: None,
        }
    }

    /// Add a guild
    pub fn with_guild(self, guild: Guild) -> Self {
        self.state.lock().guilds.push(guild);
        self
    }

    /// Set channels of a guild
    pub fn with_channels(self, guild_id: GuildId, channels: Vec<Channel>) -> Self {
        self.state.lock().channels.insert(guild_id, channels);
        self
    }

    /// Set roles of a guild
    pub fn with_roles(self, guild_id: GuildId, roles: Vec<Role>) -> Self {
        self.state.lock().roles.insert(guild_id, roles);
        self
    }

    /// Set members of a guild
    pub fn with_members(self, guild_id: GuildId, members: Vec<Member>) -> Self {
        self.state.lock().members.insert(guild_id, members);
        self
    }

    /// Make the status probe fail with `message`
    pub fn fail_status(&self, message: impl Into<String>) {
        self.state.lock().status_error = Some(message.into());
    }

    /// Let the status probe succeed again
    pub fn restore_status(&self) {
        self.state.lock().status_error = None;
    }

    /// Delay the status probe
    pub fn delay_status(&self, delay: Duration) {
        self.state.lock().status_delay = Some(delay);
    }

    /// Make guild listing fail with `message`
    pub fn fail_guild_list(&self, message: impl Into<String>) {
        self.state.lock().guild_list_error = Some(message.into());
    }

    /// Make member listing fail with 403 everywhere
    pub fn forbid_members(&self) {
        self.state.lock().members_forbidden = true;
    }

    /// Make role listing fail with 403 everywhere
    pub fn forbid_roles(&self) {
        self.state.lock().roles_forbidden = true;
    }

    /// Make message sending fail with `message`
    pub fn fail_send(&self, message: impl Into<String>) {
        self.state.lock().send_error = Some(message.into());
    }

    /// Set the system channel of a known guild
    pub fn set_system_channel(&self, guild_id: GuildId, channel_id: Option<ChannelId>) {
        let mut state = self.state.lock();
        if let Some(guild) = state.guilds.iter_mut().find(|g| g.id == guild_id) {
            guild.system_channel_id = channel_id;
        }
    }

    /// Number of calls made to `operation` (the trait method name)
    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().get(operation).copied().unwrap_or(0)
    }

    /// Total calls across all operations
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Messages sent so far
    pub fn sent_messages(&self) -> Vec<(ChannelId, String)> {
        self.state.lock().sent.clone()
    }

    /// Webhook executions so far
    pub fn executed_webhooks(&self) -> Vec<(WebhookId, String)> {
        self.state.lock().executed_webhooks.clone()
    }

    fn record(&self, operation: &'static str) {
        *self.calls.lock().entry(operation).or_insert(0) += 1;
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn forbidden(what: &str) -> GuildBridgeError {
        GuildBridgeError::discord_with_status(format!("HTTP 403: Missing Access to {}", what), 403)
    }

    fn unknown_guild(guild_id: GuildId) -> GuildBridgeError {
        GuildBridgeError::discord_with_status(format!("HTTP 404: Unknown Guild {}", guild_id), 404)
    }
}

#[async_trait]
impl DiscordApi for FakeDiscord {
    async fn check_status(&self, _token: &str) -> Result<User> {
        self.record("check_status");
        let delay = self.state.lock().status_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if let Some(message) = &state.status_error {
            return Err(GuildBridgeError::discord_with_status(message.clone(), 401));
        }
        state
            .bot
            .clone()
            .ok_or_else(|| GuildBridgeError::discord_with_status("HTTP 401: Unauthorized", 401))
    }

    async fn list_guilds(&self, _token: &str) -> Result<Vec<Guild>> {
        self.record("list_guilds");
        let state = self.state.lock();
        match &state.guild_list_error {
            Some(message) => Err(GuildBridgeError::network(message.clone())),
            None => Ok(state.guilds.clone()),
        }
    }

    async fn get_guild(&self, _token: &str, guild_id: GuildId) -> Result<Guild> {
        self.record("get_guild");
        self.state
            .lock()
            .guilds
            .iter()
            .find(|g| g.id == guild_id)
            .cloned()
            .ok_or_else(|| Self::unknown_guild(guild_id))
    }

    async fn list_channels(&self, _token: &str, guild_id: GuildId) -> Vec<Channel> {
        self.record("list_channels");
        self.state
            .lock()
            .channels
            .get(&guild_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn try_list_roles(&self, _token: &str, guild_id: GuildId) -> Result<Vec<Role>> {
        self.record("try_list_roles");
        let state = self.state.lock();
        if state.roles_forbidden {
            return Err(Self::forbidden("roles"));
        }
        if !state.guilds.iter().any(|g| g.id == guild_id) {
            return Err(Self::unknown_guild(guild_id));
        }
        Ok(state.roles.get(&guild_id).cloned().unwrap_or_default())
    }

    async fn try_list_members(
        &self,
        _token: &str,
        guild_id: GuildId,
        limit: u16,
    ) -> Result<Vec<Member>> {
        self.record("try_list_members");
        let state = self.state.lock();
        if state.members_forbidden {
            return Err(Self::forbidden("members"));
        }
        Ok(state
            .members
            .get(&guild_id)
            .map(|members| members.iter().take(usize::from(limit)).cloned().collect())
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        _token: &str,
        channel_id: ChannelId,
        content: &str,
    ) -> Result<Message> {
        self.record("send_message");
        let mut state = self.state.lock();
        if let Some(message) = &state.send_error {
            return Err(GuildBridgeError::discord_with_status(message.clone(), 403));
        }
        state.sent.push((channel_id, content.to_string()));
        Ok(Message {
            id: MessageId(self.next_id()),
            channel_id,
            content: content.to_string(),
            author: state.bot.clone(),
        })
    }

    async fn create_webhook(
        &self,
        _token: &str,
        channel_id: ChannelId,
        name: &str,
    ) -> Result<Webhook> {
        self.record("create_webhook");
        let id = self.next_id();
        let webhook = Webhook {
            id: WebhookId(id),
            channel_id: Some(channel_id),
            guild_id: None,
            name: Some(name.to_string()),
            token: Some(format!("hook-token-{}", id)),
        };
        self.state
            .lock()
            .webhooks
            .entry(channel_id)
            .or_default()
            .push(webhook.clone());
        Ok(webhook)
    }

    async fn list_webhooks(&self, _token: &str, channel_id: ChannelId) -> Result<Vec<Webhook>> {
        self.record("list_webhooks");
        Ok(self
            .state
            .lock()
            .webhooks
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute_webhook(
        &self,
        webhook_id: WebhookId,
        webhook_token: &str,
        content: &str,
    ) -> Result<()> {
        self.record("execute_webhook");
        let mut state = self.state.lock();
        let known = state
            .webhooks
            .values()
            .flatten()
            .any(|w| w.id == webhook_id && w.token.as_deref() == Some(webhook_token));
        if !known {
            return Err(GuildBridgeError::discord_with_status(
                "HTTP 404: Unknown Webhook",
                404,
            ));
        }
        state
            .executed_webhooks
            .push((webhook_id, content.to_string()));
        Ok(())
    }

    async fn delete_webhook(&self, _token: &str, webhook_id: WebhookId) -> Result<()> {
        self.record("delete_webhook");
        let mut state = self.state.lock();
        let mut removed = false;
        for hooks in state.webhooks.values_mut() {
            let before = hooks.len();
            hooks.retain(|w| w.id != webhook_id);
            removed |= hooks.len() != before;
        }
        if removed {
            Ok(())
        } else {
            Err(GuildBridgeError::discord_with_status(
                "HTTP 404: Unknown Webhook",
                404,
            ))
        }
    }
}
