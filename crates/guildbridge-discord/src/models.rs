//! Discord REST resource models.
//!
//! Only the fields GuildBridge reads are modeled; unknown fields are ignored
//! and optional ones default, so partial payloads deserialize cleanly.

use guildbridge_common::{ChannelId, GuildId, MessageId, RoleId, UserId, WebhookId};
use serde::{Deserialize, Serialize};

/// Channel type value for a guild text channel.
pub const CHANNEL_TYPE_GUILD_TEXT: u8 = 0;

/// A Discord user, including the bot's own identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: UserId,
    /// Username
    pub username: String,
    /// Legacy discriminator; "0" for migrated usernames
    #[serde(default = "default_discriminator")]
    pub discriminator: String,
    /// Display name
    #[serde(default)]
    pub global_name: Option<String>,
    /// Whether the account is a bot
    #[serde(default)]
    pub bot: bool,
}

fn default_discriminator() -> String {
    "0".to_string()
}

impl User {
    /// `name#1234`, or just the username when the discriminator is "0".
    pub fn tag(&self) -> String {
        if self.discriminator == "0" {
            self.username.clone()
        } else {
            format!("{}#{}", self.username, self.discriminator)
        }
    }
}

/// A guild as returned by `/users/@me/guilds` or `/guilds/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    /// Guild ID
    pub id: GuildId,
    /// Guild name
    pub name: String,
    /// Icon hash
    #[serde(default)]
    pub icon: Option<String>,
    /// Channel where Discord posts system messages
    #[serde(default)]
    pub system_channel_id: Option<ChannelId>,
    /// Approximate member count, present with `with_counts=true`
    #[serde(default)]
    pub approximate_member_count: Option<u64>,
    /// Approximate online member count
    #[serde(default)]
    pub approximate_presence_count: Option<u64>,
}

/// A channel. Only guild channels are of interest here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel ID
    pub id: ChannelId,
    /// Raw channel type
    #[serde(rename = "type")]
    pub kind: u8,
    /// Owning guild; absent on some payloads
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// Channel name
    #[serde(default)]
    pub name: Option<String>,
    /// Sort position
    #[serde(default)]
    pub position: Option<i32>,
}

impl Channel {
    /// Whether messages can be posted to this channel.
    pub fn is_text(&self) -> bool {
        self.kind == CHANNEL_TYPE_GUILD_TEXT
    }
}

/// A guild role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role ID
    pub id: RoleId,
    /// Role name
    pub name: String,
    /// RGB color as an integer
    #[serde(default)]
    pub color: u32,
    /// Sort position
    #[serde(default)]
    pub position: i32,
    /// Whether an integration manages the role
    #[serde(default)]
    pub managed: bool,
}

/// A guild member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// The underlying user
    #[serde(default)]
    pub user: Option<User>,
    /// Guild nickname
    #[serde(default)]
    pub nick: Option<String>,
    /// Role IDs held in the guild
    #[serde(default)]
    pub roles: Vec<RoleId>,
    /// ISO8601 join timestamp
    #[serde(default)]
    pub joined_at: Option<String>,
}

/// A posted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID
    pub id: MessageId,
    /// Channel the message was posted to
    pub channel_id: ChannelId,
    /// Text content
    #[serde(default)]
    pub content: String,
    /// Author
    #[serde(default)]
    pub author: Option<User>,
}

/// A channel webhook.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    /// Webhook ID
    pub id: WebhookId,
    /// Channel the webhook posts to
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    /// Owning guild
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// Default display name
    #[serde(default)]
    pub name: Option<String>,
    /// Secure token used to execute the webhook
    #[serde(default)]
    pub token: Option<String>,
}

impl std::fmt::Debug for Webhook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Webhook")
            .field("id", &self.id)
            .field("channel_id", &self.channel_id)
            .field("guild_id", &self.guild_id)
            .field("name", &self.name)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateMessage<'a> {
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateWebhook<'a> {
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExecuteWebhook<'a> {
    pub content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
}

/// Error body Discord returns with non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct DiscordErrorBody {
    pub message: String,
    #[serde(default)]
    pub code: Option<u64>,
}
