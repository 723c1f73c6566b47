//! Role links recorded by the `set` command. One link per guild.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use guildbridge_common::{GuildId, RoleId};
use serde::{Deserialize, Serialize};

/// A role linked in a guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleLink {
    /// Guild
    pub guild_id: GuildId,
    /// Guild name at link time
    pub guild_name: String,
    /// Linked role
    pub role_id: RoleId,
    /// Role name at link time
    pub role_name: String,
    /// When the link was recorded
    pub linked_at: DateTime<Utc>,
}

/// Registry of role links keyed by guild
#[derive(Debug, Default)]
pub struct RoleLinkRegistry {
    links: DashMap<GuildId, RoleLink>,
}

impl RoleLinkRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a link, replacing and returning any earlier link for the guild
    pub fn link(&self, link: RoleLink) -> Option<RoleLink> {
        self.links.insert(link.guild_id, link)
    }

    /// Link of a guild
    pub fn get(&self, guild_id: GuildId) -> Option<RoleLink> {
        self.links.get(&guild_id).map(|l| l.clone())
    }

    /// Remove the link of a guild
    pub fn unlink(&self, guild_id: GuildId) -> Option<RoleLink> {
        self.links.remove(&guild_id).map(|(_, link)| link)
    }

    /// All links, most recent first
    pub fn list(&self) -> Vec<RoleLink> {
        let mut links: Vec<RoleLink> = self.links.iter().map(|e| e.value().clone()).collect();
        links.sort_by(|a, b| b.linked_at.cmp(&a.linked_at));
        links
    }

    /// Number of linked guilds
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no guild is linked
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
