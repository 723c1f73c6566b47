//! Command dispatch.
//!
//! A command passes three guards before it runs: the per-signature cooldown,
//! the in-flight check, then the connection precondition. Guard rejections
//! never reach Discord.

use crate::command::{canonical_name, Command};
use crate::cooldown::{CooldownManager, GuardError, InFlightSet};
use crate::error::CommandError;
use crate::history::{CommandHistory, CommandHistoryEntry, DEFAULT_HISTORY_LIMIT};
use crate::notice::Notice;
use crate::role_link::{RoleLink, RoleLinkRegistry};
use chrono::Utc;
use guildbridge_common::{GuildBridgeError, GuildId, RoleId};
use guildbridge_discord::{BotConnectionState, CheckOutcome, DiscordApi, Guild, MAX_MEMBER_LIMIT};
use guildbridge_transfer::TransferOrchestrator;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Per-signature cooldown
    pub cooldown: Duration,
    /// History entries kept
    pub history_limit: usize,
    /// Guilds sampled by `authorized`
    pub authorized_sample_guilds: usize,
    /// Per-guild estimate when no member data exists
    pub estimated_members_per_guild: u64,
    /// Tokens refreshed per guild by `refreshtokens`
    pub tokens_per_guild: u64,
    /// Simulated refresh failure percentage
    pub refresh_failure_percent: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(2),
            history_limit: DEFAULT_HISTORY_LIMIT,
            authorized_sample_guilds: 3,
            estimated_members_per_guild: 50,
            tokens_per_guild: 10,
            refresh_failure_percent: 5,
        }
    }
}

/// Successful command result: `{success: true, command, ...payload}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandReply {
    /// Always `true`
    pub success: bool,
    /// Canonical command name
    pub command: String,
    /// Command-specific fields
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl CommandReply {
    /// Tag `payload` with the command name. Non-object payloads land under `data`.
    pub fn new(command: &str, payload: impl Serialize) -> Result<Self, CommandError> {
        let payload = match serde_json::to_value(payload).map_err(GuildBridgeError::from)? {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        Ok(Self {
            success: true,
            command: command.to_string(),
            payload,
        })
    }

    /// Payload field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Reply as a JSON value
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A failed dispatch with the notice to show for it
#[derive(Debug, Error)]
#[error("{error}")]
pub struct CommandFailure {
    /// Canonical command name, `None` when the line did not parse to a command
    pub command: Option<&'static str>,
    /// Underlying error
    pub error: CommandError,
    /// User-facing notice
    pub notice: Notice,
}

impl CommandFailure {
    fn new(command: Option<&'static str>, error: CommandError) -> Self {
        let notice = Notice::for_failure(command, &error);
        Self {
            command,
            error,
            notice,
        }
    }

    /// Failure as a JSON value
    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "command": self.command,
            "error": self.error.to_string(),
            "kind": self.error.kind(),
            "notice": self.notice,
        })
    }
}

/// Which tier produced the `authorized` count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CountSource {
    /// Member listings of the sampled guilds
    MemberListing,
    /// Sum of guild approximate member counts
    ApproximateCount,
    /// Fixed per-guild estimate
    Estimate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizedCount {
    count: u64,
    source: CountSource,
    guild_count: usize,
    sampled_guilds: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshReport {
    refreshed: u64,
    failed: u64,
    guild_count: usize,
}

/// Routes commands to the gateway and the transfer orchestrator
pub struct CommandDispatcher {
    api: Arc<dyn DiscordApi>,
    connection: BotConnectionState,
    transfers: TransferOrchestrator,
    settings: DispatcherSettings,
    cooldowns: CooldownManager,
    in_flight: InFlightSet,
    history: Mutex<CommandHistory>,
    role_links: RoleLinkRegistry,
}

impl CommandDispatcher {
    /// Create a dispatcher
    pub fn new(
        api: Arc<dyn DiscordApi>,
        connection: BotConnectionState,
        transfers: TransferOrchestrator,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            api,
            connection,
            transfers,
            cooldowns: CooldownManager::new(settings.cooldown),
            in_flight: InFlightSet::new(),
            history: Mutex::new(CommandHistory::new(settings.history_limit)),
            role_links: RoleLinkRegistry::new(),
            settings,
        }
    }

    /// Connection state used for the precondition
    pub fn connection(&self) -> &BotConnectionState {
        &self.connection
    }

    /// Transfer orchestrator
    pub fn transfers(&self) -> &TransferOrchestrator {
        &self.transfers
    }

    /// Recorded role links
    pub fn role_links(&self) -> &RoleLinkRegistry {
        &self.role_links
    }

    /// Copy of the history, newest first
    pub fn history(&self) -> Vec<CommandHistoryEntry> {
        self.history.lock().entries().cloned().collect()
    }

    /// Run `f` against the history
    pub fn with_history<R>(&self, f: impl FnOnce(&mut CommandHistory) -> R) -> R {
        f(&mut self.history.lock())
    }

    /// Parse and execute a command line
    #[instrument(skip(self, token))]
    pub async fn dispatch(&self, token: &str, line: &str) -> Result<CommandReply, CommandFailure> {
        match Command::parse(line) {
            Ok(command) => self.run(token, command, line.trim()).await,
            Err(e) => {
                warn!(line, error = %e, "Command rejected");
                self.record(line.trim(), Err(&e));
                let name = line.split_whitespace().next().and_then(canonical_name);
                Err(CommandFailure::new(name, e))
            }
        }
    }

    /// Execute an already-typed command
    pub async fn execute(&self, token: &str, command: Command) -> Result<CommandReply, CommandFailure> {
        let line = command.signature();
        self.run(token, command, &line).await
    }

    async fn run(&self, token: &str, command: Command, raw: &str) -> Result<CommandReply, CommandFailure> {
        let name = command.name();
        let signature = command.signature();

        if let Err(e) = self.cooldowns.try_acquire(&signature) {
            debug!(%signature, "Command on cooldown");
            return Err(CommandFailure::new(Some(name), guard_error(e)));
        }
        let _guard = match self.in_flight.try_enter(&signature) {
            Ok(guard) => guard,
            Err(e) => {
                debug!(%signature, "Command already running");
                return Err(CommandFailure::new(Some(name), guard_error(e)));
            }
        };

        let result = match self.ensure_connected(token).await {
            Ok(()) => self.route(token, &command).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(reply) => {
                info!(command = name, "Command succeeded");
                self.record(raw, Ok(&reply));
                Ok(reply)
            }
            Err(e) => {
                error!(command = name, error = %e, "Command failed");
                self.record(raw, Err(&e));
                Err(CommandFailure::new(Some(name), e))
            }
        }
    }

    fn record(&self, raw: &str, outcome: Result<&CommandReply, &CommandError>) {
        let (success, result) = match outcome {
            Ok(reply) => (true, reply.to_json().to_string()),
            Err(e) => (false, e.to_string()),
        };
        self.history.lock().record(raw, success, result);
    }

    async fn ensure_connected(&self, token: &str) -> Result<(), CommandError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CommandError::NotConnected {
                reason: Some("no bot token configured".to_string()),
            });
        }
        if self.connection.token().as_deref() != Some(token) {
            self.connection.set_token(Some(token.to_string()));
        }
        if self.connection.is_connected() {
            return Ok(());
        }

        debug!("Bot not connected, checking once before running command");
        let state = match self.connection.check_connection().await {
            CheckOutcome::Checked(state) => state,
            CheckOutcome::InFlight => self.connection.wait_until_settled().await,
            CheckOutcome::NoToken => {
                return Err(CommandError::NotConnected {
                    reason: Some("no bot token configured".to_string()),
                })
            }
        };

        if state.is_connected() {
            Ok(())
        } else {
            Err(CommandError::NotConnected {
                reason: state.error,
            })
        }
    }

    async fn route(&self, token: &str, command: &Command) -> Result<CommandReply, CommandError> {
        let name = command.name();
        match command {
            Command::Test => {
                let bot = self.api.check_status(token).await?;
                CommandReply::new(name, json!({ "bot": bot }))
            }
            Command::Authorized => {
                let count = self.authorized_count(token).await?;
                CommandReply::new(name, count)
            }
            Command::Progress => {
                let summary = self.transfers.summary().await?;
                CommandReply::new(name, summary)
            }
            Command::Join { guild_id, amount } => {
                let outcome = self.transfers.start(token, *guild_id, *amount).await?;
                CommandReply::new(name, outcome)
            }
            Command::TransferStatus { transfer_id } => {
                let report = self.transfers.status(*transfer_id).await?;
                CommandReply::new(name, report)
            }
            Command::Set { role_id, server_id } => {
                let link = self.link_role(token, *role_id, *server_id).await?;
                CommandReply::new(name, json!({ "link": link }))
            }
            Command::RefreshTokens => {
                let report = self.refresh_tokens(token).await?;
                CommandReply::new(name, report)
            }
            Command::GetGuilds => {
                let guilds = self.api.list_guilds(token).await?;
                CommandReply::new(name, json!({ "guilds": guilds }))
            }
            Command::GetChannels { guild_id } => {
                let channels = self.api.list_channels(token, *guild_id).await;
                CommandReply::new(name, json!({ "guildId": guild_id, "channels": channels }))
            }
            Command::GetRoles { guild_id } => {
                let roles = self.api.list_roles(token, *guild_id).await;
                CommandReply::new(name, json!({ "guildId": guild_id, "roles": roles }))
            }
            Command::GetMembers { guild_id, limit } => {
                let members = self.api.list_members(token, *guild_id, *limit).await;
                CommandReply::new(
                    name,
                    json!({ "guildId": guild_id, "limit": limit, "members": members }),
                )
            }
        }
    }

    async fn authorized_count(&self, token: &str) -> Result<AuthorizedCount, CommandError> {
        let guilds = self.api.list_guilds(token).await?;
        let sample: Vec<&Guild> = guilds
            .iter()
            .take(self.settings.authorized_sample_guilds)
            .collect();

        let mut listed = 0u64;
        let mut any_listed = false;
        for guild in &sample {
            match self
                .api
                .try_list_members(token, guild.id, MAX_MEMBER_LIMIT)
                .await
            {
                Ok(members) => {
                    any_listed = true;
                    listed += members.len() as u64;
                }
                Err(e) => warn!(guild_id = %guild.id, error = %e, "Member listing failed"),
            }
        }

        let (count, source) = if any_listed {
            (listed, CountSource::MemberListing)
        } else {
            let approximate: Vec<u64> = guilds
                .iter()
                .filter_map(|g| g.approximate_member_count)
                .collect();
            if approximate.is_empty() {
                (
                    self.settings.estimated_members_per_guild * guilds.len() as u64,
                    CountSource::Estimate,
                )
            } else {
                (approximate.iter().sum(), CountSource::ApproximateCount)
            }
        };

        debug!(count, ?source, guilds = guilds.len(), "Authorized members counted");
        Ok(AuthorizedCount {
            count,
            source,
            guild_count: guilds.len(),
            sampled_guilds: sample.len(),
        })
    }

    async fn link_role(&self, token: &str, role_id: RoleId, guild_id: GuildId) -> Result<RoleLink, CommandError> {
        let guild = self
            .api
            .get_guild(token, guild_id)
            .await
            .map_err(|e| CommandError::CheckFailed {
                check: "guild",
                message: e.to_string(),
            })?;

        let roles = self
            .api
            .try_list_roles(token, guild_id)
            .await
            .map_err(|e| CommandError::CheckFailed {
                check: "role",
                message: e.to_string(),
            })?;
        let role = roles
            .into_iter()
            .find(|r| r.id == role_id)
            .ok_or_else(|| CommandError::CheckFailed {
                check: "role",
                message: format!("role {} does not exist in {}", role_id, guild.name),
            })?;

        let link = RoleLink {
            guild_id,
            guild_name: guild.name,
            role_id,
            role_name: role.name,
            linked_at: Utc::now(),
        };
        if let Some(previous) = self.role_links.link(link.clone()) {
            info!(%guild_id, previous_role = %previous.role_id, "Replaced role link");
        }
        Ok(link)
    }

    async fn refresh_tokens(&self, token: &str) -> Result<RefreshReport, CommandError> {
        let guilds = self.api.list_guilds(token).await?;
        let refreshed = self.settings.tokens_per_guild * guilds.len() as u64;
        let failed = refreshed * self.settings.refresh_failure_percent / 100;
        Ok(RefreshReport {
            refreshed,
            failed,
            guild_count: guilds.len(),
        })
    }
}

fn guard_error(error: GuardError) -> CommandError {
    match error {
        GuardError::OnCooldown {
            signature,
            remaining,
        } => CommandError::OnCooldown {
            signature,
            remaining,
        },
        GuardError::AlreadyRunning(signature) => CommandError::AlreadyRunning(signature),
    }
}
