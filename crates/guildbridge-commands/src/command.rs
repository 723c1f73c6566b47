//! Typed command grammar.
//!
//! A command line is a space-delimited string whose first token names the
//! command (case-insensitive). Each [`Command`] variant carries exactly the
//! arguments that command needs, already validated.

use crate::error::CommandError;
use guildbridge_common::{parse_snowflake, GuildId, RoleId};
use guildbridge_discord::MAX_MEMBER_LIMIT;
use guildbridge_transfer::TransferId;
use std::fmt;
use std::str::FromStr;

/// Member page size when `getMembers` is given no limit
pub const DEFAULT_MEMBER_LIMIT: u16 = 100;

/// A parsed bot command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Probe the bot token
    Test,
    /// Count members the bot can reach
    Authorized,
    /// Transfer totals from the store
    Progress,
    /// Start a transfer
    Join {
        /// Destination guild
        guild_id: GuildId,
        /// Users to transfer
        amount: u32,
    },
    /// Status of one transfer
    TransferStatus {
        /// Transfer to report on
        transfer_id: TransferId,
    },
    /// Link a role in a guild
    Set {
        /// Role to link
        role_id: RoleId,
        /// Guild the role belongs to
        server_id: GuildId,
    },
    /// Simulated token refresh
    RefreshTokens,
    /// Guilds the bot is in
    GetGuilds,
    /// Channels of a guild
    GetChannels {
        /// Guild to list
        guild_id: GuildId,
    },
    /// Roles of a guild
    GetRoles {
        /// Guild to list
        guild_id: GuildId,
    },
    /// Members of a guild
    GetMembers {
        /// Guild to list
        guild_id: GuildId,
        /// Page size, within `1..=1000`
        limit: u16,
    },
}

impl Command {
    /// Every command name, in canonical spelling
    pub const NAMES: [&'static str; 11] = [
        "test",
        "authorized",
        "progress",
        "join",
        "transferStatus",
        "set",
        "refreshtokens",
        "getGuilds",
        "getChannels",
        "getRoles",
        "getMembers",
    ];

    /// Canonical command name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Authorized => "authorized",
            Self::Progress => "progress",
            Self::Join { .. } => "join",
            Self::TransferStatus { .. } => "transferStatus",
            Self::Set { .. } => "set",
            Self::RefreshTokens => "refreshtokens",
            Self::GetGuilds => "getGuilds",
            Self::GetChannels { .. } => "getChannels",
            Self::GetRoles { .. } => "getRoles",
            Self::GetMembers { .. } => "getMembers",
        }
    }

    /// Normalized command line used as the cooldown and de-duplication key
    pub fn signature(&self) -> String {
        self.to_string()
    }

    /// Parse a command line
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        let Some(head) = tokens.next() else {
            return Err(CommandError::UnknownCommand(String::new()));
        };
        let name = canonical_name(head)
            .ok_or_else(|| CommandError::UnknownCommand(head.to_string()))?;
        let mut args = Args { name, tokens };

        let command = match name {
            "test" => Self::Test,
            "authorized" => Self::Authorized,
            "progress" => Self::Progress,
            "refreshtokens" => Self::RefreshTokens,
            "getGuilds" => Self::GetGuilds,
            "join" => {
                let guild_id = args.required("guildId", |v| parse_snowflake(v, "guildId"))?;
                let amount = args.required("amount", parse_amount)?;
                Self::Join {
                    guild_id: GuildId(guild_id),
                    amount,
                }
            }
            "transferStatus" => Self::TransferStatus {
                transfer_id: args.required("transferId", str::parse::<TransferId>)?,
            },
            "set" => {
                let role_id = args.required("roleId", |v| parse_snowflake(v, "roleId"))?;
                let server_id = args.required("serverId", |v| parse_snowflake(v, "serverId"))?;
                Self::Set {
                    role_id: RoleId(role_id),
                    server_id: GuildId(server_id),
                }
            }
            "getChannels" => Self::GetChannels {
                guild_id: GuildId(args.required("guildId", |v| parse_snowflake(v, "guildId"))?),
            },
            "getRoles" => Self::GetRoles {
                guild_id: GuildId(args.required("guildId", |v| parse_snowflake(v, "guildId"))?),
            },
            "getMembers" => {
                let guild_id = GuildId(args.required("guildId", |v| parse_snowflake(v, "guildId"))?);
                let limit = args
                    .optional("limit", parse_limit)?
                    .unwrap_or(DEFAULT_MEMBER_LIMIT);
                Self::GetMembers { guild_id, limit }
            }
            _ => return Err(CommandError::UnknownCommand(head.to_string())),
        };

        Ok(command)
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            Self::Join { guild_id, amount } => write!(f, " {} {}", guild_id, amount),
            Self::TransferStatus { transfer_id } => write!(f, " {}", transfer_id),
            Self::Set { role_id, server_id } => write!(f, " {} {}", role_id, server_id),
            Self::GetChannels { guild_id } | Self::GetRoles { guild_id } => {
                write!(f, " {}", guild_id)
            }
            Self::GetMembers { guild_id, limit } => write!(f, " {} {}", guild_id, limit),
            _ => Ok(()),
        }
    }
}

/// Canonical spelling of a command name, matched case-insensitively
pub(crate) fn canonical_name(token: &str) -> Option<&'static str> {
    Command::NAMES
        .iter()
        .copied()
        .find(|name| name.eq_ignore_ascii_case(token))
}

struct Args<I> {
    name: &'static str,
    tokens: I,
}

impl<'a, I: Iterator<Item = &'a str>> Args<I> {
    fn optional<T, E: fmt::Display>(
        &mut self,
        parameter: &'static str,
        parse: impl FnOnce(&str) -> Result<T, E>,
    ) -> Result<Option<T>, CommandError> {
        match self.tokens.next() {
            Some(value) => parse(value)
                .map(Some)
                .map_err(|e| CommandError::InvalidParameter {
                    command: self.name,
                    parameter,
                    value: value.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn required<T, E: fmt::Display>(
        &mut self,
        parameter: &'static str,
        parse: impl FnOnce(&str) -> Result<T, E>,
    ) -> Result<T, CommandError> {
        self.optional(parameter, parse)?
            .ok_or(CommandError::MissingParameter {
                command: self.name,
                parameter,
            })
    }
}

fn parse_amount(value: &str) -> Result<u32, String> {
    match value.parse::<u32>() {
        Ok(0) => Err("must be greater than zero".to_string()),
        Ok(amount) => Ok(amount),
        Err(_) => Err("must be a positive whole number".to_string()),
    }
}

fn parse_limit(value: &str) -> Result<u16, String> {
    let limit = value
        .parse::<i64>()
        .map_err(|_| "must be a whole number".to_string())?;
    let clamped = limit.clamp(1, i64::from(MAX_MEMBER_LIMIT));
    u16::try_from(clamped).map_err(|e| e.to_string())
}
