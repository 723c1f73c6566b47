//! Transfer job and transferred-user records.

use chrono::{DateTime, Utc};
use guildbridge_common::{percent_floor, GuildBridgeError, GuildId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a transfer job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, for human-facing messages
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = GuildBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self).map_err(|_| {
            GuildBridgeError::validation_field(
                format!("'{}' is not a valid transfer ID", s.trim()),
                "transferId",
            )
        })
    }
}

/// Lifecycle status of a transfer job. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStatus {
    /// Batches are still being processed
    InProgress,
    /// Every user was processed
    Completed,
    /// Stopped on request
    Cancelled,
}

impl TransferStatus {
    /// Whether no further processing happens in this state
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Wire name of the status
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = GuildBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in-progress" | "in_progress" | "inprogress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(GuildBridgeError::validation_field(
                format!("unknown transfer status '{}'", other),
                "status",
            )),
        }
    }
}

/// A transfer of `amount` users into a guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferJob {
    /// Job identifier
    pub transfer_id: TransferId,
    /// Destination guild
    pub guild_id: GuildId,
    /// Destination guild name at creation time
    pub guild_name: String,
    /// Users requested
    pub amount: u32,
    /// Users processed so far; never decreases
    pub users_processed: u32,
    /// `floor(users_processed / amount * 100)`
    pub progress: u8,
    /// Lifecycle status
    pub status: TransferStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl TransferJob {
    /// A fresh in-progress job with nothing processed
    pub fn new(
        transfer_id: TransferId,
        guild_id: GuildId,
        guild_name: impl Into<String>,
        amount: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            transfer_id,
            guild_id,
            guild_name: guild_name.into(),
            amount,
            users_processed: 0,
            progress: 0,
            status: TransferStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }

    /// Users still to process
    pub fn remaining(&self) -> u32 {
        self.amount.saturating_sub(self.users_processed)
    }
}

/// Integer progress percentage for `processed` out of `amount`
pub fn compute_progress(processed: u32, amount: u32) -> u8 {
    percent_floor(u64::from(processed), u64::from(amount))
}

/// Status of an individual transferred user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Not yet moved
    Pending,
    /// Moved into the destination guild
    Transferred,
}

/// A user belonging to a transfer job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferUser {
    /// Owning job
    pub transfer_id: TransferId,
    /// Synthetic user identifier, unique within the job
    pub user_id: String,
    /// Display name
    pub username: String,
    /// Transfer status of this user
    pub status: UserStatus,
    /// When the user was transferred
    pub transferred_at: Option<DateTime<Utc>>,
}

impl TransferUser {
    /// The synthetic user at zero-based `index` of a job, already transferred
    pub fn synthetic(transfer_id: TransferId, index: u32, now: DateTime<Utc>) -> Self {
        let number = index + 1;
        Self {
            transfer_id,
            user_id: format!("{}-{:05}", transfer_id.short(), number),
            username: format!("user_{}", number),
            status: UserStatus::Transferred,
            transferred_at: Some(now),
        }
    }
}
