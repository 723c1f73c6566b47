//! Common type definitions and newtype wrappers for domain modeling.
//!
//! Discord identifiers are 64-bit snowflakes that the REST API transmits as
//! JSON strings. The wrappers here keep them as `u64` in memory, serialize
//! them back as strings and accept either form when deserializing.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::GuildBridgeError;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw snowflake value.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = GuildBridgeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_snowflake(s, $label).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(SnowflakeVisitor).map(Self)
            }
        }
    };
}

snowflake_id!(
    /// A Discord guild (server) ID.
    GuildId,
    "guildId"
);
snowflake_id!(
    /// A Discord channel ID.
    ChannelId,
    "channelId"
);
snowflake_id!(
    /// A Discord role ID.
    RoleId,
    "roleId"
);
snowflake_id!(
    /// A Discord user ID.
    UserId,
    "userId"
);
snowflake_id!(
    /// A Discord webhook ID.
    WebhookId,
    "webhookId"
);
snowflake_id!(
    /// A Discord message ID.
    MessageId,
    "messageId"
);

/// Parse a user supplied snowflake, naming the offending field on failure.
pub fn parse_snowflake(input: &str, field: &str) -> Result<u64, GuildBridgeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(GuildBridgeError::validation_field(
            format!("{} cannot be empty", field),
            field,
        ));
    }
    if !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(GuildBridgeError::validation_field(
            format!("{} must be a numeric Discord ID, got '{}'", field, trimmed),
            field,
        ));
    }
    trimmed.parse::<u64>().map_err(|_| {
        GuildBridgeError::validation_field(
            format!("{} is out of range for a Discord ID: '{}'", field, trimmed),
            field,
        )
    })
}

struct SnowflakeVisitor;

impl<'de> Visitor<'de> for SnowflakeVisitor {
    type Value = u64;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a snowflake as a string or unsigned integer")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
        Ok(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
        u64::try_from(value).map_err(|_| E::custom("snowflake cannot be negative"))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
        value
            .parse::<u64>()
            .map_err(|_| E::custom(format!("invalid snowflake '{}'", value)))
    }
}
