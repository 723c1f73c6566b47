//! # GuildBridge Discord
//!
//! Discord REST access for GuildBridge: a rate-limit aware HTTP client, the
//! resource models, the [`DiscordApi`] operations and their REST-backed
//! implementation, and the bot connection state machine.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod connection;
pub mod gateway;
pub mod http;
pub mod models;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use api::{DiscordApi, MAX_MEMBER_LIMIT};
pub use connection::{
    BotConnection, BotConnectionState, CheckOutcome, ConnectionError, ConnectionSettings,
    ConnectionStatus,
};
pub use gateway::{DiscordRestGateway, GatewaySettings};
pub use http::{HttpClientConfig, RateLimitedHttpClient, RequestOptions};
pub use models::{Channel, Guild, Member, Message, Role, User, Webhook};
