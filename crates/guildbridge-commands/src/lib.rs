//! # GuildBridge Commands
//!
//! Bot commands for GuildBridge.
//!
//! Command lines parse into typed [`Command`] values. The
//! [`CommandDispatcher`] guards each one with a per-signature cooldown, an
//! in-flight check and the bot connection precondition, then routes it to
//! Discord or the transfer orchestrator. Every execution lands in a bounded
//! [`CommandHistory`]; failures carry a [`Notice`] with a stable identifier.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod command;
pub mod cooldown;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod notice;
pub mod role_link;

pub use command::{Command, DEFAULT_MEMBER_LIMIT};
pub use cooldown::{CooldownManager, GuardError, InFlightGuard, InFlightSet};
pub use dispatcher::{CommandDispatcher, CommandFailure, CommandReply, CountSource, DispatcherSettings};
pub use error::CommandError;
pub use history::{CommandHistory, CommandHistoryEntry, DEFAULT_HISTORY_LIMIT};
pub use notice::{Notice, NoticeLevel};
pub use role_link::{RoleLink, RoleLinkRegistry};
