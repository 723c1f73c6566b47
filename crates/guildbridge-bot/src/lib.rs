//! # GuildBridge Bot
//!
//! Console front end for the GuildBridge core.
//!
//! Loads configuration, wires the Discord REST gateway, connection state,
//! transfer orchestrator and command dispatcher together, and exposes them
//! through a small CLI: one-shot commands, a JSON line REPL, transfer
//! watching and connection checks.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod cli;
pub mod error;
pub mod repl;

pub use app::App;
pub use cli::{Cli, CliCommand};
pub use error::{BotError, BotResult};
