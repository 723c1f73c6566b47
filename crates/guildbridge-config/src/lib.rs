//! # GuildBridge Config
//!
//! Typed configuration for GuildBridge.
//!
//! Configuration is read from a YAML file, overridden by a handful of
//! environment variables, validated as a whole and then shared through a
//! lock-free [`ConfigCache`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod defaults;
pub mod loader;
pub mod schema;
pub mod validator;

pub use cache::*;
pub use defaults::*;
pub use loader::*;
pub use schema::*;
pub use validator::*;
