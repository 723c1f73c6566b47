//! # GuildBridge Transfer
//!
//! Incremental user transfer jobs. A job moves a requested number of users
//! into a guild in batches: the first batch inline, the rest on a background
//! schedule. Jobs and users live behind the [`TransferStore`] trait, whose
//! change feed drives [`TransferWatch`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod model;
pub mod orchestrator;
pub mod store;
pub mod watch;

pub use model::{
    compute_progress, TransferId, TransferJob, TransferStatus, TransferUser, UserStatus,
};
pub use orchestrator::{
    StartOutcome, TransferError, TransferOrchestrator, TransferReport, TransferResult,
    TransferSettings, TransferSummary,
};
pub use store::{
    JobPatch, JobQuery, MemoryStore, StoreEvent, Subscription, Table, TransferStore,
};
pub use watch::TransferWatch;
