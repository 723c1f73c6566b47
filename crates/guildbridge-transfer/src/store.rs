//! Transfer persistence.
//!
//! [`TransferStore`] is the seam to whatever backs the `transfers` and
//! `transfer_users` tables. [`MemoryStore`] keeps both in process and
//! publishes every change on a broadcast channel.

use crate::model::{TransferId, TransferJob, TransferStatus, TransferUser};
use async_trait::async_trait;
use chrono::Utc;
use guildbridge_common::{GuildBridgeError, Result};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 256;

/// Store tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Transfer jobs
    Transfers,
    /// Users of transfer jobs
    TransferUsers,
}

impl Table {
    /// Table name
    pub fn name(self) -> &'static str {
        match self {
            Self::Transfers => "transfers",
            Self::TransferUsers => "transfer_users",
        }
    }
}

/// Partial update of a transfer job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPatch {
    /// New processed count
    pub users_processed: Option<u32>,
    /// New progress percentage
    pub progress: Option<u8>,
    /// New status
    pub status: Option<TransferStatus>,
    /// Apply only when the row currently has this status
    pub only_if_status: Option<TransferStatus>,
}

impl JobPatch {
    /// Set processed count and progress
    pub fn progress(users_processed: u32, progress: u8) -> Self {
        Self {
            users_processed: Some(users_processed),
            progress: Some(progress),
            ..Self::default()
        }
    }

    /// Set the status
    pub fn status(status: TransferStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Also set the status
    pub fn with_status(mut self, status: TransferStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Guard the update on the current status
    pub fn only_if(mut self, status: TransferStatus) -> Self {
        self.only_if_status = Some(status);
        self
    }
}

/// Job listing filter, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobQuery {
    /// Keep only jobs in this status
    pub status: Option<TransferStatus>,
    /// Return at most this many jobs
    pub limit: Option<usize>,
}

impl JobQuery {
    /// Every job
    pub fn all() -> Self {
        Self::default()
    }

    /// Jobs in `status`
    pub fn with_status(status: TransferStatus) -> Self {
        Self {
            status: Some(status),
            limit: None,
        }
    }

    /// Cap the number of results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A change in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A job row was inserted
    JobInserted(TransferJob),
    /// A job row was updated; carries the new row
    JobUpdated(TransferJob),
    /// User rows were inserted for a job
    UsersInserted {
        /// Owning job
        transfer_id: TransferId,
        /// Number of rows inserted
        count: usize,
    },
}

impl StoreEvent {
    /// Table the event belongs to
    pub fn table(&self) -> Table {
        match self {
            Self::JobInserted(_) | Self::JobUpdated(_) => Table::Transfers,
            Self::UsersInserted { .. } => Table::TransferUsers,
        }
    }

    /// Job the event concerns
    pub fn transfer_id(&self) -> TransferId {
        match self {
            Self::JobInserted(job) | Self::JobUpdated(job) => job.transfer_id,
            Self::UsersInserted { transfer_id, .. } => *transfer_id,
        }
    }

    /// The job row, for job events
    pub fn job(&self) -> Option<&TransferJob> {
        match self {
            Self::JobInserted(job) | Self::JobUpdated(job) => Some(job),
            Self::UsersInserted { .. } => None,
        }
    }
}

/// Change feed scoped to a table and optionally one job
pub struct Subscription {
    rx: broadcast::Receiver<StoreEvent>,
    table: Table,
    transfer_id: Option<TransferId>,
}

impl Subscription {
    /// Wrap a broadcast receiver with a scope filter
    pub fn new(
        rx: broadcast::Receiver<StoreEvent>,
        table: Table,
        transfer_id: Option<TransferId>,
    ) -> Self {
        Self {
            rx,
            table,
            transfer_id,
        }
    }

    fn matches(&self, event: &StoreEvent) -> bool {
        event.table() == self.table
            && self
                .transfer_id
                .map_or(true, |id| event.transfer_id() == id)
    }

    /// Next matching event, or `None` once the store is gone.
    ///
    /// Events dropped because the subscriber fell behind are skipped.
    pub async fn next(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        table = self.table.name(),
                        skipped, "Subscriber lagged, events dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Persistence for transfer jobs and their users
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Insert a new job row
    async fn insert_job(&self, job: &TransferJob) -> Result<()>;

    /// Apply `patch` to a job.
    ///
    /// Returns the updated row, or `None` when the job does not exist or its
    /// status did not match `patch.only_if_status`.
    async fn update_job(&self, transfer_id: TransferId, patch: JobPatch)
        -> Result<Option<TransferJob>>;

    /// Fetch one job
    async fn get_job(&self, transfer_id: TransferId) -> Result<Option<TransferJob>>;

    /// List jobs, newest first
    async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<TransferJob>>;

    /// Insert user rows. A row whose `(transfer_id, user_id)` already exists
    /// is left as it is.
    async fn insert_users(&self, users: &[TransferUser]) -> Result<()>;

    /// Users of a job in insertion order
    async fn list_users(&self, transfer_id: TransferId) -> Result<Vec<TransferUser>>;

    /// Follow changes to `table`, optionally for a single job
    fn subscribe(&self, table: Table, transfer_id: Option<TransferId>) -> Subscription;
}

#[derive(Default)]
struct Tables {
    jobs: HashMap<TransferId, (u64, TransferJob)>,
    users: HashMap<TransferId, Vec<TransferUser>>,
    user_keys: HashSet<(TransferId, String)>,
    next_seq: u64,
}

/// In-process [`TransferStore`]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tables: RwLock::new(Tables::default()),
            events,
        }
    }

    fn publish(&self, event: StoreEvent) {
        // No receivers is not an error.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl TransferStore for MemoryStore {
    async fn insert_job(&self, job: &TransferJob) -> Result<()> {
        {
            let mut tables = self.tables.write();
            if tables.jobs.contains_key(&job.transfer_id) {
                return Err(GuildBridgeError::store(format!(
                    "Transfer {} already exists",
                    job.transfer_id
                )));
            }
            let seq = tables.next_seq;
            tables.next_seq += 1;
            tables.jobs.insert(job.transfer_id, (seq, job.clone()));
        }
        debug!(transfer_id = %job.transfer_id, "Inserted transfer");
        self.publish(StoreEvent::JobInserted(job.clone()));
        Ok(())
    }

    async fn update_job(
        &self,
        transfer_id: TransferId,
        patch: JobPatch,
    ) -> Result<Option<TransferJob>> {
        let updated = {
            let mut tables = self.tables.write();
            let Some((_, job)) = tables.jobs.get_mut(&transfer_id) else {
                return Ok(None);
            };
            if let Some(expected) = patch.only_if_status {
                if job.status != expected {
                    debug!(
                        %transfer_id,
                        current = %job.status,
                        %expected,
                        "Guarded update skipped"
                    );
                    return Ok(None);
                }
            }
            if let Some(processed) = patch.users_processed {
                job.users_processed = processed;
            }
            if let Some(progress) = patch.progress {
                job.progress = progress;
            }
            if let Some(status) = patch.status {
                job.status = status;
            }
            job.updated_at = Utc::now();
            job.clone()
        };
        self.publish(StoreEvent::JobUpdated(updated.clone()));
        Ok(Some(updated))
    }

    async fn get_job(&self, transfer_id: TransferId) -> Result<Option<TransferJob>> {
        Ok(self
            .tables
            .read()
            .jobs
            .get(&transfer_id)
            .map(|(_, job)| job.clone()))
    }

    async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<TransferJob>> {
        let tables = self.tables.read();
        let mut rows: Vec<&(u64, TransferJob)> = tables
            .jobs
            .values()
            .filter(|(_, job)| query.status.map_or(true, |status| job.status == status))
            .collect();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        Ok(rows
            .into_iter()
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(_, job)| job.clone())
            .collect())
    }

    async fn insert_users(&self, users: &[TransferUser]) -> Result<()> {
        if users.is_empty() {
            return Ok(());
        }
        let mut per_job: HashMap<TransferId, usize> = HashMap::new();
        {
            let mut tables = self.tables.write();
            for user in users {
                if !tables
                    .user_keys
                    .insert((user.transfer_id, user.user_id.clone()))
                {
                    debug!(transfer_id = %user.transfer_id, user_id = %user.user_id, "User row already present");
                    continue;
                }
                tables
                    .users
                    .entry(user.transfer_id)
                    .or_default()
                    .push(user.clone());
                *per_job.entry(user.transfer_id).or_insert(0) += 1;
            }
        }
        for (transfer_id, count) in per_job {
            self.publish(StoreEvent::UsersInserted { transfer_id, count });
        }
        Ok(())
    }

    async fn list_users(&self, transfer_id: TransferId) -> Result<Vec<TransferUser>> {
        Ok(self
            .tables
            .read()
            .users
            .get(&transfer_id)
            .cloned()
            .unwrap_or_default())
    }

    fn subscribe(&self, table: Table, transfer_id: Option<TransferId>) -> Subscription {
        Subscription::new(self.events.subscribe(), table, transfer_id)
    }
}
