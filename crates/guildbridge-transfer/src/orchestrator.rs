//! Transfer orchestration
//!
//! A job runs `in-progress → {completed | cancelled}`. `start` processes an
//! initial batch inline; anything left is handled by a background task that
//! runs one batch per interval until the job is complete, cancelled or the
//! orchestrator shuts down. Every progress write is guarded on the row still
//! being in progress, so a cancel is never overwritten.

use crate::model::{compute_progress, TransferId, TransferJob, TransferStatus, TransferUser};
use crate::store::{JobPatch, JobQuery, TransferStore};
use crate::watch::TransferWatch;
use chrono::Utc;
use dashmap::DashMap;
use guildbridge_common::{ChannelId, GuildBridgeError, GuildId};
use guildbridge_discord::{DiscordApi, Guild};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    /// The destination guild does not exist or is not accessible
    #[error("Invalid guild {guild_id}: {reason}")]
    InvalidGuild {
        /// Requested guild
        guild_id: GuildId,
        /// Why the existence check failed
        reason: String,
    },

    /// No job with this ID
    #[error("Transfer {0} not found")]
    NotFound(TransferId),

    /// Rejected input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store or Discord failure
    #[error(transparent)]
    Base(#[from] GuildBridgeError),
}

/// Result type for transfer operations
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Batch sizes and timings
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Users processed inline by `start`
    pub initial_batch_size: u32,
    /// Users processed per background step
    pub batch_size: u32,
    /// Time between background steps
    pub batch_interval: Duration,
    /// Fallback poll interval for watchers
    pub poll_interval: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            initial_batch_size: 25,
            batch_size: 10,
            batch_interval: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Result of starting a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    /// The job after its initial batch
    #[serde(flatten)]
    pub job: TransferJob,
    /// Users still to process in the background
    pub remaining_users: u32,
    /// Channel the start notice was posted to, if any
    pub notified_channel: Option<ChannelId>,
}

/// A job with its users
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReport {
    /// Job row
    #[serde(flatten)]
    pub job: TransferJob,
    /// User rows
    pub users: Vec<TransferUser>,
}

/// Aggregate view across all jobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    /// Jobs that reached `completed`
    pub completed_transfers: usize,
    /// Jobs still in progress
    pub active_transfers: usize,
    /// Users outstanding across in-progress jobs
    pub pending_users: u64,
}

struct JobTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    api: Arc<dyn DiscordApi>,
    store: Arc<dyn TransferStore>,
    settings: TransferSettings,
    tasks: DashMap<TransferId, JobTask>,
    shutdown: CancellationToken,
}

enum StepOutcome {
    Continue,
    Finished,
}

/// Creates and drives transfer jobs
#[derive(Clone)]
pub struct TransferOrchestrator {
    inner: Arc<Inner>,
}

impl TransferOrchestrator {
    /// Create an orchestrator over a Discord API and a store
    pub fn new(
        api: Arc<dyn DiscordApi>,
        store: Arc<dyn TransferStore>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                settings,
                tasks: DashMap::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Backing store
    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.inner.store
    }

    /// Start a transfer of `amount` users into `guild_id`
    #[instrument(skip(self, token))]
    pub async fn start(
        &self,
        token: &str,
        guild_id: GuildId,
        amount: u32,
    ) -> TransferResult<StartOutcome> {
        if amount == 0 {
            return Err(TransferError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }

        let guild = self
            .inner
            .api
            .get_guild(token, guild_id)
            .await
            .map_err(|e| TransferError::InvalidGuild {
                guild_id,
                reason: e.to_string(),
            })?;

        let transfer_id = TransferId::new();
        let notified_channel = self.notify_guild(token, &guild, amount, transfer_id).await;

        let job = TransferJob::new(transfer_id, guild.id, guild.name.clone(), amount, Utc::now());
        self.inner.store.insert_job(&job).await?;
        info!(%transfer_id, guild = %guild.name, amount, "Transfer started");

        let batch = self.inner.settings.initial_batch_size;
        let job = match self.inner.process_batch(&job, batch).await? {
            Some(updated) => updated,
            None => self
                .inner
                .store
                .get_job(transfer_id)
                .await?
                .ok_or(TransferError::NotFound(transfer_id))?,
        };

        if job.status == TransferStatus::InProgress {
            self.spawn_job_task(transfer_id);
        } else {
            info!(%transfer_id, "Transfer completed in initial batch");
        }

        Ok(StartOutcome {
            remaining_users: job.remaining(),
            job,
            notified_channel,
        })
    }

    /// A job with its users
    pub async fn status(&self, transfer_id: TransferId) -> TransferResult<TransferReport> {
        let job = self
            .inner
            .store
            .get_job(transfer_id)
            .await?
            .ok_or(TransferError::NotFound(transfer_id))?;
        let users = self.inner.store.list_users(transfer_id).await?;
        Ok(TransferReport { job, users })
    }

    /// Cancel a job. A job that is already terminal is returned unchanged.
    ///
    /// A batch that already started may still insert its users; it cannot
    /// change the job's progress fields afterwards.
    #[instrument(skip(self))]
    pub async fn cancel(&self, transfer_id: TransferId) -> TransferResult<TransferJob> {
        let job = self
            .inner
            .store
            .get_job(transfer_id)
            .await?
            .ok_or(TransferError::NotFound(transfer_id))?;
        if job.status.is_terminal() {
            debug!(%transfer_id, status = %job.status, "Transfer already finished");
            return Ok(job);
        }

        let patch = JobPatch::status(TransferStatus::Cancelled).only_if(TransferStatus::InProgress);
        let job = match self.inner.store.update_job(transfer_id, patch).await? {
            Some(job) => job,
            None => self
                .inner
                .store
                .get_job(transfer_id)
                .await?
                .ok_or(TransferError::NotFound(transfer_id))?,
        };

        if let Some((_, task)) = self.inner.tasks.remove(&transfer_id) {
            task.cancel.cancel();
        }
        info!(%transfer_id, status = %job.status, "Transfer cancel requested");
        Ok(job)
    }

    /// Completed jobs and outstanding users
    pub async fn summary(&self) -> TransferResult<TransferSummary> {
        let jobs = self.inner.store.list_jobs(&JobQuery::all()).await?;
        Ok(jobs
            .iter()
            .fold(TransferSummary::default(), |mut summary, job| {
                match job.status {
                    TransferStatus::Completed => summary.completed_transfers += 1,
                    TransferStatus::InProgress => {
                        summary.active_transfers += 1;
                        summary.pending_users += u64::from(job.remaining());
                    }
                    TransferStatus::Cancelled => {}
                }
                summary
            }))
    }

    /// Recent jobs, newest first
    pub async fn list(&self, query: &JobQuery) -> TransferResult<Vec<TransferJob>> {
        Ok(self.inner.store.list_jobs(query).await?)
    }

    /// Follow a job until it reaches a terminal state
    pub async fn watch(&self, transfer_id: TransferId) -> TransferResult<TransferWatch> {
        if self.inner.store.get_job(transfer_id).await?.is_none() {
            return Err(TransferError::NotFound(transfer_id));
        }
        Ok(TransferWatch::new(
            Arc::clone(&self.inner.store),
            transfer_id,
            self.inner.settings.poll_interval,
        ))
    }

    /// Number of jobs with a running background task
    pub fn active_tasks(&self) -> usize {
        self.inner.prune_finished();
        self.inner.tasks.len()
    }

    /// Stop every background task and wait for them to exit.
    ///
    /// Jobs stay `in-progress` in the store.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.shutdown.cancel();
        let tasks: Vec<TransferId> = self.inner.tasks.iter().map(|e| *e.key()).collect();
        let count = tasks.len();
        for transfer_id in tasks {
            if let Some((_, task)) = self.inner.tasks.remove(&transfer_id) {
                task.cancel.cancel();
                if tokio::time::timeout(grace, task.handle).await.is_err() {
                    warn!(%transfer_id, "Transfer task did not stop within grace period");
                }
            }
        }
        info!(tasks = count, "Transfer orchestrator shut down");
    }

    fn spawn_job_task(&self, transfer_id: TransferId) {
        self.inner.prune_finished();
        if self.inner.shutdown.is_cancelled() {
            warn!(%transfer_id, "Orchestrator is shut down, not scheduling further batches");
            return;
        }

        let cancel = self.inner.shutdown.child_token();
        let inner = Arc::clone(&self.inner);
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            inner.run_job(transfer_id, task_cancel).await;
        });
        self.inner
            .tasks
            .insert(transfer_id, JobTask { cancel, handle });
        debug!(%transfer_id, "Scheduled background batches");
    }

    /// Post a start notice to the guild's system channel, else its first text
    /// channel. Failures are logged and ignored.
    async fn notify_guild(
        &self,
        token: &str,
        guild: &Guild,
        amount: u32,
        transfer_id: TransferId,
    ) -> Option<ChannelId> {
        let channel_id = match guild.system_channel_id {
            Some(channel_id) => channel_id,
            None => {
                let channels = self.inner.api.list_channels(token, guild.id).await;
                match channels
                    .iter()
                    .filter(|c| c.is_text())
                    .min_by_key(|c| c.position.unwrap_or(i32::MAX))
                {
                    Some(channel) => channel.id,
                    None => {
                        debug!(guild_id = %guild.id, "No text channel to notify");
                        return None;
                    }
                }
            }
        };

        let content = format!(
            "A transfer of {} users into {} has started (transfer {}).",
            amount,
            guild.name,
            transfer_id.short()
        );
        match self
            .inner
            .api
            .send_message(token, channel_id, &content)
            .await
        {
            Ok(_) => Some(channel_id),
            Err(e) => {
                warn!(%channel_id, error = %e, "Failed to post transfer notice");
                None
            }
        }
    }
}

impl Inner {
    fn prune_finished(&self) {
        self.tasks.retain(|_, task| !task.handle.is_finished());
    }

    /// Process up to `batch_size` users and write progress, guarded on the
    /// job still being in progress. `None` means the guard failed.
    async fn process_batch(
        &self,
        job: &TransferJob,
        batch_size: u32,
    ) -> TransferResult<Option<TransferJob>> {
        let count = batch_size.min(job.remaining());
        let now = Utc::now();
        let users: Vec<TransferUser> = (job.users_processed..job.users_processed + count)
            .map(|index| TransferUser::synthetic(job.transfer_id, index, now))
            .collect();
        self.store.insert_users(&users).await?;

        let processed = job.users_processed + count;
        let status = if processed >= job.amount {
            TransferStatus::Completed
        } else {
            TransferStatus::InProgress
        };
        let patch = JobPatch::progress(processed, compute_progress(processed, job.amount))
            .with_status(status)
            .only_if(TransferStatus::InProgress);

        let updated = self.store.update_job(job.transfer_id, patch).await?;
        match &updated {
            Some(job) => debug!(
                transfer_id = %job.transfer_id,
                processed = job.users_processed,
                progress = job.progress,
                "Batch processed"
            ),
            None => debug!(transfer_id = %job.transfer_id, "Batch landed after job left in-progress"),
        }
        Ok(updated)
    }

    async fn step(&self, transfer_id: TransferId) -> TransferResult<StepOutcome> {
        let Some(job) = self.store.get_job(transfer_id).await? else {
            warn!(%transfer_id, "Transfer disappeared from store");
            return Ok(StepOutcome::Finished);
        };
        if job.status != TransferStatus::InProgress {
            debug!(%transfer_id, status = %job.status, "Transfer no longer in progress");
            return Ok(StepOutcome::Finished);
        }

        match self.process_batch(&job, self.settings.batch_size).await? {
            Some(job) if job.status == TransferStatus::Completed => {
                info!(%transfer_id, amount = job.amount, "Transfer completed");
                Ok(StepOutcome::Finished)
            }
            Some(_) => Ok(StepOutcome::Continue),
            None => Ok(StepOutcome::Finished),
        }
    }

    async fn run_job(&self, transfer_id: TransferId, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(%transfer_id, "Transfer task cancelled");
                    break;
                }
                _ = tokio::time::sleep(self.settings.batch_interval) => {}
            }

            match self.step(transfer_id).await {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Finished) => break,
                Err(e) => error!(%transfer_id, error = %e, "Transfer step failed, retrying next interval"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use guildbridge_discord::testing::FakeDiscord;

    const TOKEN: &str = "token";

    fn setup(settings: TransferSettings) -> (Arc<FakeDiscord>, TransferOrchestrator) {
        let fake = Arc::new(
            FakeDiscord::new()
                .with_guild(FakeDiscord::guild(1, "Destination", Some(10)))
                .with_channels(
                    GuildId(1),
                    vec![
                        FakeDiscord::channel(11, 1, "voice", 2),
                        FakeDiscord::text_channel(12, 1, "general"),
                    ],
                ),
        );
        let store = Arc::new(MemoryStore::new());
        let orchestrator = TransferOrchestrator::new(fake.clone(), store, settings);
        (fake, orchestrator)
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let (fake, orchestrator) = setup(TransferSettings::default());
        let err = orchestrator.start(TOKEN, GuildId(1), 0).await.unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
        assert_eq!(fake.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_guild_rejected() {
        let (_, orchestrator) = setup(TransferSettings::default());
        let err = orchestrator.start(TOKEN, GuildId(404), 10).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidGuild { guild_id: GuildId(404), .. }));
        assert!(orchestrator.list(&JobQuery::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notice_goes_to_first_text_channel() {
        let (fake, orchestrator) = setup(TransferSettings::default());
        let outcome = orchestrator.start(TOKEN, GuildId(1), 5).await.unwrap();
        assert_eq!(outcome.notified_channel, Some(ChannelId(12)));
        assert_eq!(fake.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_notice_prefers_system_channel() {
        let (fake, orchestrator) = setup(TransferSettings::default());
        fake.set_system_channel(GuildId(1), Some(ChannelId(99)));
        let outcome = orchestrator.start(TOKEN, GuildId(1), 5).await.unwrap();
        assert_eq!(outcome.notified_channel, Some(ChannelId(99)));
        assert_eq!(fake.calls("list_channels"), 0);
    }

    #[tokio::test]
    async fn test_notice_failure_does_not_abort() {
        let (fake, orchestrator) = setup(TransferSettings::default());
        fake.fail_send("Missing Permissions");
        let outcome = orchestrator.start(TOKEN, GuildId(1), 5).await.unwrap();
        assert!(outcome.notified_channel.is_none());
        assert_eq!(outcome.job.status, TransferStatus::Completed);
    }

    #[tokio::test]
    async fn test_small_transfer_completes_inline() {
        let (_, orchestrator) = setup(TransferSettings::default());
        let outcome = orchestrator.start(TOKEN, GuildId(1), 10).await.unwrap();

        assert_eq!(outcome.remaining_users, 0);
        assert_eq!(outcome.job.status, TransferStatus::Completed);
        assert_eq!(orchestrator.active_tasks(), 0);

        let report = orchestrator.status(outcome.job.transfer_id).await.unwrap();
        assert_eq!(report.job.progress, 100);
        assert_eq!(report.job.users_processed, 10);
        assert_eq!(report.users.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_transfer_progresses_in_batches() {
        let (_, orchestrator) = setup(TransferSettings::default());
        let outcome = orchestrator.start(TOKEN, GuildId(1), 50).await.unwrap();
        let id = outcome.job.transfer_id;

        assert_eq!(outcome.job.users_processed, 25);
        assert_eq!(outcome.job.progress, 50);
        assert_eq!(outcome.remaining_users, 25);
        assert_eq!(orchestrator.active_tasks(), 1);

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        let job = orchestrator.status(id).await.unwrap().job;
        assert_eq!(job.users_processed, 35);
        assert_eq!(job.progress, 70);

        tokio::time::sleep(Duration::from_secs(10)).await;
        let report = orchestrator.status(id).await.unwrap();
        assert_eq!(report.job.status, TransferStatus::Completed);
        assert_eq!(report.job.progress, 100);
        assert_eq!(report.users.len(), 50);
        assert_eq!(orchestrator.active_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_freezes_progress() {
        let (_, orchestrator) = setup(TransferSettings::default());
        let id = orchestrator
            .start(TOKEN, GuildId(1), 100)
            .await
            .unwrap()
            .job
            .transfer_id;

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        let cancelled = orchestrator.cancel(id).await.unwrap();
        assert_eq!(cancelled.status, TransferStatus::Cancelled);
        assert_eq!(cancelled.users_processed, 35);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let job = orchestrator.status(id).await.unwrap().job;
        assert_eq!(job.status, TransferStatus::Cancelled);
        assert_eq!(job.users_processed, 35);
        assert_eq!(job.progress, 35);
        assert_eq!(orchestrator.active_tasks(), 0);
    }

    #[tokio::test]
    async fn test_cancel_terminal_and_missing() {
        let (_, orchestrator) = setup(TransferSettings::default());
        let job = orchestrator.start(TOKEN, GuildId(1), 3).await.unwrap().job;

        let unchanged = orchestrator.cancel(job.transfer_id).await.unwrap();
        assert_eq!(unchanged.status, TransferStatus::Completed);

        let err = orchestrator.cancel(TransferId::new()).await.unwrap_err();
        assert!(matches!(err, TransferError::NotFound(_)));
        let err = orchestrator.status(TransferId::new()).await.unwrap_err();
        assert!(matches!(err, TransferError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_and_shutdown() {
        let (_, orchestrator) = setup(TransferSettings::default());
        orchestrator.start(TOKEN, GuildId(1), 10).await.unwrap();
        orchestrator.start(TOKEN, GuildId(1), 40).await.unwrap();
        orchestrator.start(TOKEN, GuildId(1), 100).await.unwrap();

        let summary = orchestrator.summary().await.unwrap();
        assert_eq!(summary.completed_transfers, 1);
        assert_eq!(summary.active_transfers, 2);
        assert_eq!(summary.pending_users, 15 + 75);

        orchestrator.shutdown(Duration::from_secs(1)).await;
        assert_eq!(orchestrator.active_tasks(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let after = orchestrator.summary().await.unwrap();
        assert_eq!(after, summary);
    }
}
