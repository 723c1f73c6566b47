//! Live view of a single transfer job.
//!
//! Store change events wake the watcher, which then re-reads the row, so a
//! snapshot always reflects the store at emission time. A periodic re-read
//! covers stores whose change feed is lossy or absent.

use crate::model::{TransferId, TransferJob};
use crate::store::{Subscription, Table, TransferStore};
use futures::stream::{self, Stream};
use guildbridge_common::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Emits job snapshots until the job reaches a terminal status
pub struct TransferWatch {
    store: Arc<dyn TransferStore>,
    transfer_id: TransferId,
    subscription: Subscription,
    poll: Interval,
    last: Option<TransferJob>,
    push_open: bool,
    done: bool,
}

impl TransferWatch {
    /// Follow `transfer_id`, re-reading the store every `poll_interval`
    pub fn new(store: Arc<dyn TransferStore>, transfer_id: TransferId, poll_interval: Duration) -> Self {
        let subscription = store.subscribe(Table::Transfers, Some(transfer_id));
        let mut poll = interval_at(Instant::now() + poll_interval, poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            store,
            transfer_id,
            subscription,
            poll,
            last: None,
            push_open: true,
            done: false,
        }
    }

    /// Next changed snapshot. The first call returns the current row.
    ///
    /// Returns `Ok(None)` after a terminal snapshot has been emitted or when
    /// the job no longer exists.
    pub async fn next(&mut self) -> Result<Option<TransferJob>> {
        if self.done {
            return Ok(None);
        }

        if self.last.is_none() {
            let current = self.store.get_job(self.transfer_id).await?;
            return Ok(self.emit(current));
        }

        loop {
            tokio::select! {
                event = self.subscription.next(), if self.push_open => match event {
                    Some(event) if event.job().is_some() => {}
                    Some(_) => continue,
                    None => {
                        debug!(transfer_id = %self.transfer_id, "Change feed closed, polling only");
                        self.push_open = false;
                        continue;
                    }
                },
                _ = self.poll.tick() => {}
            }

            let candidate = self.store.get_job(self.transfer_id).await?;

            match candidate {
                Some(job) if self.last.as_ref() == Some(&job) => {}
                other => return Ok(self.emit(other)),
            }
        }
    }

    fn emit(&mut self, job: Option<TransferJob>) -> Option<TransferJob> {
        match job {
            Some(job) => {
                if job.status.is_terminal() {
                    self.done = true;
                }
                self.last = Some(job.clone());
                Some(job)
            }
            None => {
                self.done = true;
                None
            }
        }
    }

    /// Adapt into a [`Stream`] of snapshots
    pub fn into_stream(self) -> impl Stream<Item = Result<TransferJob>> + Send {
        stream::unfold(Some(self), |watch| async move {
            let mut watch = watch?;
            match watch.next().await {
                Ok(Some(job)) => Some((Ok(job), Some(watch))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
