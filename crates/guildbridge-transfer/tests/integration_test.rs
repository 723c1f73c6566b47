//! Integration tests for guildbridge-transfer.
//!
//! These drive the orchestrator against the fake Discord API and the
//! in-memory store, with tokio's clock paused so batch intervals elapse
//! instantly.

use futures::StreamExt;
use guildbridge_common::test_utils::init_test_logging;
use guildbridge_common::GuildId;
use guildbridge_discord::testing::FakeDiscord;
use guildbridge_transfer::{
    JobQuery, MemoryStore, Table, TransferError, TransferOrchestrator, TransferSettings,
    TransferStatus, TransferStore, UserStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

const TOKEN: &str = "token";

fn orchestrator() -> (Arc<MemoryStore>, TransferOrchestrator) {
    init_test_logging();
    let fake = Arc::new(
        FakeDiscord::new()
            .with_guild(FakeDiscord::guild(1, "Destination", Some(100)))
            .with_channels(GuildId(1), vec![FakeDiscord::text_channel(10, 1, "general")]),
    );
    let store = Arc::new(MemoryStore::new());
    let orchestrator = TransferOrchestrator::new(fake, store.clone(), TransferSettings::default());
    (store, orchestrator)
}

#[tokio::test(start_paused = true)]
async fn test_thirty_users_complete_after_one_interval() {
    let (_, orchestrator) = orchestrator();
    let outcome = orchestrator.start(TOKEN, GuildId(1), 30).await.unwrap();
    let id = outcome.job.transfer_id;

    assert_eq!(outcome.job.users_processed, 25);
    assert_eq!(outcome.job.progress, 83);
    assert_eq!(outcome.remaining_users, 5);

    tokio::time::sleep(Duration::from_millis(5_050)).await;

    let report = orchestrator.status(id).await.unwrap();
    assert_eq!(report.job.status, TransferStatus::Completed);
    assert_eq!(report.job.progress, 100);
    assert_eq!(report.users.len(), 30);
    assert!(report
        .users
        .iter()
        .all(|u| u.status == UserStatus::Transferred && u.transferred_at.is_some()));
}

#[tokio::test(start_paused = true)]
async fn test_watch_follows_job_to_completion() {
    let (_, orchestrator) = orchestrator();
    let id = orchestrator
        .start(TOKEN, GuildId(1), 45)
        .await
        .unwrap()
        .job
        .transfer_id;

    let watch = orchestrator.watch(id).await.unwrap();
    let progress: Vec<u8> = watch
        .into_stream()
        .map(|snapshot| snapshot.unwrap().progress)
        .collect()
        .await;

    assert_eq!(progress, vec![55, 77, 100]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_final_for_watchers() {
    let (_, orchestrator) = orchestrator();
    let id = orchestrator
        .start(TOKEN, GuildId(1), 500)
        .await
        .unwrap()
        .job
        .transfer_id;

    let mut watch = orchestrator.watch(id).await.unwrap();
    assert_eq!(watch.next().await.unwrap().unwrap().users_processed, 25);

    assert_ok!(orchestrator.cancel(id).await);
    let last = watch.next().await.unwrap().unwrap();
    assert_eq!(last.status, TransferStatus::Cancelled);
    assert!(watch.next().await.unwrap().is_none());

    // A second cancel leaves the row untouched.
    let again = orchestrator.cancel(id).await.unwrap();
    assert_eq!(again, last);
}

#[tokio::test(start_paused = true)]
async fn test_listing_and_summary() {
    let (store, orchestrator) = orchestrator();
    let mut feed = store.subscribe(Table::Transfers, None);

    let small = orchestrator.start(TOKEN, GuildId(1), 5).await.unwrap().job;
    let large = orchestrator.start(TOKEN, GuildId(1), 60).await.unwrap().job;

    let inserted = feed.next().await.unwrap();
    assert_eq!(inserted.transfer_id(), small.transfer_id);

    let jobs = orchestrator.list(&JobQuery::all()).await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].transfer_id, large.transfer_id);

    let active = orchestrator
        .list(&JobQuery::with_status(TransferStatus::InProgress))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);

    let summary = orchestrator.summary().await.unwrap();
    assert_eq!(summary.completed_transfers, 1);
    assert_eq!(summary.pending_users, 35);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["completedTransfers"], 1);
    assert_eq!(json["pendingUsers"], 35);
}

#[tokio::test]
async fn test_invalid_requests() {
    let (_, orchestrator) = orchestrator();

    assert!(matches!(
        orchestrator.start(TOKEN, GuildId(1), 0).await,
        Err(TransferError::Validation(_))
    ));
    assert!(matches!(
        orchestrator.start(TOKEN, GuildId(2), 10).await,
        Err(TransferError::InvalidGuild { .. })
    ));
    assert!(orchestrator.summary().await.unwrap().completed_transfers == 0);
}
