//! Triggers, debounce, lifecycle and shutdown of the engine.

mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use vocasync_core::config::SyncConfig;
use vocasync_core::{DatasetKind, PartitionKey};
use vocasync_local::LocalStore;
use vocasync_storage::{BlobStore, StaticTokenProvider};
use vocasync_sync::{Lifecycle, PartitionStatus, SyncEngine, SyncError, SyncOutcome};

/// Yield until the remote metadata has been written, up to a fixed number of turns.
async fn wait_for_commit(remote: &CountingStore) {
    for _ in 0..1_000 {
        if CountingStore::count(&remote.meta_writes) > 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_flushes_once_after_quiet_period() {
    let remote = Arc::new(CountingStore::new());
    let device = Device::with_config(
        &remote,
        SyncConfig {
            debounce_ms: 5_000,
            ..SyncConfig::default()
        },
    );

    for (id, ts) in [("a", MAY_03), ("b", MAY_04), ("c", MAY_05)] {
        device.engine.put_entry(&entry(id, ts)).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
    }
    tokio::time::advance(Duration::from_millis(3_900)).await;
    tokio::task::yield_now().await;
    assert_eq!(remote.writes(), 0);
    assert_eq!(device.engine.pending().await, 3);

    tokio::time::advance(Duration::from_millis(200)).await;
    wait_for_commit(&remote).await;

    assert_eq!(CountingStore::count(&remote.meta_writes), 1);
    assert_eq!(CountingStore::count(&remote.creates), 4);
    assert_eq!(device.engine.pending().await, 0);
}

#[tokio::test]
async fn trigger_during_a_cycle_reports_busy() {
    let remote = Arc::new(CountingStore::new());
    remote.slow_list(Duration::from_millis(300));
    let device = Device::new(&remote);
    device.engine.put_entry(&entry("a", MAY_03)).await.unwrap();

    let engine = device.engine.clone();
    let running = tokio::spawn(async move { engine.full_sync().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(device.engine.is_running());
    assert_eq!(device.engine.flush().await, SyncOutcome::Busy);
    assert_eq!(device.engine.full_sync().await, SyncOutcome::Busy);

    let outcome = running.await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Completed(_)));
    assert!(!device.engine.is_running());
    assert_eq!(device.engine.pending().await, 0);
}

#[tokio::test]
async fn lifecycle_events_flush_and_full_sync() {
    let remote = Arc::new(CountingStore::new());
    let a = Device::new(&remote);
    let b = Device::new(&remote);

    a.engine.put_entry(&entry("a", MAY_03)).await.unwrap();
    let outcome = a.engine.handle_lifecycle(Lifecycle::Background).await;
    assert_eq!(outcome.summary().map(|s| s.pushed), Some(1));

    let outcome = b.engine.handle_lifecycle(Lifecycle::Foreground).await;
    assert_eq!(outcome.summary().map(|s| s.pulled), Some(1));
    assert!(b.entries().await.contains_key("a"));
}

#[tokio::test]
async fn signed_out_device_stays_offline() {
    let remote = Arc::new(CountingStore::new());
    let device = Device::signed_out(&remote);
    device.engine.put_entry(&entry("a", MAY_03)).await.unwrap();

    assert_eq!(device.engine.flush().await, SyncOutcome::NotAuthenticated);
    assert_eq!(device.engine.full_sync().await, SyncOutcome::NotAuthenticated);
    assert!(matches!(
        device.engine.diagnose().await,
        Err(SyncError::NotAuthenticated)
    ));

    assert_eq!(device.engine.pending().await, 1);
    assert_eq!(CountingStore::count(&remote.lists), 0);
    assert_eq!(device.entries().await.len(), 1);
}

#[tokio::test]
async fn shutdown_persists_dirty_partitions_for_next_start() {
    let remote = Arc::new(CountingStore::new());
    let device = Device::new(&remote);
    device.engine.put_entry(&entry("a", MAY_03)).await.unwrap();

    device.engine.shutdown().await.unwrap();
    assert_eq!(device.engine.flush().await, SyncOutcome::ShutDown);
    assert_eq!(
        device.engine.handle_lifecycle(Lifecycle::Foreground).await,
        SyncOutcome::ShutDown
    );
    assert_eq!(remote.writes(), 0);

    let day = PartitionKey::day("2024-05-03").unwrap();
    assert!(device.meta().await.pending_partitions[&DatasetKind::Entries].contains(&day));

    let reopened = SyncEngine::open(
        remote.clone() as Arc<dyn BlobStore>,
        device.local.clone() as Arc<dyn LocalStore>,
        Arc::new(StaticTokenProvider::new(TOKEN)),
        config(),
    )
    .await
    .unwrap();
    assert_eq!(reopened.pending().await, 1);

    let outcome = reopened.flush().await;
    assert_eq!(outcome.summary().map(|s| s.pushed), Some(1));
    assert!(exists(&remote, "entries_2024-05-03.json").await);
    assert!(device.meta().await.pending_partitions.is_empty());
}

#[tokio::test]
async fn deleting_an_unknown_entry_still_records_a_tombstone() {
    let remote = Arc::new(CountingStore::new());
    let device = Device::new(&remote);

    assert!(!device.engine.delete_entry("ghost").await.unwrap());

    assert!(device.meta().await.deleted_entries.contains_key("ghost"));
    assert_eq!(device.engine.pending().await, 0);
}

#[tokio::test]
async fn diagnose_reports_each_partition_status() {
    let remote = Arc::new(CountingStore::new());
    let a = Device::new(&remote);
    let b = Device::new(&remote);

    a.engine.put_entry(&entry("e1", MAY_03)).await.unwrap();
    a.engine.append_review_log(&log("e1", MAY_03)).await.unwrap();
    a.engine.full_sync().await;

    b.engine.full_sync().await;
    b.engine.append_review_log(&log("e1", MAY_04)).await.unwrap();
    b.engine.put_entry(&entry("j", JUN_01)).await.unwrap();
    b.engine.flush().await;

    let mut edited = entry("e1", MAY_03 + 1_000);
    edited.meaning = "edited".into();
    a.engine.put_entry(&edited).await.unwrap();
    a.engine.put_entry(&entry("e2", MAY_04)).await.unwrap();

    let report = a.engine.diagnose().await.unwrap();
    let status = |kind: DatasetKind, key: &str| {
        report
            .partitions
            .iter()
            .find(|row| row.kind == kind && row.key.as_str() == key)
            .map(|row| row.status)
    };
    assert_eq!(status(DatasetKind::Entries, "2024-05-03"), Some(PartitionStatus::PushPending));
    assert_eq!(status(DatasetKind::Entries, "2024-05-04"), Some(PartitionStatus::LocalOnly));
    assert_eq!(status(DatasetKind::Entries, "2024-06-01"), Some(PartitionStatus::RemoteOnly));
    assert_eq!(status(DatasetKind::ReviewLogs, "2024-05"), Some(PartitionStatus::PullPending));

    assert_eq!(report.local.entries, 2);
    assert_eq!(report.remote.entries, 2);
    assert_eq!(report.local.review_logs, 1);
    assert_eq!(report.remote.review_logs, 2);
    assert_eq!(report.dirty, 2);
    assert!(report.last_sync.is_some());
    assert!(!report.is_in_sync());
    assert!(report.to_string().contains("pull-pending"));

    // Diagnose is read-only.
    assert_eq!(a.engine.pending().await, 2);
    assert_eq!(a.entries().await["e1"].meaning, "edited");
}
