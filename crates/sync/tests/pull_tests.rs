//! Pulling partitions the remote holds newer versions of.

mod common;

use common::*;
use std::sync::Arc;
use vocasync_core::partition::{CardStatePartition, EntriesPartition};
use vocasync_core::{
    CardStates, PartitionKey, RemoteSyncMeta, SYNC_META_NAME, VersionMap, now_millis,
};
use vocasync_local::{CardStateRepo, EntryRepo, SyncStateRepo};
use vocasync_sync::SyncOutcome;

const FSRS_MAY: &str = "fsrs_2024-05.json";

/// Remote holds `2024-05` at version 5 with cards `x` (newer) and `y`.
async fn seed_remote_cards(remote: &CountingStore) {
    let mut cards = CardStates::new();
    cards.insert("x".into(), card(MAY_05, 4, Some(MAY_04)));
    cards.insert("y".into(), card(MAY_05, 1, Some(MAY_03)));
    seed(
        remote,
        FSRS_MAY,
        &CardStatePartition {
            schema: 1,
            card_states: cards,
            version: 5,
        },
    )
    .await;
    seed(
        remote,
        SYNC_META_NAME,
        &RemoteSyncMeta {
            fsrs_partition_versions: VersionMap::from([("2024-05".to_string(), 5)]),
            ..Default::default()
        },
    )
    .await;
}

/// Local holds an older `x` under version 3.
async fn seed_local_cards(device: &Device) {
    device
        .local
        .upsert_card_state("x", &card(MAY_04, 2, Some(MAY_03)))
        .await
        .unwrap();
    let mut meta = device.meta().await;
    meta.fsrs_partition_versions.insert("2024-05".into(), 3);
    device.local.save_sync_meta(&meta).await.unwrap();
}

#[tokio::test]
async fn newer_remote_partition_is_pulled_and_version_adopted() {
    let remote = Arc::new(CountingStore::new());
    seed_remote_cards(&remote).await;
    let device = Device::new(&remote);
    seed_local_cards(&device).await;
    remote.reset_counters();

    let outcome = device.engine.full_sync().await;
    let summary = outcome.summary().expect("sync completes");
    assert_eq!(summary.pulled, 2);
    assert_eq!(summary.failed, 0);

    let states = device.card_states().await;
    assert_eq!(states.len(), 2);
    assert_eq!(states["x"].reps, 4);
    assert_eq!(device.meta().await.fsrs_partition_versions["2024-05"], 5);

    // Nothing local was missing remotely, so the partition is not rewritten.
    assert!(!remote.written_names().contains(&FSRS_MAY.to_string()));
}

#[tokio::test]
async fn local_only_records_are_pushed_back_after_pull() {
    let remote = Arc::new(CountingStore::new());
    seed_remote_cards(&remote).await;
    let device = Device::new(&remote);
    seed_local_cards(&device).await;
    device
        .local
        .upsert_card_state("z", &card(MAY_05, 1, Some(MAY_05)))
        .await
        .unwrap();

    let outcome = device.engine.full_sync().await;
    assert!(matches!(outcome, SyncOutcome::Completed(_)));

    let blob: CardStatePartition = read(&remote, FSRS_MAY).await;
    assert_eq!(blob.card_states.len(), 3);
    assert!(blob.version > 5);

    let meta: RemoteSyncMeta = read(&remote, SYNC_META_NAME).await;
    assert_eq!(meta.fsrs_partition_versions["2024-05"], blob.version);
    assert_eq!(device.meta().await.fsrs_partition_versions["2024-05"], blob.version);
}

#[tokio::test]
async fn failed_pull_keeps_old_version() {
    let remote = Arc::new(CountingStore::new());
    seed_remote_cards(&remote).await;
    let device = Device::new(&remote);
    seed_local_cards(&device).await;
    remote.fail_on(FSRS_MAY);

    let outcome = device.engine.full_sync().await;
    let summary = outcome.summary().expect("partition failures do not abort the cycle");
    assert!(summary.failed >= 1);

    assert_eq!(device.meta().await.fsrs_partition_versions["2024-05"], 3);
    assert_eq!(device.card_states().await["x"].reps, 2);

    remote.heal(FSRS_MAY);
    device.engine.full_sync().await;
    assert_eq!(device.meta().await.fsrs_partition_versions["2024-05"], 5);
}

#[tokio::test]
async fn unknown_partition_is_pulled_even_without_a_meta_version() {
    let remote = Arc::new(CountingStore::new());
    // A blob another device created but whose metadata commit never landed.
    seed(
        &remote,
        "entries_2024-05-03.json",
        &EntriesPartition {
            schema: 1,
            date: "2024-05-03".into(),
            entries: vec![entry("a", MAY_03)],
            version: 42,
        },
    )
    .await;
    let device = Device::new(&remote);

    device.engine.full_sync().await;

    let entries = device
        .local
        .entries_for_day(&PartitionKey::day("2024-05-03").unwrap())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    // The embedded version heals the missing metadata row.
    assert_eq!(device.meta().await.partition_versions["2024-05-03"], 42);
    let meta: RemoteSyncMeta = read(&remote, SYNC_META_NAME).await;
    assert_eq!(meta.partition_versions["2024-05-03"], 42);
}

#[tokio::test]
async fn tombstoned_entries_are_dropped_on_pull() {
    let remote = Arc::new(CountingStore::new());
    seed(
        &remote,
        "entries_2024-05-03.json",
        &EntriesPartition {
            schema: 1,
            date: "2024-05-03".into(),
            entries: vec![entry("a", MAY_03), entry("b", MAY_03)],
            version: 7,
        },
    )
    .await;
    seed(
        &remote,
        SYNC_META_NAME,
        &RemoteSyncMeta {
            partition_versions: VersionMap::from([("2024-05-03".to_string(), 7)]),
            deleted_entries: [("b".to_string(), now_millis())].into(),
            ..Default::default()
        },
    )
    .await;
    let device = Device::new(&remote);

    device.engine.full_sync().await;

    let entries = device.entries().await;
    assert!(entries.contains_key("a"));
    assert!(!entries.contains_key("b"));
    assert!(device.meta().await.deleted_entries.contains_key("b"));
}
