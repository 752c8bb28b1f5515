//! Two devices sharing one remote end up with the same data.

mod common;

use common::*;
use std::sync::Arc;
use vocasync_core::ReviewLogEntry;
use vocasync_local::ReviewLogRepo;

async fn all_logs(device: &Device) -> Vec<ReviewLogEntry> {
    let mut logs = Vec::new();
    for month in device.local.review_log_months().await.unwrap() {
        logs.extend(device.local.review_logs_for_month(&month).await.unwrap());
    }
    logs
}

async fn edit_both(a: &Device, b: &Device) {
    a.engine.put_entry(&entry("a", MAY_03)).await.unwrap();
    a.engine
        .put_card_state("a", &card(MAY_05, 1, Some(MAY_03)))
        .await
        .unwrap();
    a.engine.append_review_log(&log("a", MAY_03)).await.unwrap();

    b.engine.put_entry(&entry("b", MAY_03 + 1_000)).await.unwrap();
    b.engine.put_entry(&entry("c", JUN_01)).await.unwrap();
    b.engine.append_review_log(&log("b", JUN_01)).await.unwrap();
}

async fn assert_converged(a: &Device, b: &Device) {
    assert_eq!(a.entries().await, b.entries().await);
    assert_eq!(a.card_states().await, b.card_states().await);
    assert_eq!(all_logs(a).await, all_logs(b).await);
}

#[tokio::test]
async fn disjoint_edits_converge_in_either_order() {
    for a_first in [true, false] {
        let remote = Arc::new(CountingStore::new());
        let a = Device::new(&remote);
        let b = Device::new(&remote);
        edit_both(&a, &b).await;

        let (first, second) = if a_first { (&a, &b) } else { (&b, &a) };
        first.engine.full_sync().await;
        second.engine.full_sync().await;
        first.engine.full_sync().await;

        assert_converged(&a, &b).await;
        assert_eq!(a.entries().await.len(), 3);
        assert_eq!(all_logs(&a).await.len(), 2);
        assert!(a.engine.diagnose().await.unwrap().is_in_sync());
        assert!(b.engine.diagnose().await.unwrap().is_in_sync());
    }
}

#[tokio::test]
async fn later_edit_wins_on_both_devices() {
    let remote = Arc::new(CountingStore::new());
    let a = Device::new(&remote);
    let b = Device::new(&remote);
    a.engine.put_entry(&entry("a", MAY_03)).await.unwrap();
    a.engine.full_sync().await;
    b.engine.full_sync().await;

    let mut older = entry("a", MAY_03 + 1_000);
    older.meaning = "from a".into();
    let mut newer = entry("a", MAY_03 + 2_000);
    newer.meaning = "from b".into();
    a.engine.put_entry(&older).await.unwrap();
    b.engine.put_entry(&newer).await.unwrap();

    b.engine.flush().await;
    a.engine.full_sync().await;
    b.engine.full_sync().await;

    assert_converged(&a, &b).await;
    assert_eq!(a.entries().await["a"].meaning, "from b");
}

#[tokio::test]
async fn deletion_reaches_the_other_device() {
    let remote = Arc::new(CountingStore::new());
    let a = Device::new(&remote);
    let b = Device::new(&remote);
    a.engine.put_entry(&entry("a", MAY_03)).await.unwrap();
    a.engine
        .put_card_state("a", &card(MAY_05, 1, Some(MAY_03)))
        .await
        .unwrap();
    a.engine.put_entry(&entry("keep", MAY_03)).await.unwrap();
    a.engine.full_sync().await;
    b.engine.full_sync().await;
    assert!(b.entries().await.contains_key("a"));

    a.engine.delete_entry("a").await.unwrap();
    a.engine.full_sync().await;
    b.engine.full_sync().await;

    let entries = b.entries().await;
    assert!(!entries.contains_key("a"));
    assert!(entries.contains_key("keep"));
    assert!(!b.card_states().await.contains_key("a"));
    assert!(b.meta().await.deleted_entries.contains_key("a"));
    assert_converged(&a, &b).await;
}

#[tokio::test]
async fn repeated_syncs_are_idempotent() {
    let remote = Arc::new(CountingStore::new());
    let a = Device::new(&remote);
    let b = Device::new(&remote);
    edit_both(&a, &b).await;
    for _ in 0..2 {
        a.engine.full_sync().await;
        b.engine.full_sync().await;
    }
    remote.reset_counters();

    let outcome = a.engine.full_sync().await;
    let summary = outcome.summary().expect("sync completes");
    assert_eq!(summary.pulled, 0);
    assert_eq!(summary.pushed, 0);
    assert_eq!(remote.writes(), 0);
}
