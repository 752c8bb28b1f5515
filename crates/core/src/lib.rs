//! Core domain types and pure logic for vocasync.
//!
//! This crate defines the data model shared by every other crate:
//! - Vocabulary entries, FSRS card state and review logs
//! - Partition keys, remote blob names and blob shapes
//! - Remote and device-local sync metadata
//! - The merge engine (last-writer-wins, tombstones, review-log union)
//! - Configuration

pub mod config;
pub mod error;
pub mod merge;
pub mod meta;
pub mod partition;
pub mod record;

pub use error::{Error, Result};
pub use merge::{
    clean_tombstones, count_changed, count_changed_states, merge_card_states, merge_entries,
    merge_review_logs, union_tombstones,
};
pub use meta::{LocalSyncMeta, RemoteSyncMeta, VersionBook, VersionMap, merge_versions_max};
pub use partition::{
    DatasetKind, Granularity, PartitionKey, SYNC_META_NAME, day_key_for, month_key_for,
    parse_partition_name, partition_name,
};
pub use record::{CardPhase, CardState, CardStates, Keyed, ReviewLogEntry, Tombstones, VocabEntry};

/// Default tombstone retention: 30 days.
pub const DEFAULT_TOMBSTONE_RETENTION_DAYS: u64 = 30;

/// Current wall-clock instant in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}
