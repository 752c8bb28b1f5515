//! Vocabulary entry repository trait.

use crate::error::LocalResult;
use async_trait::async_trait;
use vocasync_core::{PartitionKey, VocabEntry};

/// Repository for vocabulary entries, grouped by day partition.
#[async_trait]
pub trait EntryRepo: Send + Sync {
    /// Entries stored under a day partition, sorted by id.
    async fn entries_for_day(&self, day: &PartitionKey) -> LocalResult<Vec<VocabEntry>>;

    /// Replace the whole content of a day partition.
    ///
    /// An entry id stored under another day moves to this one.
    async fn replace_entries_for_day(
        &self,
        day: &PartitionKey,
        entries: &[VocabEntry],
    ) -> LocalResult<()>;

    /// Insert or update one entry under its own day. Returns that day.
    async fn upsert_entry(&self, entry: &VocabEntry) -> LocalResult<PartitionKey>;

    /// Remove an entry. Returns the day it was stored under.
    async fn delete_entry(&self, id: &str) -> LocalResult<Option<PartitionKey>>;

    /// Every day that holds at least one entry.
    async fn entry_days(&self) -> LocalResult<Vec<PartitionKey>>;

    async fn count_entries(&self) -> LocalResult<u64>;
}
