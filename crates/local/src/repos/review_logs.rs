//! Review log repository trait.

use crate::error::LocalResult;
use async_trait::async_trait;
use vocasync_core::{PartitionKey, ReviewLogEntry};

/// Repository for append-only review logs, grouped by month of `reviewed_at`.
#[async_trait]
pub trait ReviewLogRepo: Send + Sync {
    /// Logs of a month sorted by `(reviewed_at, vocab_id)`.
    async fn review_logs_for_month(&self, month: &PartitionKey)
    -> LocalResult<Vec<ReviewLogEntry>>;

    async fn replace_review_logs_for_month(
        &self,
        month: &PartitionKey,
        logs: &[ReviewLogEntry],
    ) -> LocalResult<()>;

    /// Append one log. Returns the month it is stored under.
    async fn append_review_log(&self, log: &ReviewLogEntry) -> LocalResult<PartitionKey>;

    async fn review_log_months(&self) -> LocalResult<Vec<PartitionKey>>;

    async fn count_review_logs(&self) -> LocalResult<u64>;
}
