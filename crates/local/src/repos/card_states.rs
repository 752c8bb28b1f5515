//! FSRS card-state repository trait.

use crate::error::LocalResult;
use async_trait::async_trait;
use vocasync_core::{CardState, CardStates, PartitionKey};

/// Repository for card state, grouped by month partition.
///
/// A card keeps the month it was first stored under; later updates do not
/// move it even when `due` crosses into another month.
#[async_trait]
pub trait CardStateRepo: Send + Sync {
    async fn card_states_for_month(&self, month: &PartitionKey) -> LocalResult<CardStates>;

    /// Replace the whole content of a month partition.
    async fn replace_card_states_for_month(
        &self,
        month: &PartitionKey,
        states: &CardStates,
    ) -> LocalResult<()>;

    /// Insert or update one card. Returns the month it is stored under.
    async fn upsert_card_state(&self, vocab_id: &str, state: &CardState)
    -> LocalResult<PartitionKey>;

    /// Remove a card. Returns the month it was stored under.
    async fn delete_card_state(&self, vocab_id: &str) -> LocalResult<Option<PartitionKey>>;

    async fn card_state_months(&self) -> LocalResult<Vec<PartitionKey>>;

    async fn count_card_states(&self) -> LocalResult<u64>;
}
