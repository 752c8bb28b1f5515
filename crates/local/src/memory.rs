//! In-memory local store for tests and ephemeral sessions.

use crate::error::LocalResult;
use crate::repos::{CardStateRepo, EntryRepo, ReviewLogRepo, SyncStateRepo};
use crate::store::LocalStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use vocasync_core::{
    CardState, CardStates, LocalSyncMeta, PartitionKey, ReviewLogEntry, VocabEntry,
    month_key_for,
};

#[derive(Default)]
struct Inner {
    /// id -> (day, entry)
    entries: BTreeMap<String, (PartitionKey, VocabEntry)>,
    /// vocab_id -> (month, state)
    card_states: BTreeMap<String, (PartitionKey, CardState)>,
    /// (reviewed_at, vocab_id) -> (month, log)
    review_logs: BTreeMap<(i64, String), (PartitionKey, ReviewLogEntry)>,
    sync_meta: Option<LocalSyncMeta>,
}

/// Local store holding everything behind one lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn migrate(&self) -> LocalResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> LocalResult<()> {
        Ok(())
    }
}

#[async_trait]
impl EntryRepo for MemoryStore {
    async fn entries_for_day(&self, day: &PartitionKey) -> LocalResult<Vec<VocabEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .values()
            .filter(|(d, _)| d == day)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn replace_entries_for_day(
        &self,
        day: &PartitionKey,
        entries: &[VocabEntry],
    ) -> LocalResult<()> {
        let mut inner = self.inner.write().await;
        inner.entries.retain(|_, (d, _)| d != day);
        for entry in entries {
            inner
                .entries
                .insert(entry.id.clone(), (day.clone(), entry.clone()));
        }
        Ok(())
    }

    async fn upsert_entry(&self, entry: &VocabEntry) -> LocalResult<PartitionKey> {
        let day = entry.partition_key()?;
        self.inner
            .write()
            .await
            .entries
            .insert(entry.id.clone(), (day.clone(), entry.clone()));
        Ok(day)
    }

    async fn delete_entry(&self, id: &str) -> LocalResult<Option<PartitionKey>> {
        Ok(self.inner.write().await.entries.remove(id).map(|(d, _)| d))
    }

    async fn entry_days(&self) -> LocalResult<Vec<PartitionKey>> {
        let inner = self.inner.read().await;
        let days: BTreeSet<PartitionKey> = inner.entries.values().map(|(d, _)| d.clone()).collect();
        Ok(days.into_iter().collect())
    }

    async fn count_entries(&self) -> LocalResult<u64> {
        Ok(self.inner.read().await.entries.len() as u64)
    }
}

#[async_trait]
impl CardStateRepo for MemoryStore {
    async fn card_states_for_month(&self, month: &PartitionKey) -> LocalResult<CardStates> {
        let inner = self.inner.read().await;
        Ok(inner
            .card_states
            .iter()
            .filter(|(_, (m, _))| m == month)
            .map(|(id, (_, s))| (id.clone(), s.clone()))
            .collect())
    }

    async fn replace_card_states_for_month(
        &self,
        month: &PartitionKey,
        states: &CardStates,
    ) -> LocalResult<()> {
        let mut inner = self.inner.write().await;
        inner.card_states.retain(|_, (m, _)| m != month);
        for (id, state) in states {
            inner
                .card_states
                .insert(id.clone(), (month.clone(), state.clone()));
        }
        Ok(())
    }

    async fn upsert_card_state(
        &self,
        vocab_id: &str,
        state: &CardState,
    ) -> LocalResult<PartitionKey> {
        let mut inner = self.inner.write().await;
        let month = match inner.card_states.get(vocab_id) {
            Some((month, _)) => month.clone(),
            None => month_key_for(state.due)?,
        };
        inner
            .card_states
            .insert(vocab_id.to_string(), (month.clone(), state.clone()));
        Ok(month)
    }

    async fn delete_card_state(&self, vocab_id: &str) -> LocalResult<Option<PartitionKey>> {
        Ok(self
            .inner
            .write()
            .await
            .card_states
            .remove(vocab_id)
            .map(|(m, _)| m))
    }

    async fn card_state_months(&self) -> LocalResult<Vec<PartitionKey>> {
        let inner = self.inner.read().await;
        let months: BTreeSet<PartitionKey> =
            inner.card_states.values().map(|(m, _)| m.clone()).collect();
        Ok(months.into_iter().collect())
    }

    async fn count_card_states(&self) -> LocalResult<u64> {
        Ok(self.inner.read().await.card_states.len() as u64)
    }
}

#[async_trait]
impl ReviewLogRepo for MemoryStore {
    async fn review_logs_for_month(
        &self,
        month: &PartitionKey,
    ) -> LocalResult<Vec<ReviewLogEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .review_logs
            .values()
            .filter(|(m, _)| m == month)
            .map(|(_, log)| log.clone())
            .collect())
    }

    async fn replace_review_logs_for_month(
        &self,
        month: &PartitionKey,
        logs: &[ReviewLogEntry],
    ) -> LocalResult<()> {
        let mut inner = self.inner.write().await;
        inner.review_logs.retain(|_, (m, _)| m != month);
        for log in logs {
            inner.review_logs.insert(
                (log.reviewed_at, log.vocab_id.clone()),
                (month.clone(), log.clone()),
            );
        }
        Ok(())
    }

    async fn append_review_log(&self, log: &ReviewLogEntry) -> LocalResult<PartitionKey> {
        let month = month_key_for(log.reviewed_at)?;
        self.inner.write().await.review_logs.insert(
            (log.reviewed_at, log.vocab_id.clone()),
            (month.clone(), log.clone()),
        );
        Ok(month)
    }

    async fn review_log_months(&self) -> LocalResult<Vec<PartitionKey>> {
        let inner = self.inner.read().await;
        let months: BTreeSet<PartitionKey> =
            inner.review_logs.values().map(|(m, _)| m.clone()).collect();
        Ok(months.into_iter().collect())
    }

    async fn count_review_logs(&self) -> LocalResult<u64> {
        Ok(self.inner.read().await.review_logs.len() as u64)
    }
}

#[async_trait]
impl SyncStateRepo for MemoryStore {
    async fn load_sync_meta(&self) -> LocalResult<LocalSyncMeta> {
        Ok(self.inner.read().await.sync_meta.clone().unwrap_or_default())
    }

    async fn save_sync_meta(&self, meta: &LocalSyncMeta) -> LocalResult<()> {
        self.inner.write().await.sync_meta = Some(meta.clone());
        Ok(())
    }
}
