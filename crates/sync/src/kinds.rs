//! The three dataset kinds a [`PartitionDriver`](crate::driver::PartitionDriver) serves.

use async_trait::async_trait;
use std::collections::BTreeMap;
use vocasync_core::partition::{
    BLOB_SCHEMA_VERSION, CardStatePartition, EntriesPartition, LegacyCardStates, LegacyEntries,
    LegacyReviewLogs, ReviewLogPartition,
};
use vocasync_core::{
    CardStates, DatasetKind, PartitionKey, ReviewLogEntry, Tombstones, VocabEntry, count_changed,
    count_changed_states, merge_card_states, merge_entries, merge_review_logs, month_key_for,
};
use tracing::warn;
use vocasync_local::{LocalResult, LocalStore};

use crate::driver::PartitionKind;
use crate::error::SyncResult;

/// Vocabulary entries, one partition per day.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntryKind;

/// FSRS card state, one partition per month.
#[derive(Clone, Copy, Debug, Default)]
pub struct CardStateKind;

/// Review logs, one partition per month of `reviewed_at`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReviewLogKind;

#[async_trait]
impl PartitionKind for EntryKind {
    type Records = Vec<VocabEntry>;
    type Blob = EntriesPartition;
    type Legacy = LegacyEntries;

    fn dataset(&self) -> DatasetKind {
        DatasetKind::Entries
    }

    fn to_blob(&self, key: &PartitionKey, records: Self::Records, version: i64) -> Self::Blob {
        EntriesPartition {
            schema: BLOB_SCHEMA_VERSION,
            date: key.as_str().to_string(),
            entries: records,
            version,
        }
    }

    fn from_blob(&self, blob: Self::Blob) -> (Self::Records, i64) {
        (blob.entries, blob.version)
    }

    fn merge(
        &self,
        remote: &Self::Records,
        local: &Self::Records,
        tombstones: &Tombstones,
    ) -> Self::Records {
        merge_entries(remote, local, tombstones)
    }

    fn count_changed(&self, before: &Self::Records, after: &Self::Records) -> usize {
        count_changed(before, after)
    }

    fn len(&self, records: &Self::Records) -> usize {
        records.len()
    }

    async fn load(
        &self,
        local: &dyn LocalStore,
        key: &PartitionKey,
    ) -> LocalResult<Self::Records> {
        local.entries_for_day(key).await
    }

    async fn save(
        &self,
        local: &dyn LocalStore,
        key: &PartitionKey,
        records: &Self::Records,
    ) -> LocalResult<()> {
        local.replace_entries_for_day(key, records).await
    }

    async fn local_keys(&self, local: &dyn LocalStore) -> LocalResult<Vec<PartitionKey>> {
        local.entry_days().await
    }

    fn split_legacy(
        &self,
        legacy: Self::Legacy,
    ) -> SyncResult<BTreeMap<PartitionKey, Self::Records>> {
        let mut groups: BTreeMap<PartitionKey, Self::Records> = BTreeMap::new();
        for entry in legacy.entries {
            match entry.partition_key() {
                Ok(key) => groups.entry(key).or_default().push(entry),
                Err(e) => warn!(id = %entry.id, error = %e, "skipping legacy entry without a day"),
            }
        }
        Ok(groups)
    }
}

#[async_trait]
impl PartitionKind for CardStateKind {
    type Records = CardStates;
    type Blob = CardStatePartition;
    type Legacy = LegacyCardStates;

    fn dataset(&self) -> DatasetKind {
        DatasetKind::CardStates
    }

    fn to_blob(&self, _key: &PartitionKey, records: Self::Records, version: i64) -> Self::Blob {
        CardStatePartition {
            schema: BLOB_SCHEMA_VERSION,
            card_states: records,
            version,
        }
    }

    fn from_blob(&self, blob: Self::Blob) -> (Self::Records, i64) {
        (blob.card_states, blob.version)
    }

    fn merge(
        &self,
        remote: &Self::Records,
        local: &Self::Records,
        tombstones: &Tombstones,
    ) -> Self::Records {
        merge_card_states(remote, local, tombstones)
    }

    fn count_changed(&self, before: &Self::Records, after: &Self::Records) -> usize {
        count_changed_states(before, after)
    }

    fn len(&self, records: &Self::Records) -> usize {
        records.len()
    }

    async fn load(
        &self,
        local: &dyn LocalStore,
        key: &PartitionKey,
    ) -> LocalResult<Self::Records> {
        local.card_states_for_month(key).await
    }

    async fn save(
        &self,
        local: &dyn LocalStore,
        key: &PartitionKey,
        records: &Self::Records,
    ) -> LocalResult<()> {
        local.replace_card_states_for_month(key, records).await
    }

    async fn local_keys(&self, local: &dyn LocalStore) -> LocalResult<Vec<PartitionKey>> {
        local.card_state_months().await
    }

    /// Legacy cards carry no partition, so the month comes from `due`.
    fn split_legacy(
        &self,
        legacy: Self::Legacy,
    ) -> SyncResult<BTreeMap<PartitionKey, Self::Records>> {
        let mut groups: BTreeMap<PartitionKey, Self::Records> = BTreeMap::new();
        for (vocab_id, state) in legacy.card_states {
            match month_key_for(state.due) {
                Ok(key) => {
                    groups.entry(key).or_default().insert(vocab_id, state);
                }
                Err(e) => warn!(id = %vocab_id, error = %e, "skipping legacy card state"),
            }
        }
        Ok(groups)
    }
}

#[async_trait]
impl PartitionKind for ReviewLogKind {
    type Records = Vec<ReviewLogEntry>;
    type Blob = ReviewLogPartition;
    type Legacy = LegacyReviewLogs;

    fn dataset(&self) -> DatasetKind {
        DatasetKind::ReviewLogs
    }

    fn to_blob(&self, _key: &PartitionKey, records: Self::Records, version: i64) -> Self::Blob {
        ReviewLogPartition {
            schema: BLOB_SCHEMA_VERSION,
            logs: records,
            version,
        }
    }

    fn from_blob(&self, blob: Self::Blob) -> (Self::Records, i64) {
        (blob.logs, blob.version)
    }

    fn merge(
        &self,
        remote: &Self::Records,
        local: &Self::Records,
        tombstones: &Tombstones,
    ) -> Self::Records {
        merge_review_logs(remote, local, tombstones)
    }

    fn count_changed(&self, before: &Self::Records, after: &Self::Records) -> usize {
        count_changed(before, after)
    }

    fn len(&self, records: &Self::Records) -> usize {
        records.len()
    }

    async fn load(
        &self,
        local: &dyn LocalStore,
        key: &PartitionKey,
    ) -> LocalResult<Self::Records> {
        local.review_logs_for_month(key).await
    }

    async fn save(
        &self,
        local: &dyn LocalStore,
        key: &PartitionKey,
        records: &Self::Records,
    ) -> LocalResult<()> {
        local.replace_review_logs_for_month(key, records).await
    }

    async fn local_keys(&self, local: &dyn LocalStore) -> LocalResult<Vec<PartitionKey>> {
        local.review_log_months().await
    }

    fn split_legacy(
        &self,
        legacy: Self::Legacy,
    ) -> SyncResult<BTreeMap<PartitionKey, Self::Records>> {
        let mut groups: BTreeMap<PartitionKey, Self::Records> = BTreeMap::new();
        for log in legacy.logs {
            match month_key_for(log.reviewed_at) {
                Ok(key) => groups.entry(key).or_default().push(log),
                Err(e) => warn!(id = %log.vocab_id, error = %e, "skipping legacy review log"),
            }
        }
        // Merging against an empty list sorts and deduplicates each group.
        Ok(groups
            .into_iter()
            .map(|(key, logs)| {
                let normalized = merge_review_logs(&logs, &[], &Tombstones::new());
                (key, normalized)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vocasync_core::CardState;

    // 2024-05-03T10:00:00Z and 2024-06-01T10:00:00Z
    const MAY_03: i64 = 1_714_730_400_000;
    const JUN_01: i64 = 1_717_236_000_000;

    #[test]
    fn legacy_entries_group_by_day() {
        let legacy = LegacyEntries {
            entries: vec![
                VocabEntry::new("a", "w", "m", MAY_03).unwrap(),
                VocabEntry::new("b", "w", "m", JUN_01).unwrap(),
                VocabEntry::new("c", "w", "m", MAY_03 + 60_000).unwrap(),
            ],
        };
        let groups = EntryKind.split_legacy(legacy).unwrap();
        let keys: Vec<&str> = groups.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["2024-05-03", "2024-06-01"]);
        assert_eq!(groups.values().next().unwrap().len(), 2);
    }

    #[test]
    fn legacy_cards_group_by_due_month() {
        let mut card_states = CardStates::new();
        card_states.insert("a".into(), CardState::new(MAY_03));
        card_states.insert("b".into(), CardState::new(JUN_01));
        let groups = CardStateKind
            .split_legacy(LegacyCardStates { card_states })
            .unwrap();
        let keys: Vec<&str> = groups.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["2024-05", "2024-06"]);
    }

    #[test]
    fn legacy_records_without_a_key_are_dropped() {
        let mut card_states = CardStates::new();
        card_states.insert("a".into(), CardState::new(MAY_03));
        card_states.insert("b".into(), CardState::new(i64::MAX));
        let groups = CardStateKind
            .split_legacy(LegacyCardStates { card_states })
            .unwrap();
        let ids: Vec<&str> = groups.values().flat_map(|g| g.keys()).map(String::as_str).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn legacy_logs_are_sorted_per_month() {
        let logs = vec![
            ReviewLogEntry::new("b", MAY_03 + 5, 3),
            ReviewLogEntry::new("a", MAY_03 + 5, 2),
            ReviewLogEntry::new("a", MAY_03, 1),
        ];
        let groups = ReviewLogKind.split_legacy(LegacyReviewLogs { logs }).unwrap();
        let may = &groups[&PartitionKey::month("2024-05").unwrap()];
        let order: Vec<(&str, i64)> = may
            .iter()
            .map(|l| (l.vocab_id.as_str(), l.reviewed_at))
            .collect();
        assert_eq!(
            order,
            vec![("a", MAY_03), ("a", MAY_03 + 5), ("b", MAY_03 + 5)]
        );
    }

    #[test]
    fn blobs_carry_schema_and_date() {
        let key = PartitionKey::day("2024-05-03").unwrap();
        let blob = EntryKind.to_blob(&key, vec![], 9);
        assert_eq!(blob.schema, BLOB_SCHEMA_VERSION);
        assert_eq!(blob.date, "2024-05-03");
        assert_eq!(EntryKind.from_blob(blob), (vec![], 9));
    }
}
