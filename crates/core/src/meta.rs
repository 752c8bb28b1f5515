//! Sync metadata: the shared remote singleton and the device-local state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::partition::{BLOB_SCHEMA_VERSION, DatasetKind, PartitionKey};
use crate::record::Tombstones;

/// Partition key to version.
pub type VersionMap = BTreeMap<String, i64>;

/// Access to the three per-kind version maps.
pub trait VersionBook {
    fn versions(&self, kind: DatasetKind) -> &VersionMap;

    fn versions_mut(&mut self, kind: DatasetKind) -> &mut VersionMap;

    fn version_of(&self, kind: DatasetKind, key: &str) -> Option<i64> {
        self.versions(kind).get(key).copied()
    }
}

/// Merge `source` into `target` keeping the greater version per key.
///
/// Returns whether `target` changed.
pub fn merge_versions_max(target: &mut VersionMap, source: &VersionMap) -> bool {
    let mut changed = false;
    for (key, &version) in source {
        match target.get_mut(key) {
            Some(current) if *current >= version => {}
            Some(current) => {
                *current = version;
                changed = true;
            }
            None => {
                target.insert(key.clone(), version);
                changed = true;
            }
        }
    }
    changed
}

fn default_schema() -> u32 {
    BLOB_SCHEMA_VERSION
}

/// The shared metadata blob every device reads and commits into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSyncMeta {
    #[serde(default = "default_schema")]
    pub schema: u32,
    #[serde(default)]
    pub partition_versions: VersionMap,
    #[serde(default)]
    pub deleted_entries: Tombstones,
    #[serde(default)]
    pub fsrs_partition_versions: VersionMap,
    #[serde(default)]
    pub review_partition_versions: VersionMap,
}

impl Default for RemoteSyncMeta {
    fn default() -> Self {
        Self {
            schema: BLOB_SCHEMA_VERSION,
            partition_versions: VersionMap::new(),
            deleted_entries: Tombstones::new(),
            fsrs_partition_versions: VersionMap::new(),
            review_partition_versions: VersionMap::new(),
        }
    }
}

impl VersionBook for RemoteSyncMeta {
    fn versions(&self, kind: DatasetKind) -> &VersionMap {
        match kind {
            DatasetKind::Entries => &self.partition_versions,
            DatasetKind::CardStates => &self.fsrs_partition_versions,
            DatasetKind::ReviewLogs => &self.review_partition_versions,
        }
    }

    fn versions_mut(&mut self, kind: DatasetKind) -> &mut VersionMap {
        match kind {
            DatasetKind::Entries => &mut self.partition_versions,
            DatasetKind::CardStates => &mut self.fsrs_partition_versions,
            DatasetKind::ReviewLogs => &mut self.review_partition_versions,
        }
    }
}

/// Device-local sync bookkeeping. Never uploaded verbatim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSyncMeta {
    #[serde(default)]
    pub partition_versions: VersionMap,
    #[serde(default)]
    pub fsrs_partition_versions: VersionMap,
    #[serde(default)]
    pub review_partition_versions: VersionMap,
    /// Remote blob name to id cache.
    #[serde(default)]
    pub drive_file_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub deleted_entries: Tombstones,
    #[serde(default)]
    pub last_sync_timestamp: Option<i64>,
    /// Dirty partitions saved at shutdown, restored on the next start.
    #[serde(default)]
    pub pending_partitions: BTreeMap<DatasetKind, BTreeSet<PartitionKey>>,
}

impl VersionBook for LocalSyncMeta {
    fn versions(&self, kind: DatasetKind) -> &VersionMap {
        match kind {
            DatasetKind::Entries => &self.partition_versions,
            DatasetKind::CardStates => &self.fsrs_partition_versions,
            DatasetKind::ReviewLogs => &self.review_partition_versions,
        }
    }

    fn versions_mut(&mut self, kind: DatasetKind) -> &mut VersionMap {
        match kind {
            DatasetKind::Entries => &mut self.partition_versions,
            DatasetKind::CardStates => &mut self.fsrs_partition_versions,
            DatasetKind::ReviewLogs => &mut self.review_partition_versions,
        }
    }
}
