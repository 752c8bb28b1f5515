//! Partitions edited locally since their last successful push.

use std::collections::{BTreeMap, BTreeSet};
use vocasync_core::{DatasetKind, PartitionKey};

/// Dirty keys grouped by dataset kind.
pub type DirtySet = BTreeMap<DatasetKind, BTreeSet<PartitionKey>>;

#[derive(Clone, Debug, Default)]
pub struct DirtyTracker {
    keys: DirtySet,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the key was not dirty yet.
    pub fn mark(&mut self, kind: DatasetKind, key: PartitionKey) -> bool {
        self.keys.entry(kind).or_default().insert(key)
    }

    /// Mark several keys again, typically after a failed push.
    pub fn restore(&mut self, kind: DatasetKind, keys: impl IntoIterator<Item = PartitionKey>) {
        self.keys.entry(kind).or_default().extend(keys);
    }

    /// Take every dirty key, leaving the tracker empty.
    pub fn drain(&mut self) -> DirtySet {
        std::mem::take(&mut self.keys)
    }

    pub fn contains(&self, kind: DatasetKind, key: &PartitionKey) -> bool {
        self.keys.get(&kind).is_some_and(|keys| keys.contains(key))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.values().all(BTreeSet::is_empty)
    }

    pub fn len(&self) -> usize {
        self.keys.values().map(BTreeSet::len).sum()
    }

    /// Copy of the current dirty keys.
    pub fn snapshot(&self) -> DirtySet {
        self.keys.clone()
    }
}
