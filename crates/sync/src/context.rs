//! Cycle-scoped sync state.
//!
//! A [`SyncContext`] is opened at the start of every sync cycle. It performs
//! the cycle's only metadata read and only directory listing, then collects
//! what the partition drivers learn: the versions they pulled or wrote and
//! the ids of blobs they created. Drivers never write the remote metadata
//! themselves; [`crate::commit::commit_sync_meta`] folds the context into
//! one write at the end of the cycle.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};
use vocasync_core::{
    DatasetKind, PartitionKey, RemoteSyncMeta, SYNC_META_NAME, Tombstones, VersionBook,
    VersionMap, parse_partition_name, union_tombstones,
};
use vocasync_storage::{AccessToken, BlobId, BlobStore, BlobStoreJsonExt};

use crate::error::SyncResult;

/// Versions this device holds after the cycle, per dataset kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VersionPatches {
    pub entries: VersionMap,
    pub card_states: VersionMap,
    pub review_logs: VersionMap,
}

impl VersionBook for VersionPatches {
    fn versions(&self, kind: DatasetKind) -> &VersionMap {
        match kind {
            DatasetKind::Entries => &self.entries,
            DatasetKind::CardStates => &self.card_states,
            DatasetKind::ReviewLogs => &self.review_logs,
        }
    }

    fn versions_mut(&mut self, kind: DatasetKind) -> &mut VersionMap {
        match kind {
            DatasetKind::Entries => &mut self.entries,
            DatasetKind::CardStates => &mut self.card_states,
            DatasetKind::ReviewLogs => &mut self.review_logs,
        }
    }
}

impl VersionPatches {
    pub fn is_empty(&self) -> bool {
        DatasetKind::ALL
            .iter()
            .all(|&kind| self.versions(kind).is_empty())
    }
}

/// State shared by every driver during one sync cycle.
#[derive(Debug)]
pub struct SyncContext {
    token: AccessToken,
    remote_meta: RemoteSyncMeta,
    remote_meta_id: Option<BlobId>,
    file_ids: BTreeMap<String, BlobId>,
    learned_file_ids: BTreeMap<String, BlobId>,
    listed: BTreeSet<(DatasetKind, PartitionKey)>,
    tombstones: Tombstones,
    patches: VersionPatches,
    handled: BTreeSet<(DatasetKind, PartitionKey)>,
}

impl SyncContext {
    /// Open a context: list the remote directory and read the metadata blob.
    ///
    /// `cached_file_ids` is the device's name to id cache. A cached id is
    /// kept when the listing still shows it under the same name; names
    /// listed more than once are resolved with `find_by_name`, which
    /// returns the oldest blob.
    pub async fn create(
        store: &dyn BlobStore,
        token: AccessToken,
        cached_file_ids: &BTreeMap<String, String>,
        local_tombstones: &Tombstones,
    ) -> SyncResult<Self> {
        let listing = store.list(&token).await?;

        let mut by_name: BTreeMap<String, Vec<BlobId>> = BTreeMap::new();
        for entry in listing {
            by_name.entry(entry.name).or_default().push(entry.id);
        }

        let mut file_ids = BTreeMap::new();
        let mut listed = BTreeSet::new();
        for (name, ids) in by_name {
            if let Some((kind, key)) = parse_partition_name(&name) {
                listed.insert((kind, key));
            }
            let cached = cached_file_ids
                .get(&name)
                .map(|id| BlobId::new(id.as_str()))
                .filter(|id| ids.contains(id));
            let id = match (cached, ids.as_slice()) {
                (Some(id), _) => id,
                (None, [only]) => only.clone(),
                (None, _) => {
                    debug!(name = %name, copies = ids.len(), "duplicate blob name, resolving oldest");
                    match store.find_by_name(&token, &name).await? {
                        Some(id) => id,
                        None => continue,
                    }
                }
            };
            file_ids.insert(name, id);
        }

        let remote_meta_id = file_ids.get(SYNC_META_NAME).cloned();
        let remote_meta = match &remote_meta_id {
            Some(id) => {
                store
                    .get_json::<RemoteSyncMeta>(&token, id, SYNC_META_NAME)
                    .await?
            }
            None => {
                debug!("no remote metadata yet");
                RemoteSyncMeta::default()
            }
        };

        let tombstones = union_tombstones(&remote_meta.deleted_entries, local_tombstones);

        Ok(Self {
            token,
            remote_meta,
            remote_meta_id,
            file_ids,
            learned_file_ids: BTreeMap::new(),
            listed,
            tombstones,
            patches: VersionPatches::default(),
            handled: BTreeSet::new(),
        })
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// Remote metadata as read when the context was opened.
    pub fn remote_meta(&self) -> &RemoteSyncMeta {
        &self.remote_meta
    }

    pub fn remote_meta_id(&self) -> Option<&BlobId> {
        self.remote_meta_id.as_ref()
    }

    pub fn remote_version(&self, kind: DatasetKind, key: &PartitionKey) -> Option<i64> {
        self.remote_meta.version_of(kind, key.as_str())
    }

    /// Every partition of `kind` the remote knows about, through the
    /// metadata or the listing.
    pub fn remote_keys(&self, kind: DatasetKind) -> BTreeSet<PartitionKey> {
        let mut keys: BTreeSet<PartitionKey> = self
            .listed
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, key)| key.clone())
            .collect();
        for raw in self.remote_meta.versions(kind).keys() {
            match PartitionKey::for_kind(kind, raw) {
                Ok(key) => {
                    keys.insert(key);
                }
                Err(e) => warn!(kind = %kind, key = %raw, error = %e, "ignoring malformed remote key"),
            }
        }
        keys
    }

    /// Whether a blob for the partition showed up in the listing.
    pub fn is_listed(&self, kind: DatasetKind, key: &PartitionKey) -> bool {
        self.listed.contains(&(kind, key.clone()))
    }

    pub fn file_id(&self, name: &str) -> Option<&BlobId> {
        self.file_ids.get(name)
    }

    /// Remember the id of a blob created during this cycle.
    pub fn remember_file_id(&mut self, name: impl Into<String>, id: BlobId) {
        let name = name.into();
        self.file_ids.insert(name.clone(), id.clone());
        self.learned_file_ids.insert(name, id);
    }

    /// The complete name to id map known after the listing and this cycle's creates.
    pub fn file_ids(&self) -> &BTreeMap<String, BlobId> {
        &self.file_ids
    }

    pub fn learned_file_ids(&self) -> &BTreeMap<String, BlobId> {
        &self.learned_file_ids
    }

    /// Remote tombstones unioned with the device's own.
    pub fn tombstones(&self) -> &Tombstones {
        &self.tombstones
    }

    /// Record the version this device now holds for a partition.
    pub fn record_version(&mut self, kind: DatasetKind, key: &PartitionKey, version: i64) {
        let slot = self
            .patches
            .versions_mut(kind)
            .entry(key.as_str().to_string())
            .or_insert(version);
        *slot = (*slot).max(version);
    }

    pub fn patches(&self) -> &VersionPatches {
        &self.patches
    }

    /// Mark a partition as reconciled during this cycle.
    pub fn mark_handled(&mut self, kind: DatasetKind, key: &PartitionKey) {
        self.handled.insert((kind, key.clone()));
    }

    pub fn is_handled(&self, kind: DatasetKind, key: &PartitionKey) -> bool {
        self.handled.contains(&(kind, key.clone()))
    }
}
