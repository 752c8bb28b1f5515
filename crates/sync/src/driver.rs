//! Generic partition pull and push.
//!
//! [`PartitionDriver`] holds the algorithm; a [`PartitionKind`] supplies the
//! dataset specifics (blob shape, merge function and local storage calls).

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vocasync_core::{
    DatasetKind, LocalSyncMeta, PartitionKey, Tombstones, VersionBook, now_millis, partition_name,
};
use vocasync_local::{LocalResult, LocalStore};
use vocasync_storage::{BlobId, BlobStore, BlobStoreJsonExt};

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::parallel::parallel_map;

/// Dataset-specific half of a partition driver.
#[async_trait]
pub trait PartitionKind: Send + Sync + 'static {
    /// Records of one partition.
    type Records: Clone + PartialEq + Default + Send + Sync;
    /// Remote blob shape of one partition.
    type Blob: Serialize + DeserializeOwned + Send + Sync;
    /// Pre-partition monolithic blob shape.
    type Legacy: DeserializeOwned + Send;

    fn dataset(&self) -> DatasetKind;

    fn to_blob(&self, key: &PartitionKey, records: Self::Records, version: i64) -> Self::Blob;

    /// Split a blob into its records and embedded version.
    fn from_blob(&self, blob: Self::Blob) -> (Self::Records, i64);

    fn merge(
        &self,
        remote: &Self::Records,
        local: &Self::Records,
        tombstones: &Tombstones,
    ) -> Self::Records;

    fn count_changed(&self, before: &Self::Records, after: &Self::Records) -> usize;

    fn len(&self, records: &Self::Records) -> usize;

    async fn load(&self, local: &dyn LocalStore, key: &PartitionKey)
    -> LocalResult<Self::Records>;

    async fn save(
        &self,
        local: &dyn LocalStore,
        key: &PartitionKey,
        records: &Self::Records,
    ) -> LocalResult<()>;

    /// Every partition key holding local records.
    async fn local_keys(&self, local: &dyn LocalStore) -> LocalResult<Vec<PartitionKey>>;

    /// Group a legacy blob's records by derived partition key.
    fn split_legacy(&self, legacy: Self::Legacy) -> SyncResult<BTreeMap<PartitionKey, Self::Records>>;
}

/// Driver tuning.
#[derive(Clone, Copy, Debug)]
pub struct DriverSettings {
    pub batch_size: usize,
    pub push_back: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            batch_size: 6,
            push_back: true,
        }
    }
}

/// Result of pulling one kind.
#[derive(Clone, Debug, Default)]
pub struct PullReport {
    /// Partitions fetched and merged.
    pub partitions: usize,
    /// Local records added, removed or changed.
    pub records_changed: usize,
    /// Partitions that failed and keep their old version.
    pub failed: Vec<PartitionKey>,
    /// Push-back run for partitions the remote was missing records of.
    pub pushed_back: PushReport,
}

/// Result of pushing one kind.
#[derive(Clone, Debug, Default)]
pub struct PushReport {
    /// Partitions written to the remote.
    pub written: usize,
    /// Partitions whose merged content already matched the remote.
    pub unchanged: usize,
    pub failed: Vec<PartitionKey>,
}

struct Pulled {
    version: i64,
    records_changed: usize,
    needs_push_back: bool,
}

enum Pushed {
    Written {
        version: i64,
        created: Option<BlobId>,
    },
    Unchanged {
        version: i64,
    },
    /// Nothing local and nothing remote.
    Empty,
}

/// One driver per dataset kind, sharing the algorithm.
pub struct PartitionDriver<K: PartitionKind> {
    kind: K,
    remote: Arc<dyn BlobStore>,
    local: Arc<dyn LocalStore>,
    settings: DriverSettings,
}

impl<K: PartitionKind> PartitionDriver<K> {
    pub fn new(
        kind: K,
        remote: Arc<dyn BlobStore>,
        local: Arc<dyn LocalStore>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            kind,
            remote,
            local,
            settings,
        }
    }

    pub fn dataset(&self) -> DatasetKind {
        self.kind.dataset()
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub(crate) fn local(&self) -> &dyn LocalStore {
        self.local.as_ref()
    }

    pub(crate) fn remote(&self) -> &dyn BlobStore {
        self.remote.as_ref()
    }

    pub(crate) fn batch_size(&self) -> usize {
        self.settings.batch_size
    }

    /// The version this device holds for a key, counting this cycle's patches.
    fn held_version(
        &self,
        ctx: &SyncContext,
        local_meta: &LocalSyncMeta,
        key: &PartitionKey,
    ) -> Option<i64> {
        let kind = self.dataset();
        let patched = ctx.patches().version_of(kind, key.as_str());
        let stored = local_meta.version_of(kind, key.as_str());
        match (patched, stored) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fetch and decode a remote partition.
    pub(crate) async fn fetch(
        &self,
        ctx: &SyncContext,
        key: &PartitionKey,
    ) -> SyncResult<(K::Records, i64)> {
        let name = partition_name(self.dataset(), key);
        let id = ctx
            .file_id(&name)
            .ok_or_else(|| SyncError::MissingPartition(name.clone()))?;
        let blob: K::Blob = self.remote.get_json(ctx.token(), id, &name).await?;
        Ok(self.kind.from_blob(blob))
    }

    /// Pull every partition whose remote version is ahead of the device.
    pub async fn pull(
        &self,
        ctx: &mut SyncContext,
        local_meta: &LocalSyncMeta,
    ) -> SyncResult<PullReport> {
        let kind = self.dataset();
        let mut targets = Vec::new();
        for key in ctx.remote_keys(kind) {
            // A listed blob missing from the metadata still counts, at version 0.
            let remote_version = match ctx.remote_version(kind, &key) {
                Some(v) => v,
                None if ctx.is_listed(kind, &key) => 0,
                None => continue,
            };
            match self.held_version(ctx, local_meta, &key) {
                Some(held) if held >= remote_version => {}
                _ => targets.push((key, remote_version)),
            }
        }

        let mut report = PullReport::default();
        if targets.is_empty() {
            debug!(kind = %kind, "nothing to pull");
            return Ok(report);
        }

        let shared: &SyncContext = ctx;
        let settled = parallel_map(targets, self.settings.batch_size, |(key, version)| async move {
            self.pull_one(shared, &key, version).await
        })
        .await;

        let mut push_back = Vec::new();
        for item in settled {
            let (key, _) = item.item;
            match item.result {
                Ok(pulled) => {
                    report.partitions += 1;
                    report.records_changed += pulled.records_changed;
                    ctx.record_version(kind, &key, pulled.version);
                    if pulled.needs_push_back && self.settings.push_back {
                        push_back.push(key);
                    } else if self.settings.push_back {
                        ctx.mark_handled(kind, &key);
                    }
                }
                Err(e) => {
                    warn!(kind = %kind, key = %key, error = %e, "pull failed, will retry next cycle");
                    report.failed.push(key);
                }
            }
        }

        if !push_back.is_empty() {
            debug!(kind = %kind, count = push_back.len(), "pushing back merged partitions");
            report.pushed_back = self.push_keys(ctx, local_meta, push_back).await;
        }

        info!(
            kind = %kind,
            partitions = report.partitions,
            changed = report.records_changed,
            failed = report.failed.len(),
            "pull complete"
        );
        Ok(report)
    }

    async fn pull_one(
        &self,
        ctx: &SyncContext,
        key: &PartitionKey,
        version: i64,
    ) -> SyncResult<Pulled> {
        let (remote_records, blob_version) = self.fetch(ctx, key).await?;
        let version = version.max(blob_version);
        let local_records = self.kind.load(self.local.as_ref(), key).await?;
        let merged = self.kind.merge(&remote_records, &local_records, ctx.tombstones());

        let records_changed = self.kind.count_changed(&local_records, &merged);
        if merged != local_records {
            self.kind.save(self.local.as_ref(), key, &merged).await?;
        }
        debug!(kind = %self.dataset(), key = %key, version, changed = records_changed, "pulled partition");

        Ok(Pulled {
            version,
            records_changed,
            needs_push_back: merged != remote_records,
        })
    }

    /// Push the given keys, merging against the remote copy first.
    ///
    /// Failures are reported per key and leave the key's version untouched.
    pub async fn push_keys(
        &self,
        ctx: &mut SyncContext,
        local_meta: &LocalSyncMeta,
        keys: Vec<PartitionKey>,
    ) -> PushReport {
        let kind = self.dataset();
        let mut report = PushReport::default();
        if keys.is_empty() {
            return report;
        }

        let shared: &SyncContext = ctx;
        let work: Vec<(PartitionKey, Option<i64>)> = keys
            .into_iter()
            .map(|key| {
                let held = self.held_version(shared, local_meta, &key);
                (key, held)
            })
            .collect();
        let settled = parallel_map(work, self.settings.batch_size, |(key, held)| async move {
            self.push_one(shared, &key, held).await
        })
        .await;

        for item in settled {
            let (key, _) = item.item;
            match item.result {
                Ok(Pushed::Written { version, created }) => {
                    if let Some(id) = created {
                        ctx.remember_file_id(partition_name(kind, &key), id);
                    }
                    ctx.record_version(kind, &key, version);
                    ctx.mark_handled(kind, &key);
                    report.written += 1;
                }
                Ok(Pushed::Unchanged { version }) => {
                    ctx.record_version(kind, &key, version);
                    ctx.mark_handled(kind, &key);
                    report.unchanged += 1;
                }
                Ok(Pushed::Empty) => {
                    ctx.mark_handled(kind, &key);
                }
                Err(e) => {
                    warn!(kind = %kind, key = %key, error = %e, "push failed, will retry next cycle");
                    report.failed.push(key);
                }
            }
        }
        report
    }

    /// Push every local partition not already reconciled in this cycle.
    pub async fn push_all(
        &self,
        ctx: &mut SyncContext,
        local_meta: &LocalSyncMeta,
    ) -> SyncResult<PushReport> {
        let kind = self.dataset();
        let keys: Vec<PartitionKey> = self
            .kind
            .local_keys(self.local.as_ref())
            .await?
            .into_iter()
            .filter(|key| !ctx.is_handled(kind, key))
            .collect();
        let report = self.push_keys(ctx, local_meta, keys).await;
        info!(
            kind = %kind,
            written = report.written,
            unchanged = report.unchanged,
            failed = report.failed.len(),
            "push complete"
        );
        Ok(report)
    }

    async fn push_one(
        &self,
        ctx: &SyncContext,
        key: &PartitionKey,
        held: Option<i64>,
    ) -> SyncResult<Pushed> {
        let kind = self.dataset();
        let name = partition_name(kind, key);
        let local_records = self.kind.load(self.local.as_ref(), key).await?;
        let meta_version = ctx.remote_version(kind, key).unwrap_or(0);

        let existing = match ctx.file_id(&name) {
            Some(id) => Some(id.clone()),
            // Another device may have created it since the listing.
            None => self.remote.find_by_name(ctx.token(), &name).await?,
        };

        let Some(id) = existing else {
            if self.kind.len(&local_records) == 0 {
                return Ok(Pushed::Empty);
            }
            let version = next_version(meta_version, held.unwrap_or(0));
            let blob = self.kind.to_blob(key, local_records, version);
            let id = self.remote.create_json(ctx.token(), &name, &blob).await?;
            debug!(kind = %kind, key = %key, version, id = %id, "created partition");
            return Ok(Pushed::Written {
                version,
                created: Some(id),
            });
        };

        let blob: K::Blob = self.remote.get_json(ctx.token(), &id, &name).await?;
        let (remote_records, blob_version) = self.kind.from_blob(blob);
        let remote_version = meta_version.max(blob_version);
        let merged = self.kind.merge(&remote_records, &local_records, ctx.tombstones());
        if merged != local_records {
            self.kind.save(self.local.as_ref(), key, &merged).await?;
        }

        if merged == remote_records {
            debug!(kind = %kind, key = %key, version = remote_version, "remote already current");
            return Ok(Pushed::Unchanged {
                version: remote_version,
            });
        }

        let version = next_version(remote_version, held.unwrap_or(0));
        let blob = self.kind.to_blob(key, merged, version);
        self.remote.update_json(ctx.token(), &id, &blob).await?;
        debug!(kind = %kind, key = %key, version, "updated partition");
        Ok(Pushed::Written {
            version,
            created: None,
        })
    }
}

/// A version strictly above both the remote and the held one, and never
/// below the wall clock.
fn next_version(remote: i64, held: i64) -> i64 {
    now_millis()
        .max(remote.saturating_add(1))
        .max(held.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_version_beats_both_inputs() {
        let far_future = now_millis() + 10_000_000;
        assert_eq!(next_version(far_future, 0), far_future + 1);
        assert_eq!(next_version(0, far_future), far_future + 1);
        assert!(next_version(0, 0) >= now_millis() - 1_000);
    }
}
