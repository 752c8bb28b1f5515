//! One-time conversion of pre-partition monolithic blobs.

use tracing::{debug, info};
use vocasync_core::{LocalSyncMeta, PartitionKey, VersionBook};
use vocasync_storage::BlobStoreJsonExt;

use crate::context::SyncContext;
use crate::driver::{PartitionDriver, PartitionKind, PushReport};
use crate::error::SyncResult;

/// Result of a legacy migration for one kind.
#[derive(Clone, Debug, Default)]
pub struct MigrationReport {
    /// Partition keys derived from the legacy blob.
    pub partitions: Vec<PartitionKey>,
    pub records: usize,
    pub pushed: PushReport,
}

impl MigrationReport {
    pub fn ran(&self) -> bool {
        !self.partitions.is_empty()
    }
}

/// Whether a kind has never been synced in partitioned form by anyone.
pub fn needs_migration<K: PartitionKind>(
    driver: &PartitionDriver<K>,
    ctx: &SyncContext,
    local_meta: &LocalSyncMeta,
) -> bool {
    let kind = driver.dataset();
    ctx.remote_meta().versions(kind).is_empty() && local_meta.versions(kind).is_empty()
}

/// Merge the legacy blob of `driver`'s kind into the local store and push
/// every derived partition once.
///
/// Only merges, never overwrites, so running it twice yields the same state.
pub async fn migrate_legacy<K: PartitionKind>(
    driver: &PartitionDriver<K>,
    ctx: &mut SyncContext,
    local_meta: &LocalSyncMeta,
) -> SyncResult<MigrationReport> {
    let kind = driver.dataset();
    let mut report = MigrationReport::default();
    if !needs_migration(driver, ctx, local_meta) {
        return Ok(report);
    }

    let name = kind.legacy_blob_name();
    let Some(id) = ctx.file_id(name).cloned() else {
        debug!(kind = %kind, "no legacy blob");
        return Ok(report);
    };

    let legacy: K::Legacy = driver.remote().get_json(ctx.token(), &id, name).await?;
    let groups = driver.kind().split_legacy(legacy)?;
    if groups.is_empty() {
        debug!(kind = %kind, "legacy blob is empty");
        return Ok(report);
    }

    for (key, records) in &groups {
        let local_records = driver.kind().load(driver.local(), key).await?;
        let merged = driver.kind().merge(records, &local_records, ctx.tombstones());
        if merged != local_records {
            driver.kind().save(driver.local(), key, &merged).await?;
        }
        report.records += driver.kind().len(records);
        ctx.record_version(kind, key, 0);
        report.partitions.push(key.clone());
    }

    info!(
        kind = %kind,
        partitions = report.partitions.len(),
        records = report.records,
        "migrating legacy blob"
    );
    report.pushed = driver
        .push_keys(ctx, local_meta, report.partitions.clone())
        .await;
    Ok(report)
}
