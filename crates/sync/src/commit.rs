//! Metadata commit at the end of a sync cycle.

use tracing::{debug, info, warn};
use vocasync_core::{
    DatasetKind, LocalSyncMeta, RemoteSyncMeta, SYNC_META_NAME, VersionBook, VersionMap,
    clean_tombstones, merge_versions_max, union_tombstones,
};
use vocasync_local::LocalStore;
use vocasync_storage::{BlobStore, BlobStoreJsonExt};

use crate::context::SyncContext;
use crate::error::SyncResult;

/// What a commit did to the remote metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The merged metadata equalled the re-read copy.
    Unchanged,
    Updated,
    Created,
}

/// Fold a finished cycle into the local and remote metadata.
///
/// The local metadata is saved before the remote is touched, so a failed
/// remote write loses nothing: every local version above zero is merged
/// again on the next commit.
pub async fn commit_sync_meta(
    remote: &dyn BlobStore,
    local: &dyn LocalStore,
    ctx: SyncContext,
    local_meta: &mut LocalSyncMeta,
    retention_ms: i64,
    now_ms: i64,
) -> SyncResult<CommitOutcome> {
    for kind in DatasetKind::ALL {
        merge_versions_max(local_meta.versions_mut(kind), ctx.patches().versions(kind));
    }
    // The listing is complete, so the cache is rebuilt rather than merged.
    local_meta.drive_file_ids = ctx
        .file_ids()
        .iter()
        .map(|(name, id)| (name.clone(), id.as_str().to_string()))
        .collect();
    debug!(created = ctx.learned_file_ids().len(), "cached remote file ids");
    local_meta.deleted_entries = clean_tombstones(
        &union_tombstones(&local_meta.deleted_entries, ctx.tombstones()),
        retention_ms,
        now_ms,
    );
    local_meta.last_sync_timestamp = Some(now_ms);
    local.save_sync_meta(local_meta).await?;

    // Another device may have committed since the context was opened.
    let token = ctx.token();
    let existing_id = match ctx.remote_meta_id() {
        Some(id) => Some(id.clone()),
        None => remote.find_by_name(token, SYNC_META_NAME).await?,
    };
    let current = match &existing_id {
        Some(id) => {
            remote
                .get_json::<RemoteSyncMeta>(token, id, SYNC_META_NAME)
                .await?
        }
        None => RemoteSyncMeta::default(),
    };

    let mut merged = current.clone();
    for kind in DatasetKind::ALL {
        let positive: VersionMap = local_meta
            .versions(kind)
            .iter()
            .filter(|&(_, &v)| v > 0)
            .map(|(k, &v)| (k.clone(), v))
            .collect();
        merge_versions_max(merged.versions_mut(kind), &positive);
    }
    merged.deleted_entries = clean_tombstones(
        &union_tombstones(&current.deleted_entries, &local_meta.deleted_entries),
        retention_ms,
        now_ms,
    );

    if merged == current {
        debug!("remote metadata already up to date");
        return Ok(CommitOutcome::Unchanged);
    }

    match existing_id {
        Some(id) => {
            remote.update_json(token, &id, &merged).await?;
            info!(
                entries = merged.partition_versions.len(),
                card_states = merged.fsrs_partition_versions.len(),
                review_logs = merged.review_partition_versions.len(),
                "remote metadata committed"
            );
            Ok(CommitOutcome::Updated)
        }
        None => {
            let id = remote.create_json(token, SYNC_META_NAME, &merged).await?;
            info!(id = %id, "remote metadata created");
            local_meta
                .drive_file_ids
                .insert(SYNC_META_NAME.to_string(), id.as_str().to_string());
            if let Err(e) = local.save_sync_meta(local_meta).await {
                warn!(error = %e, "failed to cache metadata blob id");
            }
            Ok(CommitOutcome::Created)
        }
    }
}
