//! Persisted local sync bookkeeping.

use crate::error::LocalResult;
use async_trait::async_trait;
use vocasync_core::LocalSyncMeta;

/// Well-known key the local sync metadata is stored under.
pub const SYNC_META_KEY: &str = "sync_meta";

#[async_trait]
pub trait SyncStateRepo: Send + Sync {
    /// Load the local sync metadata, or the empty default on first run.
    async fn load_sync_meta(&self) -> LocalResult<LocalSyncMeta>;

    async fn save_sync_meta(&self, meta: &LocalSyncMeta) -> LocalResult<()>;
}
