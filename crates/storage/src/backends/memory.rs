//! In-process blob store.

use crate::auth::AccessToken;
use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobEntry, BlobId, BlobStore, validate_name};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    blobs: HashMap<BlobId, (String, Bytes)>,
    names: BTreeMap<String, BlobId>,
}

/// Blob store kept in memory. Several handles to one `Arc<MemoryBackend>`
/// behave like devices sharing a remote.
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.inner.read().await.blobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBackend {
    async fn find_by_name(
        &self,
        _token: &AccessToken,
        name: &str,
    ) -> StorageResult<Option<BlobId>> {
        Ok(self.inner.read().await.names.get(name).cloned())
    }

    async fn get(&self, _token: &AccessToken, id: &BlobId) -> StorageResult<Bytes> {
        self.inner
            .read()
            .await
            .blobs
            .get(id)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn create(
        &self,
        _token: &AccessToken,
        name: &str,
        content: Bytes,
    ) -> StorageResult<BlobId> {
        validate_name(name)?;
        let id = BlobId::new(format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        let mut inner = self.inner.write().await;
        inner
            .names
            .entry(name.to_string())
            .or_insert_with(|| id.clone());
        inner.blobs.insert(id.clone(), (name.to_string(), content));
        Ok(id)
    }

    async fn update(&self, _token: &AccessToken, id: &BlobId, content: Bytes) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        match inner.blobs.get_mut(id) {
            Some((_, current)) => {
                *current = content;
                Ok(())
            }
            None => Err(StorageError::NotFound(id.to_string())),
        }
    }

    async fn list(&self, _token: &AccessToken) -> StorageResult<Vec<BlobEntry>> {
        let inner = self.inner.read().await;
        let mut entries: Vec<BlobEntry> = inner
            .blobs
            .iter()
            .map(|(id, (name, _))| BlobEntry {
                id: id.clone(),
                name: name.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
