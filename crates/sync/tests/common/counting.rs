use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vocasync_core::SYNC_META_NAME;
use vocasync_storage::{
    AccessToken, BlobEntry, BlobId, BlobStore, MemoryBackend, StorageError, StorageResult,
};

/// Blob store wrapper that counts calls per operation and fails on demand.
///
/// Failures are injected by blob name, either for every call or for writes
/// only. Several devices can share one `CountingStore` through an `Arc`.
#[allow(dead_code)]
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryBackend,
    pub finds: AtomicUsize,
    pub gets: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub lists: AtomicUsize,
    pub meta_writes: AtomicUsize,
    failing: Mutex<BTreeSet<String>>,
    failing_writes: Mutex<BTreeSet<String>>,
    written: Mutex<Vec<String>>,
    list_delay: Mutex<Option<Duration>>,
}

#[allow(dead_code)]
impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_writes_on(&self, name: &str) {
        self.failing_writes.lock().unwrap().insert(name.to_string());
    }

    pub fn heal(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
        self.failing_writes.lock().unwrap().remove(name);
    }

    pub fn slow_list(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Total creates plus updates.
    pub fn writes(&self) -> usize {
        Self::count(&self.creates) + Self::count(&self.updates)
    }

    /// Names written (created or updated), in call order.
    pub fn written_names(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }

    pub fn reset_counters(&self) {
        for counter in [
            &self.finds,
            &self.gets,
            &self.creates,
            &self.updates,
            &self.lists,
            &self.meta_writes,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        self.written.lock().unwrap().clear();
    }

    fn check(&self, name: &str) -> StorageResult<()> {
        if self.failing.lock().unwrap().contains(name) {
            return Err(StorageError::Backend(format!("injected failure for {name}")));
        }
        Ok(())
    }

    fn check_write(&self, name: &str) -> StorageResult<()> {
        self.check(name)?;
        if self.failing_writes.lock().unwrap().contains(name) {
            return Err(StorageError::Backend(format!("injected write failure for {name}")));
        }
        Ok(())
    }

    async fn name_of(&self, token: &AccessToken, id: &BlobId) -> StorageResult<String> {
        self.inner
            .list(token)
            .await?
            .into_iter()
            .find(|entry| &entry.id == id)
            .map(|entry| entry.name)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn record_write(&self, name: &str) {
        if name == SYNC_META_NAME {
            self.meta_writes.fetch_add(1, Ordering::SeqCst);
        }
        self.written.lock().unwrap().push(name.to_string());
    }
}

#[async_trait]
impl BlobStore for CountingStore {
    async fn find_by_name(
        &self,
        token: &AccessToken,
        name: &str,
    ) -> StorageResult<Option<BlobId>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_name(token, name).await
    }

    async fn get(&self, token: &AccessToken, id: &BlobId) -> StorageResult<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check(&self.name_of(token, id).await?)?;
        self.inner.get(token, id).await
    }

    async fn create(
        &self,
        token: &AccessToken,
        name: &str,
        content: Bytes,
    ) -> StorageResult<BlobId> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.check_write(name)?;
        self.record_write(name);
        self.inner.create(token, name, content).await
    }

    async fn update(&self, token: &AccessToken, id: &BlobId, content: Bytes) -> StorageResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let name = self.name_of(token, id).await?;
        self.check_write(&name)?;
        self.record_write(&name);
        self.inner.update(token, id, content).await
    }

    async fn list(&self, token: &AccessToken) -> StorageResult<Vec<BlobEntry>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.list(token).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}
