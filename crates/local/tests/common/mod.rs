//! Local store test utilities.

use std::sync::Arc;
use tempfile::TempDir;
use vocasync_core::{CardState, ReviewLogEntry, VocabEntry};
use vocasync_local::{LocalResult, LocalStore, MemoryStore, SqliteStore};

/// 2024-03-10T12:00:00Z
pub const MAR_10: i64 = 1_710_072_000_000;
/// 2024-03-11T12:00:00Z
pub const MAR_11: i64 = MAR_10 + 86_400_000;
/// 2024-04-02T12:00:00Z
pub const APR_02: i64 = 1_712_059_200_000;

/// A SQLite store in a temp directory that is removed on drop.
#[allow(dead_code)]
pub struct TestLocal {
    pub store: Arc<dyn LocalStore>,
    _temp_dir: TempDir,
}

impl TestLocal {
    pub async fn sqlite() -> LocalResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(temp_dir.path().join("local.db")).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    pub fn store(&self) -> Arc<dyn LocalStore> {
        self.store.clone()
    }
}

/// Run a test against both the SQLite and the in-memory store.
pub async fn run_local_test_both<F, Fut>(test_fn: F)
where
    F: Fn(Arc<dyn LocalStore>) -> Fut + Clone,
    Fut: std::future::Future<Output = ()>,
{
    let sqlite = TestLocal::sqlite()
        .await
        .expect("Failed to create SQLite test store");
    test_fn.clone()(sqlite.store()).await;

    test_fn(Arc::new(MemoryStore::new())).await;
}

#[allow(dead_code)]
pub fn entry(id: &str, ts: i64) -> VocabEntry {
    VocabEntry::new(id, format!("word-{id}"), format!("meaning-{id}"), ts).expect("valid entry")
}

#[allow(dead_code)]
pub fn card(due: i64, reps: u32) -> CardState {
    let mut state = CardState::new(due);
    state.reps = reps;
    state
}

#[allow(dead_code)]
pub fn log(vocab_id: &str, reviewed_at: i64) -> ReviewLogEntry {
    ReviewLogEntry::new(vocab_id, reviewed_at, 3)
}
