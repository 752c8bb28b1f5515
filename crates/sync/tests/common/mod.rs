//! Sync engine test utilities.

#![allow(dead_code)]

pub mod counting;

#[allow(unused_imports)]
pub use counting::CountingStore;

use std::collections::BTreeMap;
use std::sync::Arc;
use vocasync_core::config::SyncConfig;
use vocasync_core::{CardState, CardStates, LocalSyncMeta, ReviewLogEntry, VocabEntry};
use vocasync_local::{CardStateRepo, EntryRepo, LocalStore, MemoryStore, SyncStateRepo};
use vocasync_storage::{AccessToken, BlobStore, BlobStoreJsonExt, StaticTokenProvider};
use vocasync_sync::SyncEngine;

pub const TOKEN: &str = "test-token";

/// 2024-05-03T10:00:00Z
pub const MAY_03: i64 = 1_714_730_400_000;
pub const DAY_MS: i64 = 86_400_000;
/// 2024-05-04T10:00:00Z
pub const MAY_04: i64 = MAY_03 + DAY_MS;
/// 2024-05-05T10:00:00Z
pub const MAY_05: i64 = MAY_03 + 2 * DAY_MS;
/// 2024-06-01T10:00:00Z
pub const JUN_01: i64 = 1_717_236_000_000;

pub fn token() -> AccessToken {
    AccessToken::new(TOKEN)
}

/// Engine tuning with a debounce long enough to never fire on its own.
pub fn config() -> SyncConfig {
    SyncConfig {
        debounce_ms: 60_000,
        ..SyncConfig::default()
    }
}

/// One device: an engine plus direct access to its local store.
pub struct Device {
    pub engine: SyncEngine,
    pub local: Arc<MemoryStore>,
}

impl Device {
    pub fn new(remote: &Arc<CountingStore>) -> Self {
        Self::with_config(remote, config())
    }

    pub fn with_config(remote: &Arc<CountingStore>, config: SyncConfig) -> Self {
        let local = Arc::new(MemoryStore::new());
        Self::on(remote, local, StaticTokenProvider::new(TOKEN), config)
    }

    pub fn signed_out(remote: &Arc<CountingStore>) -> Self {
        let local = Arc::new(MemoryStore::new());
        Self::on(remote, local, StaticTokenProvider::signed_out(), config())
    }

    pub fn on(
        remote: &Arc<CountingStore>,
        local: Arc<MemoryStore>,
        tokens: StaticTokenProvider,
        config: SyncConfig,
    ) -> Self {
        let engine = SyncEngine::new(
            remote.clone() as Arc<dyn BlobStore>,
            local.clone() as Arc<dyn LocalStore>,
            Arc::new(tokens),
            config,
        );
        Self { engine, local }
    }

    /// Every local entry keyed by id.
    pub async fn entries(&self) -> BTreeMap<String, VocabEntry> {
        let mut all = BTreeMap::new();
        for day in self.local.entry_days().await.unwrap() {
            for entry in self.local.entries_for_day(&day).await.unwrap() {
                all.insert(entry.id.clone(), entry);
            }
        }
        all
    }

    pub async fn card_states(&self) -> CardStates {
        let mut all = CardStates::new();
        for month in self.local.card_state_months().await.unwrap() {
            all.extend(self.local.card_states_for_month(&month).await.unwrap());
        }
        all
    }

    pub async fn meta(&self) -> LocalSyncMeta {
        self.local.load_sync_meta().await.unwrap()
    }
}

pub fn entry(id: &str, ts: i64) -> VocabEntry {
    VocabEntry::new(id, format!("word-{id}"), format!("meaning-{id}"), ts).expect("valid entry")
}

pub fn card(due: i64, reps: u32, last_review: Option<i64>) -> CardState {
    let mut state = CardState::new(due);
    state.reps = reps;
    state.last_review = last_review;
    state
}

pub fn log(vocab_id: &str, reviewed_at: i64) -> ReviewLogEntry {
    ReviewLogEntry::new(vocab_id, reviewed_at, 3)
}

/// Write a JSON blob straight to the remote.
pub async fn seed<T: serde::Serialize + Sync>(remote: &CountingStore, name: &str, value: &T) {
    remote.create_json(&token(), name, value).await.unwrap();
}

/// Read and decode a remote blob by name.
pub async fn read<T: serde::de::DeserializeOwned + Send>(remote: &CountingStore, name: &str) -> T {
    let id = remote
        .find_by_name(&token(), name)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("{name} missing on remote"));
    remote.get_json(&token(), &id, name).await.unwrap()
}

/// Whether a blob with this name exists on the remote.
pub async fn exists(remote: &CountingStore, name: &str) -> bool {
    remote.find_by_name(&token(), name).await.unwrap().is_some()
}
