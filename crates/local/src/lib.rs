//! Device-local row cache for vocasync.
//!
//! Holds the records the app reads and writes offline, grouped so the sync
//! engine can load and replace whole partitions:
//! - Vocabulary entries by day
//! - FSRS card state by month
//! - Review logs by month
//! - The device's sync bookkeeping

pub mod error;
pub mod memory;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{LocalError, LocalResult};
pub use memory::MemoryStore;
pub use repos::{CardStateRepo, EntryRepo, ReviewLogRepo, SyncStateRepo};
pub use store::{LocalStore, SqliteStore};

use std::sync::Arc;
use vocasync_core::config::LocalConfig;

/// Create a local store from configuration.
pub async fn from_config(config: &LocalConfig) -> LocalResult<Arc<dyn LocalStore>> {
    match config {
        LocalConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            tracing::debug!(path = %path.display(), "opened local sqlite store");
            Ok(Arc::new(store) as Arc<dyn LocalStore>)
        }
        LocalConfig::Memory => Ok(Arc::new(MemoryStore::new()) as Arc<dyn LocalStore>),
    }
}
