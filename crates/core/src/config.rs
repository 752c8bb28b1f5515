//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.sync.validate()?;
        self.remote.validate()?;
        Ok(())
    }
}

/// Sync engine tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum partitions fetched or written concurrently.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Quiet period after the last local edit before dirty partitions are flushed.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Days a tombstone keeps suppressing its record.
    #[serde(default = "default_tombstone_retention_days")]
    pub tombstone_retention_days: u64,
    /// Re-upload a pulled partition when the device held records the remote lacked.
    #[serde(default = "default_true")]
    pub push_back: bool,
    /// Convert pre-partition monolithic blobs on the first sync.
    #[serde(default = "default_true")]
    pub migrate_legacy: bool,
}

fn default_batch_size() -> usize {
    6
}

fn default_debounce_ms() -> u64 {
    5_000
}

fn default_tombstone_retention_days() -> u64 {
    crate::DEFAULT_TOMBSTONE_RETENTION_DAYS
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            debounce_ms: default_debounce_ms(),
            tombstone_retention_days: default_tombstone_retention_days(),
            push_back: true,
            migrate_legacy: true,
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Tombstone retention window in milliseconds.
    pub fn tombstone_retention_ms(&self) -> i64 {
        // Saturate instead of wrapping on absurd retention values
        let days = i64::try_from(self.tombstone_retention_days).unwrap_or(i64::MAX);
        days.saturating_mul(86_400_000)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("sync.batch_size must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Remote blob store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteConfig {
    /// A directory standing in for the remote store (shared folder, tests).
    Filesystem {
        /// Root directory.
        path: PathBuf,
    },
    /// In-process store, lost on exit.
    Memory,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/remote"),
        }
    }
}

impl RemoteConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            RemoteConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("remote filesystem path must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Local row cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LocalConfig {
    /// SQLite database file.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// In-process store, lost on exit.
    Memory,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/local.db"),
        }
    }
}

/// Credential configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Static bearer token. Prefer VOCASYNC_AUTH__TOKEN over writing it to a file.
    #[serde(default)]
    pub token: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
