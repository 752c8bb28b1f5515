//! What a sync trigger reports back to the app.

use std::fmt;

use crate::commit::CommitOutcome;

/// Counters of a finished cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Local records added, removed or changed by pulls.
    pub pulled: usize,
    /// Partitions written to the remote.
    pub pushed: usize,
    /// Partitions that failed and will be retried.
    pub failed: usize,
    /// Partitions created from legacy blobs.
    pub migrated: usize,
    /// `None` when the cycle had nothing to commit.
    pub commit: Option<CommitOutcome>,
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sync complete: pulled {}, pushed {}", self.pulled, self.pushed)
    }
}

/// Result of `flush`, `full_sync` or a lifecycle trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncSummary),
    /// The cycle aborted; dirty partitions are kept for the next one.
    Failed(String),
    /// Another cycle was already running.
    Busy,
    /// The token provider had no credential.
    NotAuthenticated,
    /// The engine was shut down.
    ShutDown,
}

impl SyncOutcome {
    pub fn summary(&self) -> Option<&SyncSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(summary) => summary.fmt(f),
            Self::Failed(_) => f.write_str("sync failed"),
            Self::Busy => f.write_str("sync already in progress"),
            Self::NotAuthenticated => f.write_str("not signed in"),
            Self::ShutDown => f.write_str("sync stopped"),
        }
    }
}
