//! Partitioned offline-sync engine for vocasync.
//!
//! Devices sync through a dumb blob store by exchanging per-day and
//! per-month partition blobs plus one shared metadata blob of versions and
//! tombstones:
//! - [`SyncContext`]: one metadata read and one listing per cycle
//! - [`PartitionDriver`]: pull, merge-before-push and push-back for any
//!   [`PartitionKind`]
//! - [`commit_sync_meta`]: one max-reconciled metadata write per cycle
//! - [`SyncEngine`]: dirty tracking, debounced flush, lifecycle triggers
//!   and the diagnose report

pub mod commit;
pub mod context;
pub mod diagnose;
pub mod dirty;
pub mod driver;
pub mod engine;
pub mod error;
pub mod kinds;
pub mod migration;
pub mod outcome;
pub mod parallel;

pub use commit::{CommitOutcome, commit_sync_meta};
pub use context::{SyncContext, VersionPatches};
pub use diagnose::{DatasetCounts, DiagnosticReport, PartitionRow, PartitionStatus};
pub use dirty::{DirtySet, DirtyTracker};
pub use driver::{DriverSettings, PartitionDriver, PartitionKind, PullReport, PushReport};
pub use engine::{Lifecycle, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use kinds::{CardStateKind, EntryKind, ReviewLogKind};
pub use migration::{MigrationReport, migrate_legacy, needs_migration};
pub use outcome::{SyncOutcome, SyncSummary};
pub use parallel::{Settled, parallel_map};
