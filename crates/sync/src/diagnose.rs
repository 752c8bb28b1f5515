//! Read-only comparison of local and remote sync state.

use std::collections::BTreeSet;
use std::fmt;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;
use vocasync_core::{DatasetKind, LocalSyncMeta, PartitionKey, VersionBook};

use crate::context::SyncContext;
use crate::dirty::DirtyTracker;
use crate::driver::{PartitionDriver, PartitionKind};
use crate::error::{SyncError, SyncResult};
use crate::parallel::parallel_map;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionStatus {
    InSync,
    PullPending,
    PushPending,
    LocalOnly,
    RemoteOnly,
}

impl PartitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InSync => "in-sync",
            Self::PullPending => "pull-pending",
            Self::PushPending => "push-pending",
            Self::LocalOnly => "local-only",
            Self::RemoteOnly => "remote-only",
        }
    }
}

impl fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionRow {
    pub kind: DatasetKind,
    pub key: PartitionKey,
    pub local_version: Option<i64>,
    pub remote_version: Option<i64>,
    pub status: PartitionStatus,
}

/// Record counts per dataset kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DatasetCounts {
    pub entries: u64,
    pub card_states: u64,
    pub review_logs: u64,
}

impl DatasetCounts {
    pub fn get(&self, kind: DatasetKind) -> u64 {
        match kind {
            DatasetKind::Entries => self.entries,
            DatasetKind::CardStates => self.card_states,
            DatasetKind::ReviewLogs => self.review_logs,
        }
    }

    pub fn set(&mut self, kind: DatasetKind, value: u64) {
        match kind {
            DatasetKind::Entries => self.entries = value,
            DatasetKind::CardStates => self.card_states = value,
            DatasetKind::ReviewLogs => self.review_logs = value,
        }
    }
}

/// Snapshot produced by `SyncEngine::diagnose`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub local: DatasetCounts,
    pub remote: DatasetCounts,
    pub partitions: Vec<PartitionRow>,
    /// Remote partitions that could not be fetched for counting.
    pub remote_failures: usize,
    pub dirty: usize,
    pub tombstones: usize,
    pub last_sync: Option<i64>,
}

impl DiagnosticReport {
    pub fn rows_with(&self, status: PartitionStatus) -> impl Iterator<Item = &PartitionRow> {
        self.partitions.iter().filter(move |row| row.status == status)
    }

    pub fn is_in_sync(&self) -> bool {
        self.dirty == 0
            && self
                .partitions
                .iter()
                .all(|row| row.status == PartitionStatus::InSync)
    }
}

fn version_cell(v: Option<i64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last_sync = self
            .last_sync
            .and_then(|ms| OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok())
            .and_then(|ts| ts.format(&Rfc3339).ok())
            .unwrap_or_else(|| "never".to_string());

        writeln!(f, "last sync:  {last_sync}")?;
        writeln!(f, "dirty:      {} partition(s)", self.dirty)?;
        writeln!(f, "tombstones: {}", self.tombstones)?;
        writeln!(f)?;
        writeln!(f, "{:<12} {:>10} {:>10}", "DATASET", "LOCAL", "REMOTE")?;
        for kind in DatasetKind::ALL {
            writeln!(
                f,
                "{:<12} {:>10} {:>10}",
                kind.as_str(),
                self.local.get(kind),
                self.remote.get(kind)
            )?;
        }
        if self.remote_failures > 0 {
            writeln!(f, "({} remote partition(s) unreadable)", self.remote_failures)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:<12} {:<10} {:>14} {:>14}  STATUS",
            "DATASET", "PARTITION", "LOCAL", "REMOTE"
        )?;
        for row in &self.partitions {
            writeln!(
                f,
                "{:<12} {:<10} {:>14} {:>14}  {}",
                row.kind.as_str(),
                row.key.as_str(),
                version_cell(row.local_version),
                version_cell(row.remote_version),
                row.status
            )?;
        }
        Ok(())
    }
}

/// Status of one partition from what each side holds.
pub fn classify(
    local_present: bool,
    local_version: Option<i64>,
    remote_present: bool,
    remote_version: Option<i64>,
    dirty: bool,
) -> PartitionStatus {
    if !remote_present {
        return PartitionStatus::LocalOnly;
    }
    if !local_present {
        return PartitionStatus::RemoteOnly;
    }
    if dirty {
        return PartitionStatus::PushPending;
    }
    match (local_version, remote_version) {
        (Some(l), Some(r)) if l == r => PartitionStatus::InSync,
        (Some(l), Some(r)) if l < r => PartitionStatus::PullPending,
        (None, Some(_)) => PartitionStatus::PullPending,
        _ => PartitionStatus::PushPending,
    }
}

/// Per-kind part of a report.
pub(crate) struct KindDiagnosis {
    pub remote_records: u64,
    pub remote_failures: usize,
    pub rows: Vec<PartitionRow>,
}

pub(crate) async fn diagnose_kind<K: PartitionKind>(
    driver: &PartitionDriver<K>,
    ctx: &SyncContext,
    local_meta: &LocalSyncMeta,
    dirty: &DirtyTracker,
) -> SyncResult<KindDiagnosis> {
    let kind = driver.dataset();
    let remote_keys = ctx.remote_keys(kind);
    let local_keys: BTreeSet<PartitionKey> =
        driver.kind().local_keys(driver.local()).await?.into_iter().collect();

    let settled = parallel_map(
        remote_keys.iter().cloned().collect(),
        driver.batch_size(),
        |key| async move {
            let (records, _) = driver.fetch(ctx, &key).await?;
            Ok::<u64, SyncError>(driver.kind().len(&records) as u64)
        },
    )
    .await;

    let mut remote_records = 0;
    let mut remote_failures = 0;
    for item in settled {
        match item.result {
            Ok(n) => remote_records += n,
            Err(e) => {
                warn!(kind = %kind, key = %item.item, error = %e, "could not read remote partition");
                remote_failures += 1;
            }
        }
    }

    let mut all_keys: BTreeSet<PartitionKey> = remote_keys.union(&local_keys).cloned().collect();
    for raw in local_meta.versions(kind).keys() {
        if let Ok(key) = PartitionKey::for_kind(kind, raw) {
            all_keys.insert(key);
        }
    }

    let rows = all_keys
        .into_iter()
        .map(|key| {
            let local_version = local_meta.version_of(kind, key.as_str());
            let remote_version = ctx.remote_version(kind, &key);
            let status = classify(
                local_keys.contains(&key) || local_version.is_some(),
                local_version,
                remote_keys.contains(&key),
                remote_version,
                dirty.contains(kind, &key),
            );
            PartitionRow {
                kind,
                key,
                local_version,
                remote_version,
                status,
            }
        })
        .collect();

    Ok(KindDiagnosis {
        remote_records,
        remote_failures,
        rows,
    })
}
