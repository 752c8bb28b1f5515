//! The process-wide sync handle.
//!
//! [`SyncEngine`] owns the dirty tracker, the debounce timer and the
//! in-progress flag. Every trigger (`flush`, `full_sync`, lifecycle events,
//! the debounce timer) goes through it, and at most one cycle runs at a
//! time. A trigger that arrives while a cycle is running returns
//! [`SyncOutcome::Busy`] without doing anything.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vocasync_core::config::{AppConfig, SyncConfig};
use vocasync_core::{
    CardState, DatasetKind, LocalSyncMeta, PartitionKey, ReviewLogEntry, VocabEntry, now_millis,
};
use vocasync_local::LocalStore;
use vocasync_storage::{AccessToken, BlobStore, StaticTokenProvider, TokenProvider};

use crate::commit::{CommitOutcome, commit_sync_meta};
use crate::context::SyncContext;
use crate::diagnose::{DatasetCounts, DiagnosticReport, diagnose_kind};
use crate::dirty::{DirtySet, DirtyTracker};
use crate::driver::{DriverSettings, PartitionDriver, PushReport};
use crate::error::{SyncError, SyncResult};
use crate::kinds::{CardStateKind, EntryKind, ReviewLogKind};
use crate::migration::migrate_legacy;
use crate::outcome::{SyncOutcome, SyncSummary};

/// App lifecycle transitions the engine reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// The app is being hidden: flush now.
    Background,
    /// The app came back: run a full sync.
    Foreground,
}

struct Inner {
    remote: Arc<dyn BlobStore>,
    local: Arc<dyn LocalStore>,
    tokens: Arc<dyn TokenProvider>,
    config: SyncConfig,
    entries: PartitionDriver<EntryKind>,
    card_states: PartitionDriver<CardStateKind>,
    review_logs: PartitionDriver<ReviewLogKind>,
    dirty: Mutex<DirtyTracker>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every arm and cancel; a timer only fires for its own generation.
    timer_generation: AtomicU64,
    running: AtomicBool,
    shut_down: AtomicBool,
    /// Serializes read-modify-write of the local sync metadata.
    meta_lock: Mutex<()>,
}

/// Clears the in-progress flag when the cycle ends, however it ends.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Cloneable handle to the sync engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn BlobStore>,
        local: Arc<dyn LocalStore>,
        tokens: Arc<dyn TokenProvider>,
        config: SyncConfig,
    ) -> Self {
        let settings = DriverSettings {
            batch_size: config.batch_size,
            push_back: config.push_back,
        };
        Self {
            inner: Arc::new(Inner {
                entries: PartitionDriver::new(EntryKind, remote.clone(), local.clone(), settings),
                card_states: PartitionDriver::new(
                    CardStateKind,
                    remote.clone(),
                    local.clone(),
                    settings,
                ),
                review_logs: PartitionDriver::new(
                    ReviewLogKind,
                    remote.clone(),
                    local.clone(),
                    settings,
                ),
                remote,
                local,
                tokens,
                config,
                dirty: Mutex::new(DirtyTracker::new()),
                debounce: Mutex::new(None),
                timer_generation: AtomicU64::new(0),
                running: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                meta_lock: Mutex::new(()),
            }),
        }
    }

    /// Create an engine and restore the dirty partitions saved by the last
    /// [`shutdown`](Self::shutdown).
    pub async fn open(
        remote: Arc<dyn BlobStore>,
        local: Arc<dyn LocalStore>,
        tokens: Arc<dyn TokenProvider>,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        let engine = Self::new(remote, local, tokens, config);
        let meta = engine.inner.local.load_sync_meta().await?;
        let mut restored = 0;
        {
            let mut dirty = engine.inner.dirty.lock().await;
            for (kind, keys) in meta.pending_partitions {
                restored += keys.len();
                dirty.restore(kind, keys);
            }
        }
        if restored > 0 {
            debug!(restored, "restored pending partitions");
        }
        Ok(engine)
    }

    /// Build the remote and local stores from configuration and open an engine.
    pub async fn from_config(config: &AppConfig) -> SyncResult<Self> {
        let remote = vocasync_storage::from_config(&config.remote).await?;
        let local = vocasync_local::from_config(&config.local).await?;
        let tokens = Arc::new(StaticTokenProvider::from_option(config.auth.token.clone()));
        Self::open(remote, local, tokens, config.sync.clone()).await
    }

    pub fn local(&self) -> &Arc<dyn LocalStore> {
        &self.inner.local
    }

    pub fn remote(&self) -> &Arc<dyn BlobStore> {
        &self.inner.remote
    }

    /// Number of partitions waiting to be pushed.
    pub async fn pending(&self) -> usize {
        self.inner.dirty.lock().await.len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    // --- local edits ---

    /// Store an entry locally and mark its day dirty.
    pub async fn put_entry(&self, entry: &VocabEntry) -> SyncResult<PartitionKey> {
        let day = self.inner.local.upsert_entry(entry).await?;
        self.mark_dirty(DatasetKind::Entries, day.clone()).await;
        Ok(day)
    }

    /// Remove an entry and its card state locally and record a tombstone.
    ///
    /// Returns whether the entry existed locally. The tombstone is written
    /// either way, so a copy only the remote holds is suppressed too.
    pub async fn delete_entry(&self, id: &str) -> SyncResult<bool> {
        let day = self.inner.local.delete_entry(id).await?;
        let card_month = self.inner.local.delete_card_state(id).await?;
        {
            let _meta = self.inner.meta_lock.lock().await;
            let mut meta = self.inner.local.load_sync_meta().await?;
            meta.deleted_entries.insert(id.to_string(), now_millis());
            self.inner.local.save_sync_meta(&meta).await?;
        }
        if let Some(month) = card_month {
            self.mark_dirty(DatasetKind::CardStates, month).await;
        }
        let existed = day.is_some();
        if let Some(day) = day {
            self.mark_dirty(DatasetKind::Entries, day).await;
        }
        info!(id, existed, "entry deleted");
        Ok(existed)
    }

    pub async fn put_card_state(&self, vocab_id: &str, state: &CardState) -> SyncResult<PartitionKey> {
        let month = self.inner.local.upsert_card_state(vocab_id, state).await?;
        self.mark_dirty(DatasetKind::CardStates, month.clone()).await;
        Ok(month)
    }

    pub async fn append_review_log(&self, log: &ReviewLogEntry) -> SyncResult<PartitionKey> {
        let month = self.inner.local.append_review_log(log).await?;
        self.mark_dirty(DatasetKind::ReviewLogs, month.clone()).await;
        Ok(month)
    }

    // --- triggers ---

    /// Record a dirty partition and (re)arm the debounce timer.
    pub async fn mark_dirty(&self, kind: DatasetKind, key: PartitionKey) {
        let newly = self.inner.dirty.lock().await.mark(kind, key.clone());
        if newly {
            debug!(kind = %kind, key = %key, "partition marked dirty");
        }
        if !self.inner.shut_down.load(Ordering::SeqCst) {
            self.arm_debounce().await;
        }
    }

    /// Push the dirty partitions now, migrating legacy blobs first if needed.
    pub async fn flush(&self) -> SyncOutcome {
        self.cancel_debounce().await;
        self.run_flush().await
    }

    /// Migrate legacy blobs if needed, flush, pull, then push every local partition.
    pub async fn full_sync(&self) -> SyncOutcome {
        self.cancel_debounce().await;
        let (_guard, token) = match self.begin().await {
            Ok(started) => started,
            Err(outcome) => return outcome,
        };
        let pending = self.inner.dirty.lock().await.drain();
        match self.full_cycle(token, &pending).await {
            Ok(summary) => {
                info!(
                    pulled = summary.pulled,
                    pushed = summary.pushed,
                    failed = summary.failed,
                    "full sync complete"
                );
                SyncOutcome::Completed(summary)
            }
            Err(e) => {
                error!(error = %e, "full sync failed");
                SyncOutcome::Failed(e.to_string())
            }
        }
    }

    pub async fn handle_lifecycle(&self, event: Lifecycle) -> SyncOutcome {
        debug!(?event, "lifecycle event");
        match event {
            Lifecycle::Background => self.flush().await,
            Lifecycle::Foreground => self.full_sync().await,
        }
    }

    /// Stop the timer, save the dirty set, and refuse further triggers.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.cancel_debounce().await;

        let pending = self.inner.dirty.lock().await.snapshot();
        let _meta = self.inner.meta_lock.lock().await;
        let mut meta = self.inner.local.load_sync_meta().await?;
        if meta.pending_partitions != pending {
            meta.pending_partitions = pending;
            self.inner.local.save_sync_meta(&meta).await?;
        }
        info!("sync engine stopped");
        Ok(())
    }

    /// Build a read-only report comparing local and remote state.
    pub async fn diagnose(&self) -> SyncResult<DiagnosticReport> {
        let token = self
            .inner
            .tokens
            .access_token()
            .await?
            .ok_or(SyncError::NotAuthenticated)?;
        let local = self.inner.local.as_ref();
        let local_meta = local.load_sync_meta().await?;
        let ctx = SyncContext::create(
            self.inner.remote.as_ref(),
            token,
            &local_meta.drive_file_ids,
            &local_meta.deleted_entries,
        )
        .await?;
        let dirty = self.inner.dirty.lock().await.clone();

        let mut report = DiagnosticReport {
            local: DatasetCounts {
                entries: local.count_entries().await?,
                card_states: local.count_card_states().await?,
                review_logs: local.count_review_logs().await?,
            },
            dirty: dirty.len(),
            tombstones: ctx.tombstones().len(),
            last_sync: local_meta.last_sync_timestamp,
            ..Default::default()
        };

        let parts = [
            diagnose_kind(&self.inner.entries, &ctx, &local_meta, &dirty).await?,
            diagnose_kind(&self.inner.card_states, &ctx, &local_meta, &dirty).await?,
            diagnose_kind(&self.inner.review_logs, &ctx, &local_meta, &dirty).await?,
        ];
        for (kind, part) in DatasetKind::ALL.into_iter().zip(parts) {
            report.remote.set(kind, part.remote_records);
            report.remote_failures += part.remote_failures;
            report.partitions.extend(part.rows);
        }
        Ok(report)
    }

    // --- internals ---

    /// Claim the cycle and fetch a token.
    async fn begin(&self) -> Result<(CycleGuard<'_>, AccessToken), SyncOutcome> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(SyncOutcome::ShutDown);
        }
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync already running");
            return Err(SyncOutcome::Busy);
        }
        let guard = CycleGuard(&self.inner.running);

        match self.inner.tokens.access_token().await {
            Ok(Some(token)) => Ok((guard, token)),
            Ok(None) => {
                info!("not signed in, skipping sync");
                Err(SyncOutcome::NotAuthenticated)
            }
            Err(e) => {
                warn!(error = %e, "token provider failed");
                Err(SyncOutcome::Failed(e.to_string()))
            }
        }
    }

    async fn run_flush(&self) -> SyncOutcome {
        let (_guard, token) = match self.begin().await {
            Ok(started) => started,
            Err(outcome) => return outcome,
        };
        let pending = self.inner.dirty.lock().await.drain();
        if pending.values().all(|keys| keys.is_empty()) {
            debug!("nothing to flush");
            return SyncOutcome::Completed(SyncSummary::default());
        }
        match self.flush_cycle(token, &pending).await {
            Ok(summary) => {
                info!(pushed = summary.pushed, failed = summary.failed, "flush complete");
                SyncOutcome::Completed(summary)
            }
            Err(e) => {
                error!(error = %e, "flush failed");
                SyncOutcome::Failed(e.to_string())
            }
        }
    }

    /// Open a context, putting the drained keys back if that fails.
    async fn open_context(
        &self,
        token: AccessToken,
        pending: &DirtySet,
    ) -> SyncResult<(SyncContext, LocalSyncMeta)> {
        let opened = async {
            let local_meta = self.inner.local.load_sync_meta().await?;
            let ctx = SyncContext::create(
                self.inner.remote.as_ref(),
                token,
                &local_meta.drive_file_ids,
                &local_meta.deleted_entries,
            )
            .await?;
            Ok::<_, SyncError>((ctx, local_meta))
        }
        .await;
        if opened.is_err() {
            self.restore_dirty(pending).await;
        }
        opened
    }

    async fn restore_dirty(&self, keys: &DirtySet) {
        let mut dirty = self.inner.dirty.lock().await;
        for (kind, keys) in keys {
            dirty.restore(*kind, keys.iter().cloned());
        }
    }

    async fn flush_cycle(&self, token: AccessToken, pending: &DirtySet) -> SyncResult<SyncSummary> {
        let (mut ctx, local_meta) = self.open_context(token, pending).await?;
        let mut summary = SyncSummary::default();
        let held_back = self.migrate(&mut ctx, &local_meta, &mut summary).await;
        self.push_pending(&mut ctx, &local_meta, pending, &held_back, &mut summary)
            .await;
        summary.commit = Some(self.commit(ctx).await?);
        Ok(summary)
    }

    async fn full_cycle(&self, token: AccessToken, pending: &DirtySet) -> SyncResult<SyncSummary> {
        let (mut ctx, local_meta) = self.open_context(token, pending).await?;
        let mut summary = SyncSummary::default();
        let held_back = self.migrate(&mut ctx, &local_meta, &mut summary).await;
        self.push_pending(&mut ctx, &local_meta, pending, &held_back, &mut summary)
            .await;

        for kind in DatasetKind::ALL {
            if held_back.contains(&kind) {
                continue;
            }
            let report = match kind {
                DatasetKind::Entries => self.inner.entries.pull(&mut ctx, &local_meta).await?,
                DatasetKind::CardStates => self.inner.card_states.pull(&mut ctx, &local_meta).await?,
                DatasetKind::ReviewLogs => self.inner.review_logs.pull(&mut ctx, &local_meta).await?,
            };
            summary.pulled += report.records_changed;
            summary.failed += report.failed.len();
            self.tally_push(&mut summary, kind, report.pushed_back).await;
        }

        for kind in DatasetKind::ALL {
            if held_back.contains(&kind) {
                continue;
            }
            let report = match kind {
                DatasetKind::Entries => self.inner.entries.push_all(&mut ctx, &local_meta).await?,
                DatasetKind::CardStates => {
                    self.inner.card_states.push_all(&mut ctx, &local_meta).await?
                }
                DatasetKind::ReviewLogs => {
                    self.inner.review_logs.push_all(&mut ctx, &local_meta).await?
                }
            };
            self.tally_push(&mut summary, kind, report).await;
        }

        summary.commit = Some(self.commit(ctx).await?);
        Ok(summary)
    }

    /// Run legacy migration for every kind that still needs it.
    ///
    /// Runs before anything is pushed, since a push records versions and
    /// closes the migration window. Returns the kinds whose migration hit a
    /// transient error: they sit this cycle out so the window stays open.
    async fn migrate(
        &self,
        ctx: &mut SyncContext,
        local_meta: &LocalSyncMeta,
        summary: &mut SyncSummary,
    ) -> BTreeSet<DatasetKind> {
        let mut held_back = BTreeSet::new();
        if !self.inner.config.migrate_legacy {
            return held_back;
        }
        for kind in DatasetKind::ALL {
            let result = match kind {
                DatasetKind::Entries => migrate_legacy(&self.inner.entries, ctx, local_meta).await,
                DatasetKind::CardStates => {
                    migrate_legacy(&self.inner.card_states, ctx, local_meta).await
                }
                DatasetKind::ReviewLogs => {
                    migrate_legacy(&self.inner.review_logs, ctx, local_meta).await
                }
            };
            match result {
                Ok(report) => {
                    summary.migrated += report.partitions.len();
                    self.tally_push(summary, kind, report.pushed).await;
                }
                Err(e) if e.is_transient() => {
                    warn!(kind = %kind, error = %e, "legacy migration failed, will retry next cycle");
                    summary.failed += 1;
                    held_back.insert(kind);
                }
                Err(e) => {
                    warn!(kind = %kind, error = %e, "skipping unreadable legacy blob");
                    summary.failed += 1;
                }
            }
        }
        held_back
    }

    /// Push the drained dirty keys, re-marking those of held-back kinds.
    async fn push_pending(
        &self,
        ctx: &mut SyncContext,
        local_meta: &LocalSyncMeta,
        pending: &DirtySet,
        held_back: &BTreeSet<DatasetKind>,
        summary: &mut SyncSummary,
    ) {
        for (kind, keys) in pending {
            if held_back.contains(kind) {
                self.inner.dirty.lock().await.restore(*kind, keys.iter().cloned());
                continue;
            }
            let keys: Vec<PartitionKey> = keys.iter().cloned().collect();
            let report = self.push_kind(*kind, ctx, local_meta, keys).await;
            self.tally_push(summary, *kind, report).await;
        }
    }

    async fn push_kind(
        &self,
        kind: DatasetKind,
        ctx: &mut SyncContext,
        local_meta: &LocalSyncMeta,
        keys: Vec<PartitionKey>,
    ) -> PushReport {
        match kind {
            DatasetKind::Entries => self.inner.entries.push_keys(ctx, local_meta, keys).await,
            DatasetKind::CardStates => self.inner.card_states.push_keys(ctx, local_meta, keys).await,
            DatasetKind::ReviewLogs => self.inner.review_logs.push_keys(ctx, local_meta, keys).await,
        }
    }

    /// Add a push report to the summary and re-mark its failed keys.
    async fn tally_push(&self, summary: &mut SyncSummary, kind: DatasetKind, report: PushReport) {
        summary.pushed += report.written;
        summary.failed += report.failed.len();
        if !report.failed.is_empty() {
            self.inner.dirty.lock().await.restore(kind, report.failed);
        }
    }

    async fn commit(&self, ctx: SyncContext) -> SyncResult<CommitOutcome> {
        let _meta = self.inner.meta_lock.lock().await;
        let mut local_meta = self.inner.local.load_sync_meta().await?;
        local_meta.pending_partitions = self.inner.dirty.lock().await.snapshot();
        commit_sync_meta(
            self.inner.remote.as_ref(),
            self.inner.local.as_ref(),
            ctx,
            &mut local_meta,
            self.inner.config.tombstone_retention_ms(),
            now_millis(),
        )
        .await
    }

    async fn cancel_debounce(&self) {
        self.inner.timer_generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.inner.debounce.lock().await.take() {
            handle.abort();
        }
    }

    async fn arm_debounce(&self) {
        let generation = self.inner.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.inner.config.debounce();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        let mut slot = self.inner.debounce.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let deadline = tokio::time::Instant::now() + delay;
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut slot = inner.debounce.lock().await;
                if inner.timer_generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                // Detach, so a later mark cannot abort the flush below.
                slot.take();
            }
            let engine = SyncEngine { inner };
            loop {
                match engine.run_flush().await {
                    SyncOutcome::Busy => {
                        debug!("debounced flush deferred, cycle in progress");
                        tokio::time::sleep(delay).await;
                    }
                    outcome => {
                        debug!(%outcome, "debounced flush finished");
                        break;
                    }
                }
            }
        }));
    }
}
