//! The update run state machine.
//!
//! `GATE_CHECK → SNAPSHOT → RESOLVE → FETCH → UPSERT → FINALIZE`, ending in
//! `COMPLETED` or `ABORTED`. Gate and snapshot failures abort before anything
//! is written. From `RESOLVE` on, each entity kind runs its own pipeline and a
//! failing kind does not stop the other one. The checkpoint is read once at the
//! start of `RESOLVE` and written at most once, in `FINALIZE`.

use crate::clients::{Catalog, CatalogError};
use crate::config::Config;
use crate::db::{Store, UpsertCounts};
use crate::domain::{CatalogId, DateWindow, EntityKind, RunState};
use crate::models::{FetchedRecord, MovieBundle, TvBundle};
use crate::services::backup::{ArtifactStore, BackupError, BackupVerifier};
use crate::services::changes::ChangeSetResolver;
use crate::services::fetcher::RecordFetcher;
use crate::services::preview::write_preview;
use crate::services::retry::RetryPolicy;
use crate::services::snapshot::{SnapshotError, SnapshotManager};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors raised while driving a run. They end up as [`RunFailure`] reasons.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Backup gate failed: {0}")]
    Gate(String),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Preview error: {0}")]
    Preview(String),

    #[error("Invalid window: {0}")]
    Window(String),
}

impl From<sea_orm::DbErr> for SyncError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Resolve and fetch, but write CSV previews instead of touching the store.
    pub dry_run: bool,
    /// Process only the first N resolved ids of each kind.
    pub sample: Option<usize>,
    /// Look back this many days instead of resuming from the checkpoint.
    pub force_days: Option<u32>,
    /// Proceed even when the offsite backup gate fails.
    pub skip_backup_check: bool,
}

/// Why part of a run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    pub state: RunState,
    pub kind: Option<EntityKind>,
    pub reason: String,
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "[{} {kind}] {}", self.state, self.reason),
            None => write!(f, "[{}] {}", self.state, self.reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindReport {
    pub kind: EntityKind,
    pub window: Option<DateWindow>,
    pub resolved: usize,
    pub truncated: bool,
    pub processed: usize,
    pub fetched: usize,
    pub removed: Vec<CatalogId>,
    pub failed_ids: Vec<CatalogId>,
    pub written: UpsertCounts,
    pub resolved_through: Option<DateTime<Utc>>,
    pub previews: Vec<PathBuf>,
    pub succeeded: bool,
}

impl KindReport {
    const fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            window: None,
            resolved: 0,
            truncated: false,
            processed: 0,
            fetched: 0,
            removed: Vec::new(),
            failed_ids: Vec::new(),
            written: UpsertCounts {
                entities: 0,
                associations: 0,
                pruned: 0,
            },
            resolved_through: None,
            previews: Vec::new(),
            succeeded: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub options: RunOptions,
    pub state: RunState,
    pub gate: Option<String>,
    pub snapshot: Option<String>,
    pub kinds: Vec<KindReport>,
    pub failures: Vec<RunFailure>,
    pub checkpoint_written: Option<DateTime<Utc>>,
}

impl RunReport {
    const fn new(started_at: DateTime<Utc>, options: RunOptions) -> Self {
        Self {
            started_at,
            options,
            state: RunState::GateCheck,
            gate: None,
            snapshot: None,
            kinds: Vec::new(),
            failures: Vec::new(),
            checkpoint_written: None,
        }
    }

    /// Completed with every kind succeeding.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed && self.failures.is_empty()
    }

    #[must_use]
    pub fn kind(&self, kind: EntityKind) -> Option<&KindReport> {
        self.kinds.iter().find(|k| k.kind == kind)
    }

    fn enter(&mut self, state: RunState, kind: Option<EntityKind>) {
        self.state = state;
        match kind {
            Some(kind) => info!(event = "run_state", state = %state, kind = %kind, "Entering state"),
            None => info!(event = "run_state", state = %state, "Entering state"),
        }
    }

    fn fail(&mut self, kind: Option<EntityKind>, reason: impl Into<String>) {
        let failure = RunFailure {
            state: self.state,
            kind,
            reason: reason.into(),
        };
        error!(event = "run_failure", failure = %failure, "Run step failed");
        self.failures.push(failure);
    }

    fn abort(mut self, reason: impl Into<String>) -> Self {
        self.fail(None, reason);
        self.state = RunState::Aborted;
        self
    }
}

pub struct RunCoordinator {
    config: Arc<Config>,
    store: Store,
    resolver: ChangeSetResolver,
    fetcher: RecordFetcher,
    verifier: BackupVerifier,
    snapshots: SnapshotManager,
}

impl RunCoordinator {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        store: Store,
        catalog: Arc<dyn Catalog>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        Self::with_retry(config, store, catalog, artifacts, retry)
    }

    #[must_use]
    pub fn with_retry(
        config: Arc<Config>,
        store: Store,
        catalog: Arc<dyn Catalog>,
        artifacts: Arc<dyn ArtifactStore>,
        retry: RetryPolicy,
    ) -> Self {
        let update = &config.update;
        let resolver = ChangeSetResolver::new(
            Arc::clone(&catalog),
            retry,
            update.max_window_days,
            update.max_changes_per_kind,
        );
        let fetcher = RecordFetcher::new(catalog, retry, update.fetch_workers);
        let verifier = BackupVerifier::new(artifacts, config.backup.artifact_prefix.clone());
        let snapshots = SnapshotManager::new(
            store.clone(),
            config.snapshot.tables.clone(),
            config.snapshot.retain_sets,
        );

        Self {
            config,
            store,
            resolver,
            fetcher,
            verifier,
            snapshots,
        }
    }

    pub async fn run(&self, options: RunOptions) -> RunReport {
        self.run_at(options, Utc::now()).await
    }

    /// Runs the state machine with `now` as the run's reference instant.
    pub async fn run_at(&self, options: RunOptions, now: DateTime<Utc>) -> RunReport {
        let start = std::time::Instant::now();
        info!(
            event = "run_started",
            dry_run = options.dry_run,
            sample = ?options.sample,
            force_days = ?options.force_days,
            skip_backup_check = options.skip_backup_check,
            "Starting update run"
        );

        let report = self.drive(RunReport::new(now, options), now).await;

        let outcome = if report.is_success() {
            "success"
        } else if report.state == RunState::Aborted {
            "aborted"
        } else {
            "partial"
        };
        metrics::counter!("reelsync_runs_total", "outcome" => outcome).increment(1);
        metrics::histogram!("reelsync_run_duration_seconds").record(start.elapsed().as_secs_f64());

        info!(
            event = "run_finished",
            state = %report.state,
            outcome,
            failures = report.failures.len(),
            checkpoint = ?report.checkpoint_written,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Update run finished"
        );
        report
    }

    async fn drive(&self, mut report: RunReport, now: DateTime<Utc>) -> RunReport {
        let options = report.options;

        report.enter(RunState::GateCheck, None);
        if let Err(reason) = self.check_gate(&mut report, now).await {
            if options.dry_run {
                warn!(reason = %reason, "Backup gate failed; continuing because this is a dry run");
            } else {
                return report.abort(reason.to_string());
            }
        }

        if !options.dry_run && self.config.snapshot.enabled {
            report.enter(RunState::Snapshot, None);
            match self.snapshots.snapshot(now).await {
                Ok(outcome) => report.snapshot = Some(outcome.timestamp),
                Err(e) => return report.abort(e.to_string()),
            }
        }

        report.enter(RunState::Resolve, None);
        let since = match self.lower_bound(options, now).await {
            Ok(since) => since,
            Err(e) => return report.abort(e.to_string()),
        };

        let preview_dir = Path::new(&self.config.update.preview_dir)
            .join(now.format("%Y%m%d_%H%M%S").to_string());

        for kind in EntityKind::ALL {
            let kind_report = self
                .run_kind(&mut report, kind, since, now, &preview_dir)
                .await;
            report.kinds.push(kind_report);
        }

        report.enter(RunState::Finalize, None);
        self.finalize(&mut report).await;

        report.state = RunState::Completed;
        report
    }

    async fn check_gate(&self, report: &mut RunReport, now: DateTime<Utc>) -> Result<(), SyncError> {
        if report.options.skip_backup_check {
            warn!("Backup gate bypassed by request");
            report.gate = Some("skipped".to_string());
            return Ok(());
        }

        let max_age = chrono::Duration::hours(i64::from(self.config.backup.max_age_hours));
        let verdict = self.verifier.verify(max_age, now).await?;
        report.gate = Some(verdict.reason.clone());

        if verdict.passed {
            info!(artifact = ?verdict.artifact, reason = %verdict.reason, "Backup gate passed");
            Ok(())
        } else {
            Err(SyncError::Gate(verdict.reason))
        }
    }

    async fn lower_bound(
        &self,
        options: RunOptions,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SyncError> {
        if let Some(days) = options.force_days {
            info!(days, "Window forced by request");
            return days_before(now, days);
        }

        let checkpoint = self
            .store
            .load_checkpoint(&self.config.update.job_name)
            .await?;
        match checkpoint {
            Some(checkpoint) => Ok(checkpoint),
            None => {
                let days = self.config.update.default_lookback_days;
                info!(days, "No checkpoint recorded; using default lookback");
                days_before(now, days)
            }
        }
    }

    async fn run_kind(
        &self,
        report: &mut RunReport,
        kind: EntityKind,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
        preview_dir: &Path,
    ) -> KindReport {
        let mut out = KindReport::new(kind);
        let failures_before = report.failures.len();

        report.enter(RunState::Resolve, Some(kind));
        let set = match self.resolver.resolve(kind, since, now).await {
            Ok(set) => set,
            Err(e) => {
                report.fail(Some(kind), SyncError::from(e).to_string());
                return out;
            }
        };
        out.window = Some(set.window);
        out.resolved = set.ids.len();
        out.truncated = set.truncated;
        out.resolved_through = Some(set.resolved_through);

        let mut ids = set.ids;
        if let Some(n) = report.options.sample {
            ids.truncate(n);
        }
        out.processed = ids.len();

        report.enter(RunState::Fetch, Some(kind));
        let results = self.fetcher.fetch_all(kind, &ids).await;
        out.fetched = results.records.len();
        out.removed = results.removed;
        out.failed_ids = results.failed.iter().map(|(id, _)| *id).collect();

        let label = kind.to_string();
        metrics::counter!("reelsync_records_fetched_total", "kind" => label.clone())
            .increment(as_count(out.fetched));
        metrics::counter!("reelsync_records_removed_total", "kind" => label.clone())
            .increment(as_count(out.removed.len()));
        metrics::counter!("reelsync_records_failed_total", "kind" => label.clone())
            .increment(as_count(out.failed_ids.len()));

        if !results.failed.is_empty() {
            warn!(
                kind = %kind,
                failed = results.failed.len(),
                ids = ?out.failed_ids,
                "Some records could not be fetched and were skipped"
            );
        }

        report.enter(RunState::Upsert, Some(kind));
        if report.options.dry_run {
            match write_preview(preview_dir, kind, &results.records) {
                Ok(paths) => {
                    info!(kind = %kind, rows = results.records.len(), files = paths.len(), dir = %preview_dir.display(), "Dry-run preview written");
                    out.previews = paths;
                }
                Err(e) => report.fail(Some(kind), SyncError::Preview(format!("{e:#}")).to_string()),
            }
        } else {
            let batch_size = self.config.update.batch_size.max(1);
            for (index, batch) in results.records.chunks(batch_size).enumerate() {
                match self.write_batch(kind, batch).await {
                    Ok(counts) => {
                        out.written += counts;
                        info!(
                            kind = %kind,
                            batch = index + 1,
                            entities = counts.entities,
                            associations = counts.associations,
                            pruned = counts.pruned,
                            "Batch committed"
                        );
                    }
                    Err(e) => {
                        report.fail(
                            Some(kind),
                            format!("batch {} rolled back: {e}", index + 1),
                        );
                        break;
                    }
                }
            }
            metrics::counter!("reelsync_rows_upserted_total", "kind" => label)
                .increment(as_count(out.written.entities + out.written.associations));
        }

        out.succeeded = report.failures.len() == failures_before;
        out
    }

    async fn write_batch(
        &self,
        kind: EntityKind,
        batch: &[FetchedRecord],
    ) -> Result<UpsertCounts, SyncError> {
        let prune = self.config.update.prune_stale_credits;
        let counts = match kind {
            EntityKind::Movie => {
                let bundles: Vec<MovieBundle> = batch
                    .iter()
                    .filter_map(|r| match r {
                        FetchedRecord::Movie(b) => Some(b.clone()),
                        FetchedRecord::Tv(_) => None,
                    })
                    .collect();
                self.store.upsert_movies(&bundles, prune).await?
            }
            EntityKind::Tv => {
                let bundles: Vec<TvBundle> = batch
                    .iter()
                    .filter_map(|r| match r {
                        FetchedRecord::Tv(b) => Some(b.clone()),
                        FetchedRecord::Movie(_) => None,
                    })
                    .collect();
                self.store.upsert_tv_shows(&bundles, prune).await?
            }
        };
        Ok(counts)
    }

    async fn finalize(&self, report: &mut RunReport) {
        let options = report.options;
        if options.dry_run {
            info!("Dry run; checkpoint unchanged");
            return;
        }
        if options.sample.is_some() {
            info!("Sampled run; checkpoint unchanged");
            return;
        }
        if !report.failures.is_empty() || report.kinds.iter().any(|k| !k.succeeded) {
            warn!(
                failures = report.failures.len(),
                "Run had failures; checkpoint unchanged"
            );
            return;
        }

        let Some(through) = report.kinds.iter().filter_map(|k| k.resolved_through).min() else {
            return;
        };

        match self
            .store
            .save_checkpoint(&self.config.update.job_name, through)
            .await
        {
            Ok(()) => {
                info!(event = "checkpoint_written", last_run = %through.to_rfc3339(), "Checkpoint advanced");
                report.checkpoint_written = Some(through);
            }
            Err(e) => report.fail(None, SyncError::from(e).to_string()),
        }
    }
}

fn days_before(now: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, SyncError> {
    chrono::Duration::try_days(i64::from(days))
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| SyncError::Window(format!("cannot look back {days} days from {now}")))
}

fn as_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}
