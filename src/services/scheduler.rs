use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::services::backup::BackupJob;
use crate::services::coordinator::{RunCoordinator, RunOptions};

/// Triggers the update run on a cron schedule, followed by the offsite backup.
pub struct Scheduler {
    coordinator: Arc<RunCoordinator>,
    backup: Arc<BackupJob>,
    config: SchedulerConfig,
    /// Held for the duration of a run; a tick that finds it taken is skipped.
    in_flight: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(
        coordinator: Arc<RunCoordinator>,
        backup: Arc<BackupJob>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            coordinator,
            backup,
            config,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Runs until Ctrl-C.
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        let mut sched = JobScheduler::new().await?;

        let coordinator = Arc::clone(&self.coordinator);
        let backup = Arc::clone(&self.backup);
        let in_flight = Arc::clone(&self.in_flight);
        let backup_after_update = self.config.backup_after_update;

        let job = Job::new_async(self.config.cron_expression.as_str(), move |_uuid, _lock| {
            let coordinator = Arc::clone(&coordinator);
            let backup = Arc::clone(&backup);
            let in_flight = Arc::clone(&in_flight);
            Box::pin(async move {
                let Ok(_guard) = in_flight.try_lock() else {
                    warn!(event = "job_skipped", job_name = "update", "Previous run still in progress");
                    return;
                };

                run_once(&coordinator, &backup, backup_after_update).await;
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;

        info!("Scheduler running with cron: {}", self.config.cron_expression);

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received, stopping scheduler");

        // Let an in-flight run reach a terminal state before exiting.
        let _guard = self.in_flight.lock().await;
        sched.shutdown().await?;
        Ok(())
    }
}

/// One scheduled tick: update, then back up when the update succeeded.
pub async fn run_once(coordinator: &RunCoordinator, backup: &BackupJob, backup_after_update: bool) {
    let start = std::time::Instant::now();
    info!(event = "job_started", job_name = "update", "Starting scheduled update");

    let report = coordinator.run(RunOptions::default()).await;
    if report.is_success() {
        info!(
            event = "job_finished",
            job_name = "update",
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Scheduled update finished"
        );
    } else {
        for failure in &report.failures {
            error!(event = "job_failed", job_name = "update", failure = %failure, "Scheduled update failed");
        }
        return;
    }

    if !backup_after_update {
        return;
    }

    let start = std::time::Instant::now();
    info!(event = "job_started", job_name = "backup", "Starting offsite backup");
    match backup.run(chrono::Utc::now()).await {
        Ok(report) => info!(
            event = "job_finished",
            job_name = "backup",
            artifact = %report.artifact,
            pruned = report.deleted.len(),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Offsite backup finished"
        ),
        Err(e) => error!(event = "job_failed", job_name = "backup", error = %e, "Offsite backup failed"),
    }
}
