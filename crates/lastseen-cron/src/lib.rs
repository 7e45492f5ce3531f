// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maintenance jobs for the LastSeen activity tracker.
//!
//! Three independent loops run against the store: retention cleanup of
//! message activity, scheduled report dispatch, and database backups with
//! rotation. Each loop stops when the shared cancellation token fires.

pub mod backup;
pub mod reports;
pub mod retention;
pub mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use lastseen_config::model::{BackupConfig, MaintenanceConfig};
use lastseen_core::ReportPublisher;
use lastseen_storage::SqliteStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use backup::{BackupJob, BackupOutcome};
pub use reports::{ReportJob, ReportRun, build_report, is_due};
pub use retention::RetentionJob;
pub use scheduler::spawn_interval;

/// Handles of the running maintenance loops.
pub struct Maintenance {
    handles: Vec<JoinHandle<()>>,
}

impl Maintenance {
    /// Start every maintenance loop.
    ///
    /// The backup loop checks immediately so a fresh process snapshots the
    /// database once at startup; the other loops wait one full period.
    pub fn spawn(
        store: Arc<SqliteStore>,
        publisher: Arc<dyn ReportPublisher>,
        schedule: &MaintenanceConfig,
        backup: &BackupConfig,
        cancel: CancellationToken,
    ) -> Self {
        let mut handles = Vec::with_capacity(3);

        let retention = Arc::new(RetentionJob::new(store.clone()));
        handles.push(spawn_interval(
            "retention",
            Duration::from_secs(schedule.retention_interval_secs),
            false,
            cancel.clone(),
            move || {
                let job = retention.clone();
                async move {
                    job.run().await;
                }
            },
        ));

        let reports = Arc::new(ReportJob::new(store.clone(), publisher));
        handles.push(spawn_interval(
            "reports",
            Duration::from_secs(schedule.report_check_interval_secs),
            false,
            cancel.clone(),
            move || {
                let job = reports.clone();
                async move {
                    job.run().await;
                }
            },
        ));

        if backup.enabled {
            let job = Arc::new(BackupJob::new(store, backup.clone()));
            handles.push(spawn_interval(
                "backup",
                Duration::from_secs(schedule.backup_check_interval_secs),
                true,
                cancel,
                move || {
                    let job = job.clone();
                    async move {
                        job.check().await;
                    }
                },
            ));
        } else {
            info!("backups disabled by configuration");
        }

        info!(jobs = handles.len(), "maintenance jobs started");
        Self { handles }
    }

    /// Wait for every loop to observe cancellation.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "maintenance job ended abnormally");
            }
        }
    }
}
