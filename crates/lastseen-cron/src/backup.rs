// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic database snapshots with rotation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lastseen_config::model::BackupConfig;
use lastseen_storage::SqliteStore;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one backup check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The interval has not elapsed since the last backup.
    NotDue,
    Created { path: PathBuf, rotated: usize },
    Failed,
}

/// Snapshots the database once `interval_hours` have passed since the last
/// snapshot taken by this process. The first check always fires.
pub struct BackupJob {
    store: Arc<SqliteStore>,
    config: BackupConfig,
    last_backup: Mutex<Option<Instant>>,
}

impl BackupJob {
    pub fn new(store: Arc<SqliteStore>, config: BackupConfig) -> Self {
        Self {
            store,
            config,
            last_backup: Mutex::new(None),
        }
    }

    pub fn folder(&self) -> &Path {
        Path::new(&self.config.folder)
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.interval_hours.saturating_mul(3_600))
    }

    pub async fn check(&self) -> BackupOutcome {
        let mut last = self.last_backup.lock().await;
        if last.is_some_and(|at| at.elapsed() < self.interval()) {
            debug!("backup not due yet");
            return BackupOutcome::NotDue;
        }

        let Some(path) = self.store.create_backup(self.folder()).await else {
            warn!(folder = %self.config.folder, "scheduled backup failed");
            return BackupOutcome::Failed;
        };
        *last = Some(Instant::now());

        let rotated = self
            .store
            .cleanup_old_backups(self.folder(), self.config.retention_count)
            .await;
        info!(path = %path.display(), rotated, "database backup created");
        BackupOutcome::Created { path, rotated }
    }
}
