// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pooled SQLite connections with PRAGMA setup, migrations, and lifecycle.
//!
//! Checkout never waits: an idle pooled handle is used when one is available,
//! otherwise a supplementary handle is opened for the single operation and
//! closed right after it. Every operation runs inside one transaction.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lastseen_config::model::StorageConfig;
use lastseen_core::LastSeenError;
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

/// Convert a tokio-rusqlite error into `LastSeenError::Storage`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> LastSeenError {
    LastSeenError::Storage {
        source: Box::new(e),
    }
}

#[derive(Debug, Clone, Copy)]
struct ConnectionSettings {
    wal_mode: bool,
    busy_timeout: Duration,
}

fn apply_pragmas(conn: &rusqlite::Connection, settings: ConnectionSettings) -> rusqlite::Result<()> {
    conn.busy_timeout(settings.busy_timeout)?;
    if settings.wal_mode {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
    }
    conn.execute_batch("PRAGMA foreign_keys = ON;")
}

/// A fixed-size pool of `tokio-rusqlite` handles onto one database file.
pub struct Database {
    path: PathBuf,
    settings: ConnectionSettings,
    idle: Mutex<Vec<Connection>>,
    closed: AtomicBool,
}

impl Database {
    /// Open the database at `config.database_path`, apply pending migrations,
    /// and fill the pool with `config.pool_size` handles.
    pub async fn open(config: &StorageConfig) -> Result<Self, LastSeenError> {
        Self::open_path(Path::new(&config.database_path), config).await
    }

    /// Like [`Database::open`] but with an explicit file path.
    pub async fn open_path(path: &Path, config: &StorageConfig) -> Result<Self, LastSeenError> {
        let settings = ConnectionSettings {
            wal_mode: config.wal_mode,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(LastSeenError::storage)?;
        }

        let migrate_path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(), LastSeenError> {
            let mut conn =
                rusqlite::Connection::open(&migrate_path).map_err(LastSeenError::storage)?;
            apply_pragmas(&conn, settings).map_err(LastSeenError::storage)?;
            crate::migrations::run_migrations(&mut conn)
        })
        .await
        .map_err(|e| LastSeenError::Internal(format!("migration task failed: {e}")))??;

        let db = Self {
            path: path.to_path_buf(),
            settings,
            idle: Mutex::new(Vec::with_capacity(config.pool_size)),
            closed: AtomicBool::new(false),
        };

        for _ in 0..config.pool_size.max(1) {
            let conn = db.connect().await?;
            db.idle_handles().push(conn);
        }

        info!(
            path = %db.path.display(),
            pool_size = config.pool_size,
            wal = config.wal_mode,
            "database opened"
        );
        Ok(db)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of pooled handles currently idle.
    pub fn idle_count(&self) -> usize {
        self.idle_handles().len()
    }

    /// Run `f` inside a transaction on a checked-out handle.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back otherwise;
    /// the error is returned to the caller in both the rollback and commit
    /// failure cases.
    pub async fn transact<F, R>(&self, f: F) -> Result<R, LastSeenError>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let mut handle = self.checkout().await?;
        let result = handle
            .connection()?
            .call(move |conn| -> rusqlite::Result<R> {
                let tx = conn.transaction()?;
                let value = f(&tx)?;
                tx.commit()?;
                Ok(value)
            })
            .await;

        if matches!(result, Err(tokio_rusqlite::Error::ConnectionClosed)) {
            handle.discard();
        }
        handle.release().await;
        result.map_err(map_tr_err)
    }

    /// Checkpoint the WAL and close every pooled handle.
    ///
    /// Later operations fail with a storage error.
    pub async fn close(&self) -> Result<(), LastSeenError> {
        self.closed.store(true, Ordering::SeqCst);
        let handles: Vec<Connection> = std::mem::take(&mut *self.idle_handles());

        let mut first_error = None;
        for (i, conn) in handles.into_iter().enumerate() {
            if i == 0 {
                let checkpoint = conn
                    .call(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);"))
                    .await;
                match checkpoint {
                    Ok(()) => debug!("WAL checkpoint complete"),
                    Err(e) => warn!(error = %e, "WAL checkpoint failed"),
                }
            }
            if let Err(e) = conn.close().await {
                first_error.get_or_insert(LastSeenError::storage(e));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(path = %self.path.display(), "database closed");
                Ok(())
            }
        }
    }

    fn idle_handles(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect(&self) -> Result<Connection, LastSeenError> {
        let conn = Connection::open(self.path.clone())
            .await
            .map_err(LastSeenError::storage)?;
        let settings = self.settings;
        conn.call(move |conn| apply_pragmas(conn, settings))
            .await
            .map_err(map_tr_err)?;
        Ok(conn)
    }

    async fn checkout(&self) -> Result<Handle<'_>, LastSeenError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LastSeenError::Storage {
                source: "database is closed".into(),
            });
        }
        let pooled = self.idle_handles().pop();
        match pooled {
            Some(conn) => Ok(Handle {
                db: self,
                conn: Some(conn),
                pooled: true,
            }),
            None => {
                debug!("pool exhausted, opening supplementary connection");
                Ok(Handle {
                    db: self,
                    conn: Some(self.connect().await?),
                    pooled: false,
                })
            }
        }
    }
}

/// A checked-out connection. Pooled handles go back to the pool on release
/// or drop; supplementary handles are closed.
struct Handle<'a> {
    db: &'a Database,
    conn: Option<Connection>,
    pooled: bool,
}

impl Handle<'_> {
    fn connection(&self) -> Result<&Connection, LastSeenError> {
        self.conn.as_ref().ok_or_else(|| LastSeenError::Storage {
            source: "connection already released".into(),
        })
    }

    /// Drop the handle instead of returning it to the pool.
    fn discard(&mut self) {
        self.pooled = false;
        self.conn = None;
    }

    async fn release(mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.pooled && !self.db.closed.load(Ordering::SeqCst) {
            self.db.idle_handles().push(conn);
        } else if let Err(e) = conn.close().await {
            debug!(error = %e, "closing connection failed");
        }
    }
}

impl Drop for Handle<'_> {
    fn drop(&mut self) {
        if self.pooled
            && let Some(conn) = self.conn.take()
        {
            self.db.idle_handles().push(conn);
        }
    }
}
