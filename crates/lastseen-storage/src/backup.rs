// SPDX-FileCopyrightText: 2026 LastSeen Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database snapshots, rotation, and restore.
//!
//! Snapshots use SQLite's online backup API, so they are consistent even
//! while the live database is being written in WAL mode. These functions
//! block; async callers run them on the blocking pool.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use lastseen_core::LastSeenError;
use rusqlite::{Connection, OpenFlags};
use tracing::{info, warn};

/// File name prefix of snapshots created by [`create_backup`].
pub const BACKUP_PREFIX: &str = "lastseen_backup_";

/// File name extension of snapshots.
pub const BACKUP_EXTENSION: &str = ".db";

/// Snapshot file name for a point in time, e.g. `lastseen_backup_20260304_154210.db`.
pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!("{BACKUP_PREFIX}{}{BACKUP_EXTENSION}", at.format("%Y%m%d_%H%M%S"))
}

/// Whether `name` looks like a snapshot created by this crate.
pub fn is_backup_file_name(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_EXTENSION)
}

fn not_found(what: &str, path: &Path) -> LastSeenError {
    LastSeenError::Backup(format!("{what} not found: {}", path.display()))
}

/// Copy the database at `src` into `dst` page by page. Returns the size of `dst`.
pub fn copy_database(src: &Path, dst: &Path) -> Result<u64, LastSeenError> {
    if !src.exists() {
        return Err(not_found("database", src));
    }
    let source = Connection::open_with_flags(
        src,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(LastSeenError::storage)?;
    let mut target = Connection::open(dst).map_err(LastSeenError::storage)?;

    rusqlite::backup::Backup::new(&source, &mut target)
        .map_err(LastSeenError::storage)?
        .run_to_completion(100, Duration::from_millis(10), None)
        .map_err(LastSeenError::storage)?;
    drop(target);

    std::fs::metadata(dst)
        .map(|m| m.len())
        .map_err(LastSeenError::storage)
}

/// Snapshot the database into `folder` under a timestamped name.
pub fn create_backup(
    db_path: &Path,
    folder: &Path,
    at: DateTime<Utc>,
) -> Result<PathBuf, LastSeenError> {
    std::fs::create_dir_all(folder).map_err(|e| {
        LastSeenError::Backup(format!(
            "cannot create backup folder {}: {e}",
            folder.display()
        ))
    })?;
    let target = folder.join(backup_file_name(at));
    let bytes = copy_database(db_path, &target)?;
    info!(path = %target.display(), bytes, "database backup created");
    Ok(target)
}

/// Snapshot files in `folder`, newest first by modification time.
pub fn list_backups(folder: &Path) -> Result<Vec<PathBuf>, LastSeenError> {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LastSeenError::storage(e)),
    };

    let mut backups: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(is_backup_file_name)
        })
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            meta.is_file()
                .then(|| (meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), entry.path()))
        })
        .collect();
    // Name order breaks ties; the timestamped names sort chronologically.
    backups.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    Ok(backups.into_iter().map(|(_, path)| path).collect())
}

/// Delete all but the `keep` most recent snapshots. Returns how many were deleted.
pub fn cleanup_old_backups(folder: &Path, keep: usize) -> Result<usize, LastSeenError> {
    let mut deleted = 0;
    for path in list_backups(folder)?.into_iter().skip(keep) {
        match std::fs::remove_file(&path) {
            Ok(()) => deleted += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "failed to delete old backup"),
        }
    }
    if deleted > 0 {
        info!(deleted, keep, folder = %folder.display(), "old backups removed");
    }
    Ok(deleted)
}

/// Replace the database at `db_path` with the snapshot at `from`.
///
/// The snapshot must be a readable SQLite database. An existing database is
/// first copied to `<db_path>.pre-restore`.
pub fn restore_backup(db_path: &Path, from: &Path) -> Result<(), LastSeenError> {
    if !from.exists() {
        return Err(not_found("backup file", from));
    }
    {
        let probe = Connection::open_with_flags(from, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(LastSeenError::storage)?;
        probe
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| {
                LastSeenError::Backup(format!("{} is not a valid database: {e}", from.display()))
            })?;
    }

    if db_path.exists() {
        let mut safety = db_path.as_os_str().to_owned();
        safety.push(".pre-restore");
        let safety = PathBuf::from(safety);
        copy_database(db_path, &safety)?;
        info!(path = %safety.display(), "safety copy written before restore");
    }

    let bytes = copy_database(from, db_path)?;
    info!(from = %from.display(), to = %db_path.display(), bytes, "database restored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn seed_db(path: &Path, rows: i64) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch("CREATE TABLE IF NOT EXISTS t (v INTEGER);")
            .unwrap();
        for v in 0..rows {
            conn.execute("INSERT INTO t (v) VALUES (?1)", [v]).unwrap();
        }
    }

    fn count_rows(path: &Path) -> i64 {
        Connection::open(path)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn file_name_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 15, 42, 10).unwrap();
        assert_eq!(backup_file_name(at), "lastseen_backup_20260304_154210.db");
        assert!(is_backup_file_name(&backup_file_name(at)));
        assert!(!is_backup_file_name("lastseen.db"));
        assert!(!is_backup_file_name("lastseen_backup_20260304.db-wal"));
    }

    #[test]
    fn backup_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_backup(&dir.path().join("missing.db"), dir.path(), Utc::now())
            .unwrap_err()
            .to_string();
        assert!(err.contains("not found"), "got: {err}");
    }

    #[test]
    fn backup_copies_contents() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("live.db");
        seed_db(&db, 3);
        let snapshot = create_backup(&db, &dir.path().join("backups"), Utc::now()).unwrap();
        assert_eq!(count_rows(&snapshot), 3);
    }

    #[test]
    fn cleanup_keeps_newest_and_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("live.db");
        seed_db(&db, 1);
        let folder = dir.path().join("backups");
        for hour in 0..4 {
            let at = Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap();
            create_backup(&db, &folder, at).unwrap();
        }
        std::fs::write(folder.join("notes.txt"), "keep me").unwrap();

        let deleted = cleanup_old_backups(&folder, 2).unwrap();
        assert_eq!(deleted, 2);
        let remaining = list_backups(&folder).unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(folder.join("notes.txt").exists());
        assert!(folder.join("lastseen_backup_20260101_030000.db").exists());
        assert!(folder.join("lastseen_backup_20260101_020000.db").exists());
    }

    #[test]
    fn cleanup_of_missing_folder_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_backups(&dir.path().join("nope"), 5).unwrap(), 0);
    }

    #[test]
    fn restore_writes_safety_copy() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live.db");
        let snapshot = dir.path().join("snap.db");
        seed_db(&snapshot, 5);
        seed_db(&live, 2);

        restore_backup(&live, &snapshot).unwrap();
        assert_eq!(count_rows(&live), 5);
        assert_eq!(count_rows(&dir.path().join("live.db.pre-restore")), 2);
    }

    #[test]
    fn restore_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.db");
        std::fs::write(&garbage, b"definitely not sqlite, just some bytes for the header").unwrap();
        let result = restore_backup(&dir.path().join("live.db"), &garbage);
        assert!(result.is_err());
        assert!(!dir.path().join("live.db").exists());
    }
}
