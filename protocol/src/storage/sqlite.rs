//! SQLite plumbing shared by the block index and the ownership store.
//!
//! Single-row operations open a short-lived connection per call. Bulk work
//! goes through a [`BulkSlot`]: one connection, one `BEGIN IMMEDIATE`
//! transaction, held until `end` commits it. A session that is dropped
//! without committing rolls back, so a failed catch-up never leaves half a
//! batch behind.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LedgerError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Delete a database file and its journal side files.
pub(crate) fn remove_database_files(path: &Path) -> Result<()> {
    let mut candidates = vec![path.to_path_buf()];
    for suffix in ["-journal", "-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        candidates.push(PathBuf::from(name));
    }
    for candidate in candidates {
        match std::fs::remove_file(&candidate) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// One open write transaction.
pub(crate) struct BulkSession {
    conn: Connection,
    active: bool,
    pub rows: u64,
}

impl BulkSession {
    fn begin(path: &Path) -> Result<Self> {
        let conn = open_connection(path)?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Self {
            conn,
            active: true,
            rows: 0,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn commit(mut self) -> Result<u64> {
        self.conn.execute_batch("COMMIT")?;
        self.active = false;
        Ok(self.rows)
    }
}

impl Drop for BulkSession {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %e, "bulk session rollback failed");
            }
        }
    }
}

/// At most one bulk session per store, guarded by a mutex.
pub(crate) struct BulkSlot {
    path: PathBuf,
    label: &'static str,
    session: Mutex<Option<BulkSession>>,
}

impl BulkSlot {
    pub fn new(path: PathBuf, label: &'static str) -> Self {
        Self {
            path,
            label,
            session: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Fails if a session is in progress, for single-row writers.
    pub fn ensure_idle(&self) -> Result<()> {
        if self.is_active() {
            return Err(LedgerError::misuse(format!(
                "{} has a bulk session in progress",
                self.label
            )));
        }
        Ok(())
    }

    pub fn begin(&self) -> Result<()> {
        let mut slot = self.session.lock();
        if slot.is_some() {
            return Err(LedgerError::misuse(format!(
                "{} bulk session already started",
                self.label
            )));
        }
        *slot = Some(BulkSession::begin(&self.path)?);
        Ok(())
    }

    /// Run `f` inside the active session.
    pub fn with<T>(&self, f: impl FnOnce(&mut BulkSession) -> Result<T>) -> Result<T> {
        let mut slot = self.session.lock();
        let session = slot.as_mut().ok_or_else(|| {
            LedgerError::misuse(format!("{} has no bulk session in progress", self.label))
        })?;
        f(session)
    }

    /// Commit and release the session. Returns the rows written.
    pub fn end(&self) -> Result<u64> {
        let session = self.session.lock().take().ok_or_else(|| {
            LedgerError::misuse(format!("{} has no bulk session to end", self.label))
        })?;
        session.commit()
    }

    /// Roll back and release the session, if any.
    pub fn abort(&self) {
        if self.session.lock().take().is_some() {
            tracing::warn!(store = self.label, "bulk session rolled back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn slot(dir: &Path) -> (BulkSlot, PathBuf) {
        let path = dir.join("t.sqlite");
        open_connection(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (v INTEGER)")
            .unwrap();
        (BulkSlot::new(path.clone(), "test store"), path)
    }

    fn count(path: &Path) -> i64 {
        open_connection(path)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn double_begin_is_misuse() {
        let dir = tempfile::tempdir().unwrap();
        let (slot, _) = slot(dir.path());
        slot.begin().unwrap();
        assert_eq!(slot.begin().unwrap_err().kind(), ErrorKind::ConcurrencyMisuse);
        slot.abort();
    }

    #[test]
    fn use_without_begin_is_misuse() {
        let dir = tempfile::tempdir().unwrap();
        let (slot, _) = slot(dir.path());
        assert_eq!(slot.with(|_| Ok(())).unwrap_err().kind(), ErrorKind::ConcurrencyMisuse);
        assert_eq!(slot.end().unwrap_err().kind(), ErrorKind::ConcurrencyMisuse);
    }

    #[test]
    fn end_commits_abort_discards() {
        let dir = tempfile::tempdir().unwrap();
        let (slot, path) = slot(dir.path());

        slot.begin().unwrap();
        slot.with(|s| Ok(s.conn().execute("INSERT INTO t VALUES (1)", [])?))
            .unwrap();
        slot.abort();
        assert_eq!(count(&path), 0);

        slot.begin().unwrap();
        slot.with(|s| {
            s.conn().execute("INSERT INTO t VALUES (1)", [])?;
            s.rows += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(slot.end().unwrap(), 1);
        assert_eq!(count(&path), 1);
        assert!(!slot.is_active());
    }

    #[test]
    fn remove_missing_files_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_database_files(&dir.path().join("absent.sqlite")).is_ok());
    }
}
