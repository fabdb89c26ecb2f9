use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{ChatError, ChatResult};

/// Base database connection wrapper.
///
/// The connection sits behind a mutex so one handle can be shared across
/// tasks; callers hold the guard for a single statement at a time.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> ChatResult<Self> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("SQLite journal mode: {mode}");
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> ChatResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn connection(&self) -> ChatResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ChatError::StoreUnavailable("connection lock poisoned".into()))
    }
}
