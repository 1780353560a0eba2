use crate::schema::MIG_0001_INIT;
use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open_or_create(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
        apply_pragmas(&conn)?;
        migrate(&conn)?;
        tracing::debug!(path = %path.display(), "results database ready");
        Ok(Db { conn: Mutex::new(conn) })
    }

    /// Fresh database that lives as long as the handle. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn)?;
        Ok(Db { conn: Mutex::new(conn) })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    // WAL lets status readers proceed while a job is writing.
    let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;
    conn.pragma_update(None, "cache_size", -65536i64)?; // 64 MiB
    Ok(())
}

fn migrate(conn: &Connection) -> Result<()> {
    // naive: if tracking_jobs doesn't exist, apply 0001
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name='tracking_jobs'",
        [],
        |r| r.get(0),
    )?;
    if exists == 0 {
        conn.execute_batch(MIG_0001_INIT).context("applying schema 0001")?;
    }
    Ok(())
}
