//! SQLite-backed loop store.
//!
//! The schema matches databases written by earlier versions of the tool:
//! `loops` keyed by the caller's id and `loop_items` keyed by an
//! autoincrement id, so row order is insertion order and ids are never reused.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDateTime;
use log::debug;
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use super::{LockAttempt, LoopStore};
use crate::domain::{Item, ItemStatus, ItemUpdate, LoopRecord, NewItem};
use crate::error::{LoopyError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Loop store persisted in a single SQLite file.
///
/// `rusqlite::Connection` is not `Sync`, so it sits behind a `Mutex`. All
/// statements are short and need exclusive access anyway.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a store at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        debug!("Opening loop store at {}", path.display());
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS loops (
                id VARCHAR NOT NULL PRIMARY KEY,
                command VARCHAR NOT NULL,
                created_at DATETIME NOT NULL,
                status VARCHAR NOT NULL DEFAULT 'active'
            );

            CREATE TABLE IF NOT EXISTS loop_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                loop_id VARCHAR NOT NULL REFERENCES loops(id) ON DELETE CASCADE,
                item VARCHAR NOT NULL,
                status VARCHAR NOT NULL DEFAULT 'PENDING'
                    CHECK (status IN ('PENDING', 'SUCCESS', 'FAILED')),
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error VARCHAR
            );

            CREATE INDEX IF NOT EXISTS idx_loop_items_loop ON loop_items(loop_id);

            CREATE TABLE IF NOT EXISTS loop_locks (
                loop_id VARCHAR NOT NULL PRIMARY KEY REFERENCES loops(id) ON DELETE CASCADE,
                pid INTEGER NOT NULL,
                acquired_at DATETIME NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn loop_exists(conn: &Connection, id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM loops WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn require_loop(conn: &Connection, id: &str) -> Result<()> {
        if Self::loop_exists(conn, id)? {
            Ok(())
        } else {
            Err(LoopyError::LoopNotFound(id.to_string()))
        }
    }

    fn insert_item(tx: &Transaction<'_>, loop_id: &str, item: &NewItem) -> Result<i64> {
        tx.execute(
            "INSERT INTO loop_items (loop_id, item, status, attempts, last_error) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![loop_id, item.item, item.status.as_str(), item.attempts, item.last_error],
        )?;
        Ok(tx.last_insert_rowid())
    }

    fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(raw, TIMESTAMP_PARSE_FORMAT)
            .map_err(|_| LoopyError::CorruptTimestamp(raw.to_string()))
    }

    fn now_timestamp() -> String {
        chrono::Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string()
    }
}

impl LoopStore for SqliteStore {
    fn get_loop(&self, id: &str) -> Result<Option<LoopRecord>> {
        let conn = self.lock();
        let row: Option<(String, String, String, String)> = conn
            .query_row(
                "SELECT id, command, created_at, status FROM loops WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        match row {
            Some((id, command, created_at, status)) => Ok(Some(LoopRecord {
                id,
                command,
                created_at: Self::parse_timestamp(&created_at)?,
                status,
            })),
            None => Ok(None),
        }
    }

    fn insert_loop(&self, record: &LoopRecord, items: &[NewItem]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        if Self::loop_exists(&tx, &record.id)? {
            return Err(LoopyError::LoopExists(record.id.clone()));
        }

        tx.execute(
            "INSERT INTO loops (id, command, created_at, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id,
                record.command,
                record.created_at.format(TIMESTAMP_FORMAT).to_string(),
                record.status,
            ],
        )?;
        for item in items {
            Self::insert_item(&tx, &record.id, item)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_loop(&self, id: &str) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        // Older databases were created without ON DELETE CASCADE.
        tx.execute("DELETE FROM loop_items WHERE loop_id = ?1", [id])?;
        tx.execute("DELETE FROM loop_locks WHERE loop_id = ?1", [id])?;
        let deleted = tx.execute("DELETE FROM loops WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(LoopyError::LoopNotFound(id.to_string()));
        }

        tx.commit()?;
        Ok(())
    }

    fn update_loop_command(&self, id: &str, command: &str) -> Result<()> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE loops SET command = ?1 WHERE id = ?2",
            params![command, id],
        )?;
        if updated == 0 {
            return Err(LoopyError::LoopNotFound(id.to_string()));
        }
        Ok(())
    }

    fn list_loops(&self) -> Result<Vec<LoopRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, command, created_at, status FROM loops \
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, command, created_at, status) = row?;
            records.push(LoopRecord {
                id,
                command,
                created_at: Self::parse_timestamp(&created_at)?,
                status,
            });
        }
        Ok(records)
    }

    fn get_items(&self, loop_id: &str) -> Result<Vec<Item>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, loop_id, item, status, attempts, last_error FROM loop_items \
             WHERE loop_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([loop_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, loop_id, item, status, attempts, last_error) = row?;
            items.push(Item {
                id,
                loop_id,
                item,
                status: status.parse::<ItemStatus>()?,
                attempts,
                last_error,
            });
        }
        Ok(items)
    }

    fn create_item(&self, loop_id: &str, item: &str) -> Result<i64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::require_loop(&tx, loop_id)?;
        let id = Self::insert_item(&tx, loop_id, &NewItem::pending(item))?;
        tx.commit()?;
        Ok(id)
    }

    fn append_items(&self, loop_id: &str, items: &[String]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::require_loop(&tx, loop_id)?;
        for item in items {
            Self::insert_item(&tx, loop_id, &NewItem::pending(item.as_str()))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn replace_items(&self, loop_id: &str, items: &[String]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::require_loop(&tx, loop_id)?;
        tx.execute("DELETE FROM loop_items WHERE loop_id = ?1", [loop_id])?;
        for item in items {
            Self::insert_item(&tx, loop_id, &NewItem::pending(item.as_str()))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn reset_items(&self, loop_id: &str) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::require_loop(&tx, loop_id)?;
        tx.execute(
            "UPDATE loop_items SET status = ?1, attempts = 0, last_error = NULL WHERE loop_id = ?2",
            params![ItemStatus::Pending.as_str(), loop_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_item(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM loop_items WHERE id = ?1", [id])?;
        Ok(())
    }

    fn update_item(&self, id: i64, update: &ItemUpdate) -> Result<()> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE loop_items SET status = ?1, attempts = ?2, last_error = ?3 WHERE id = ?4",
            params![update.status.as_str(), update.attempts, update.last_error, id],
        )?;
        if updated == 0 {
            return Err(LoopyError::ItemNotFound(id));
        }
        Ok(())
    }

    fn acquire_run_lock(&self, loop_id: &str, pid: u32) -> Result<LockAttempt> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        Self::require_loop(&tx, loop_id)?;

        let holder: Option<u32> = tx
            .query_row("SELECT pid FROM loop_locks WHERE loop_id = ?1", [loop_id], |row| row.get(0))
            .optional()?;
        if let Some(holder) = holder {
            return Ok(LockAttempt::HeldBy(holder));
        }

        tx.execute(
            "INSERT INTO loop_locks (loop_id, pid, acquired_at) VALUES (?1, ?2, ?3)",
            params![loop_id, pid, Self::now_timestamp()],
        )?;
        tx.commit()?;
        Ok(LockAttempt::Acquired)
    }

    fn release_run_lock(&self, loop_id: &str, pid: u32) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM loop_locks WHERE loop_id = ?1 AND pid = ?2",
            params![loop_id, pid],
        )?;
        Ok(())
    }
}
