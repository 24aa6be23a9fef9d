//! On-device notification history.
//!
//! One record per reminder alert handed to the notification service,
//! persisted in a small local SQLite database so the history survives
//! restarts and works without backend connectivity. The store is
//! constructed explicitly and passed by reference to whoever needs it;
//! opening the database is the rehydration step.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::NotificationRecord;

/// Persisted history of scheduled reminder alerts.
///
/// The connection sits behind a `Mutex` so the store can be shared as an
/// `Arc` across the async service layer; no guard is ever held across an
/// await point.
pub struct NotificationHistoryStore {
    conn: Mutex<Connection>,
}

impl NotificationHistoryStore {
    /// Open (and migrate) the history database at `path`.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = db::open_database(path)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Volatile store backed by an in-memory database.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = db::open_memory_database()?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    /// Append a record. No de-duplication: adding the same id twice stores
    /// two rows.
    pub fn add(&self, record: &NotificationRecord) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notifications (id, title, body, fire_date, is_read)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![record.id, record.title, record.body, record.date, record.is_read],
        )?;
        Ok(())
    }

    /// Mark the first record carrying this id as read.
    /// A missing id is a no-op, not an error.
    pub fn mark_as_read(&self, id: Uuid) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE notifications SET is_read = 1
             WHERE seq = (SELECT MIN(seq) FROM notifications WHERE id = ?1)",
            params![id],
        )?;
        Ok(())
    }

    /// Records whose fire-instant has passed, newest first.
    /// Recomputed against the wall clock on every call, never cached.
    pub fn past_notifications(&self) -> Result<Vec<NotificationRecord>, DatabaseError> {
        self.past_notifications_at(Local::now().naive_local())
    }

    /// [`Self::past_notifications`] against an explicit clock.
    pub fn past_notifications_at(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<NotificationRecord>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, body, fire_date, is_read FROM notifications
             WHERE fire_date <= ?1
             ORDER BY fire_date DESC, seq DESC",
        )?;
        let rows = stmt.query_map(params![now], |row| {
            Ok(NotificationRecord {
                id: row.get(0)?,
                title: row.get(1)?,
                body: row.get(2)?,
                date: row.get(3)?,
                is_read: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// How many past records are still unread.
    pub fn unread_count(&self) -> Result<i64, DatabaseError> {
        self.unread_count_at(Local::now().naive_local())
    }

    /// [`Self::unread_count`] against an explicit clock.
    pub fn unread_count_at(&self, now: NaiveDateTime) -> Result<i64, DatabaseError> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE fire_date <= ?1 AND is_read = 0",
            params![now],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
