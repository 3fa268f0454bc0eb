//! SQLite event store backend.
//!
//! Every operation opens its own connection, so isolation is left to SQLite.
//! Writes run as a single statement inside an IMMEDIATE transaction: the
//! write lock is taken up front and contention waits on the busy timeout.

use async_trait::async_trait;
use calnotify_core::config::StorageConfig;
use calnotify_core::error::{CalNotifyError, Result};
use calnotify_core::traits::EventStore;
use calnotify_core::types::{Event, Granularity, Retention, RetentionPolicy};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, Row, Transaction, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        start_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        notification_date TEXT NOT NULL,
        is_notified INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS events_start_date ON events (start_date);
    CREATE INDEX IF NOT EXISTS events_due ON events (is_notified, notification_date);
";

const COLUMNS: &str =
    "id, user_id, title, description, start_date, end_date, notification_date, is_notified";

pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
    retention: Retention,
    connected: AtomicBool,
}

impl SqliteStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self::with_path(config.db_path(), config.busy_timeout(), config.retention)
    }

    pub fn with_path(path: impl Into<PathBuf>, busy_timeout: Duration, retention: Retention) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
            retention,
            connected: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(CalNotifyError::StoreNotConnected);
        }
        let conn = Connection::open(&self.path).map_err(db_err)?;
        conn.busy_timeout(self.busy_timeout).map_err(db_err)?;
        Ok(conn)
    }

    fn query(&self, sql: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![timestamp(from), timestamp(to)], row_to_event)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    fn name(&self) -> &str { "sqlite" }

    async fn connect(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path).map_err(db_err)?;
        conn.busy_timeout(self.busy_timeout).map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        self.connected.store(true, Ordering::Release);
        tracing::info!(path = %self.path.display(), "SQLite event store connected");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    async fn create(&self, event: Event) -> Result<()> {
        let sql = format!(
            "INSERT INTO events ({COLUMNS})
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
             WHERE NOT EXISTS (
                 SELECT 1 FROM events WHERE start_date < ?6 AND ?5 < end_date
             )"
        );
        let mut conn = self.open()?;
        let inserted = write(&mut conn, |tx| {
            tx.execute(
                &sql,
                params![
                    event.id.to_string(),
                    event.user_id,
                    event.title,
                    event.description,
                    timestamp(event.start_date),
                    timestamp(event.end_date),
                    timestamp(event.notification_date),
                    event.is_notified,
                ],
            )
        })
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                CalNotifyError::EventAlreadyExists(event.id)
            }
            other => db_err(other),
        })?;

        if inserted == 0 {
            return Err(CalNotifyError::DateAlreadyBusy);
        }
        tracing::debug!(event_id = %event.id, user_id = event.user_id, "Event created");
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut conn = self.open()?;
        let removed = write(&mut conn, |tx| {
            tx.execute("DELETE FROM events WHERE id = ?1", params![id.to_string()])
        })
        .map_err(db_err)?;
        if removed == 0 {
            return Err(CalNotifyError::EventNotFound(id));
        }
        Ok(())
    }

    async fn edit(&self, id: Uuid, event: Event) -> Result<()> {
        let mut conn = self.open()?;
        let updated = write(&mut conn, |tx| {
            tx.execute(
                "UPDATE events SET
                    user_id = ?2,
                    title = ?3,
                    description = ?4,
                    start_date = ?5,
                    end_date = ?6,
                    notification_date = ?7,
                    is_notified = ?8
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    event.user_id,
                    event.title,
                    event.description,
                    timestamp(event.start_date),
                    timestamp(event.end_date),
                    timestamp(event.notification_date),
                    event.is_notified,
                ],
            )
        })
        .map_err(db_err)?;
        if updated == 0 {
            return Err(CalNotifyError::EventNotFound(id));
        }
        Ok(())
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM events WHERE id = ?1)",
            params![id.to_string()],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    async fn get_event(&self, id: Uuid) -> Result<Event> {
        let conn = self.open()?;
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM events WHERE id = ?1"),
            params![id.to_string()],
            row_to_event,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CalNotifyError::EventNotFound(id),
            other => db_err(other),
        })
    }

    async fn list(&self, date: DateTime<Utc>, granularity: Granularity) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM events
             WHERE start_date >= ?1 AND start_date < ?2
             ORDER BY start_date"
        );
        self.query(&sql, date, granularity.window_end(date))
    }

    async fn get_due(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM events
             WHERE is_notified = 0 AND notification_date >= ?1 AND notification_date <= ?2
             ORDER BY start_date"
        );
        self.query(&sql, from, to)
    }

    async fn mark_notified(&self, id: Uuid) -> Result<()> {
        let mut conn = self.open()?;
        write(&mut conn, |tx| {
            tx.execute("UPDATE events SET is_notified = 1 WHERE id = ?1", params![id.to_string()])
        })
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let sql = match self.retention.policy {
            RetentionPolicy::ExpiredBefore => "DELETE FROM events WHERE end_date < ?1",
            RetentionPolicy::EndedAfter => "DELETE FROM events WHERE end_date > ?1",
        };
        let threshold = timestamp(self.retention.threshold(now));
        let mut conn = self.open()?;
        write(&mut conn, |tx| tx.execute(sql, params![threshold])).map_err(db_err)
    }
}

/// Run one write statement under an IMMEDIATE transaction.
fn write<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<T> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
}

fn db_err(e: rusqlite::Error) -> CalNotifyError {
    CalNotifyError::Storage(e.to_string())
}

/// Fixed-width UTC text, so lexical order matches chronological order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    let is_notified: i64 = row.get(7)?;
    Ok(Event {
        id,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        start_date: parse_timestamp(row, 4)?,
        end_date: parse_timestamp(row, 5)?,
        notification_date: parse_timestamp(row, 6)?,
        is_notified: is_notified != 0,
    })
}
