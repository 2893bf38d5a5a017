//! Durable SQLite store for observed bus events.
//!
//! # Schema
//! Single append-only `events` table plus timestamp/topic indexes;
//! rows are immutable once written. DDL is idempotent
//! (`CREATE ... IF NOT EXISTS`), so opening an already-initialized
//! database preserves rows and duplicates nothing.
//!
//! # SQLite durability settings
//! Applied at open: WAL, synchronous=FULL, wal_autocheckpoint=1000,
//! foreign_keys=ON. PRAGMA integrity_check runs at open; returns an
//! error if it fails. With synchronous=FULL every autocommit INSERT is
//! flushed to stable storage before `append` returns, so there is no
//! cross-call buffering that could lose events on crash.
//!
//! # Readers
//! WAL lets independent read-only connections (the query tool) coexist
//! with the live writer without stalling ingestion.

use bus_core::event::Event;
use bus_core::topic::pattern_to_like;
use rusqlite::{Connection, OpenFlags, params};
use std::path::Path;
use thiserror::Error;

const SCHEMA_SQL: &str = include_str!("schema.sql");

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Integrity: {0}")]
    IntegrityCheckFailed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Whether this error means the store is unusable (disk full,
    /// corruption, I/O failure) and the process should stop rather
    /// than keep dropping events.
    pub fn is_fatal(&self) -> bool {
        use rusqlite::ErrorCode;
        match self {
            StoreError::IntegrityCheckFailed(_) => true,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DiskFull
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::NotADatabase
                    | ErrorCode::ReadOnly
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::CannotOpen
            ),
            StoreError::Sqlite(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Fields of an event not yet assigned a row id.
#[derive(Debug, Clone)]
pub struct NewEvent<'a> {
    /// Receipt time, RFC 3339 with local offset.
    pub timestamp: &'a str,
    pub topic: &'a str,
    pub sender: Option<&'a str>,
    pub payload: &'a str,
    pub qos: u8,
    pub retained: bool,
}

/// Aggregate statistics over the whole store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub total_events: i64,
    pub distinct_topics: i64,
    pub retained_events: i64,
    pub earliest: Option<String>,
    pub latest: Option<String>,
}

/// Filter for [`EventStore::query`].
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topic pattern with bus wildcards (`#`, `+`); see
    /// `bus_core::topic` for the (over-matching) translation.
    pub topic_pattern: Option<String>,
    /// Minimum receipt timestamp (RFC 3339), inclusive.
    pub since: Option<String>,
    /// Maximum rows returned.
    pub limit: u32,
}

// ---------------------------------------------------------------------------
// EventStore
// ---------------------------------------------------------------------------

/// The durable event store. One connection, one owner; the writer side
/// lives on the ingestion task, readers open their own handles.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Open (or create) the store at the given path.
    ///
    /// Applies PRAGMAs, runs `PRAGMA integrity_check`, and applies the
    /// schema. Returns `Err` if integrity_check fails.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Read-only handle for query tools. Does not touch the schema.
    pub fn open_read_only(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(EventStore { conn })
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        apply_pragmas(&conn)?;
        run_integrity_check(&conn)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(EventStore { conn })
    }

    /// Re-run `PRAGMA integrity_check` on demand.
    pub fn integrity_check(&self) -> StoreResult<()> {
        run_integrity_check(&self.conn)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Append one event; durable upon return. Returns the assigned
    /// row id. Never fails silently: any storage failure surfaces as
    /// a [`StoreError`] for the caller to act on.
    pub fn append(&mut self, event: &NewEvent<'_>) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO events (timestamp, topic, sender, payload, qos, retained)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.timestamp,
                event.topic,
                event.sender,
                event.payload,
                event.qos,
                event.retained,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    // -----------------------------------------------------------------------
    // Reads (consumed by the query tool)
    // -----------------------------------------------------------------------

    /// Distinct topics with event counts, ordered by count descending.
    pub fn topic_counts(&self) -> StoreResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT topic, COUNT(*) AS count
             FROM events
             GROUP BY topic
             ORDER BY count DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut counts = Vec::new();
        for r in rows {
            counts.push(r?);
        }
        Ok(counts)
    }

    /// Aggregate statistics: total rows, distinct topics, retained
    /// rows, earliest/latest receipt timestamp.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let stats = self.conn.query_row(
            "SELECT COUNT(*),
                    COUNT(DISTINCT topic),
                    COALESCE(SUM(retained), 0),
                    MIN(timestamp),
                    MAX(timestamp)
             FROM events",
            [],
            |row| {
                Ok(StoreStats {
                    total_events: row.get(0)?,
                    distinct_topics: row.get(1)?,
                    retained_events: row.get(2)?,
                    earliest: row.get(3)?,
                    latest: row.get(4)?,
                })
            },
        )?;
        Ok(stats)
    }

    /// Filtered scan, receipt time descending, ties broken by
    /// insertion order (newest row id first).
    pub fn query(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let mut sql = String::from(
            "SELECT id, timestamp, topic, sender, payload, qos, retained
             FROM events
             WHERE 1=1",
        );
        let mut args: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(pattern) = &filter.topic_pattern {
            sql.push_str(" AND topic LIKE ?");
            args.push(pattern_to_like(pattern).into());
        }
        if let Some(since) = &filter.since {
            sql.push_str(" AND timestamp >= ?");
            args.push(since.clone().into());
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");
        args.push(i64::from(filter.limit).into());

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args), map_event)?;
        let mut events = Vec::new();
        for r in rows {
            events.push(r?);
        }
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=FULL;
         PRAGMA wal_autocheckpoint=1000;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

fn run_integrity_check(conn: &Connection) -> StoreResult<()> {
    let result: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    if result != "ok" {
        return Err(StoreError::IntegrityCheckFailed(result));
    }
    Ok(())
}

fn map_event(row: &rusqlite::Row<'_>) -> Result<Event, rusqlite::Error> {
    Ok(Event {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        topic: row.get(2)?,
        sender: row.get(3)?,
        payload: row.get(4)?,
        qos: row.get::<_, i64>(5)? as u8,
        retained: row.get::<_, i64>(6)? != 0,
    })
}
