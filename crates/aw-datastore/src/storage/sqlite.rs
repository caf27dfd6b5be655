//! Embedded `SQLite` storage.
//!
//! # Schema
//!
//! ```text
//! buckets (key, id, name, type, client, hostname, created, data)
//! events  (id, bucket_key -> buckets.key ON DELETE CASCADE, timestamp, endtime, data)
//! ```
//!
//! Timestamps are stored as TEXT in RFC 3339 with nanosecond precision and a
//! `Z` suffix (e.g. `2024-01-15T10:30:00.000000000Z`). The fixed width keeps
//! lexicographic ordering equal to chronological ordering, so range filters
//! run on the `(bucket_key, timestamp)` and `(bucket_key, endtime)` indexes.
//! Durations are derived from `endtime - timestamp`.
//!
//! Event ids come from `AUTOINCREMENT`, so they are never reused and the
//! highest id in a bucket is always its most recently inserted event.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use aw_core::{BucketId, BucketMetadata, Event};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::{Map, Value};

use super::{EventQuery, Storage, StorageKind};
use crate::error::{DatastoreError, Result};

/// `SQLite`-backed storage.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so the connection sits
/// behind a mutex that is held for the duration of one operation.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The schema is initialized on first open.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the storage is dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DatastoreError::LockPoisoned)
    }
}

/// Initializes the schema. Idempotent.
fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS buckets (
            key INTEGER PRIMARY KEY,
            id TEXT NOT NULL UNIQUE,
            name TEXT,
            type TEXT NOT NULL,
            client TEXT NOT NULL,
            hostname TEXT NOT NULL,
            created TEXT NOT NULL,
            data TEXT NOT NULL DEFAULT '{}'
        );

        -- timestamp/endtime: fixed-width RFC 3339 in UTC
        -- data: JSON object payload
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            bucket_key INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            endtime TEXT NOT NULL,
            data TEXT NOT NULL,
            FOREIGN KEY (bucket_key) REFERENCES buckets(key) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_events_bucket_timestamp ON events(bucket_key, timestamp);
        CREATE INDEX IF NOT EXISTS idx_events_bucket_endtime ON events(bucket_key, endtime);
        ",
    )?;
    Ok(())
}

impl Storage for SqliteStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Sqlite
    }

    fn create_bucket(&self, metadata: &BucketMetadata) -> Result<()> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "
            INSERT OR IGNORE INTO buckets (id, name, type, client, hostname, created, data)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                metadata.id.as_str(),
                metadata.name,
                metadata.kind,
                metadata.client,
                metadata.hostname,
                format_timestamp(metadata.created),
                serde_json::to_string(&metadata.data)?,
            ],
        )?;
        if inserted == 0 {
            return Err(DatastoreError::BucketExists(metadata.id.to_string()));
        }
        Ok(())
    }

    fn delete_bucket(&self, bucket_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM buckets WHERE id = ?", [bucket_id])?;
        if deleted == 0 {
            return Err(DatastoreError::NoSuchBucket(bucket_id.to_string()));
        }
        Ok(())
    }

    fn buckets(&self) -> Result<BTreeMap<String, BucketMetadata>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "
            SELECT id, name, type, client, hostname, created, data
            FROM buckets
            ORDER BY id ASC
            ",
        )?;
        let rows = stmt.query_map([], BucketRow::from_row)?;
        let mut buckets = BTreeMap::new();
        for row in rows {
            let metadata = row?.into_metadata()?;
            buckets.insert(metadata.id.to_string(), metadata);
        }
        Ok(buckets)
    }

    fn get_metadata(&self, bucket_id: &str) -> Result<BucketMetadata> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "
                SELECT id, name, type, client, hostname, created, data
                FROM buckets
                WHERE id = ?
                ",
                [bucket_id],
                BucketRow::from_row,
            )
            .optional()?;
        row.ok_or_else(|| DatastoreError::NoSuchBucket(bucket_id.to_string()))?
            .into_metadata()
    }

    fn set_name(&self, bucket_id: &str, name: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE buckets SET name = ? WHERE id = ?",
            params![name, bucket_id],
        )?;
        if updated == 0 {
            return Err(DatastoreError::NoSuchBucket(bucket_id.to_string()));
        }
        Ok(())
    }

    fn insert_one(&self, bucket_id: &str, event: Event) -> Result<Event> {
        let mut stored = self.insert_many(bucket_id, vec![event])?;
        stored
            .pop()
            .ok_or_else(|| DatastoreError::NoSuchEvent(bucket_id.to_string()))
    }

    fn insert_many(&self, bucket_id: &str, events: Vec<Event>) -> Result<Vec<Event>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let bucket_key = bucket_key(&tx, bucket_id)?;
        let mut stored = Vec::with_capacity(events.len());
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO events (bucket_key, timestamp, endtime, data)
                VALUES (?, ?, ?, ?)
                ",
            )?;
            for mut event in events {
                stmt.execute(params![
                    bucket_key,
                    format_timestamp(event.timestamp),
                    format_timestamp(event.end()),
                    serde_json::to_string(&event.data)?,
                ])?;
                event.id = Some(tx.last_insert_rowid());
                stored.push(event);
            }
        }
        tx.commit()?;
        Ok(stored)
    }

    fn get_events(&self, bucket_id: &str, query: &EventQuery) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        let bucket_key = bucket_key(&conn, bucket_id)?;

        let mut sql = String::from(
            "SELECT id, timestamp, endtime, data FROM events WHERE bucket_key = ?",
        );
        let mut values = vec![SqlValue::Integer(bucket_key)];
        push_range_filter(&mut sql, &mut values, query.start, query.end);
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");
        // SQLite treats a negative LIMIT as unlimited.
        let limit = query
            .limit
            .map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));
        values.push(SqlValue::Integer(limit));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), EventRow::from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event(bucket_id)?);
        }
        Ok(events)
    }

    fn get_event(&self, bucket_id: &str, event_id: i64) -> Result<Option<Event>> {
        let conn = self.conn()?;
        let bucket_key = bucket_key(&conn, bucket_id)?;
        let row = conn
            .query_row(
                "
                SELECT id, timestamp, endtime, data
                FROM events
                WHERE bucket_key = ? AND id = ?
                ",
                params![bucket_key, event_id],
                EventRow::from_row,
            )
            .optional()?;
        row.map(|row| row.into_event(bucket_id)).transpose()
    }

    fn get_last(&self, bucket_id: &str) -> Result<Option<Event>> {
        let conn = self.conn()?;
        let bucket_key = bucket_key(&conn, bucket_id)?;
        let row = conn
            .query_row(
                "
                SELECT id, timestamp, endtime, data
                FROM events
                WHERE bucket_key = ?
                ORDER BY id DESC
                LIMIT 1
                ",
                [bucket_key],
                EventRow::from_row,
            )
            .optional()?;
        row.map(|row| row.into_event(bucket_id)).transpose()
    }

    fn replace_last(&self, bucket_id: &str, mut event: Event) -> Result<Event> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let bucket_key = bucket_key(&tx, bucket_id)?;
        let last_id: Option<i64> = tx.query_row(
            "SELECT MAX(id) FROM events WHERE bucket_key = ?",
            [bucket_key],
            |row| row.get(0),
        )?;
        let Some(last_id) = last_id else {
            return Err(DatastoreError::NoSuchEvent(bucket_id.to_string()));
        };
        tx.execute(
            "
            UPDATE events
            SET timestamp = ?, endtime = ?, data = ?
            WHERE id = ?
            ",
            params![
                format_timestamp(event.timestamp),
                format_timestamp(event.end()),
                serde_json::to_string(&event.data)?,
                last_id,
            ],
        )?;
        tx.commit()?;
        event.id = Some(last_id);
        Ok(event)
    }

    fn delete_event(&self, bucket_id: &str, event_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let bucket_key = bucket_key(&conn, bucket_id)?;
        let deleted = conn.execute(
            "DELETE FROM events WHERE bucket_key = ? AND id = ?",
            params![bucket_key, event_id],
        )?;
        Ok(deleted > 0)
    }

    fn event_count(
        &self,
        bucket_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let conn = self.conn()?;
        let bucket_key = bucket_key(&conn, bucket_id)?;
        let mut sql = String::from("SELECT COUNT(*) FROM events WHERE bucket_key = ?");
        let mut values = vec![SqlValue::Integer(bucket_key)];
        push_range_filter(&mut sql, &mut values, start, end);
        let count: i64 = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Appends the `[start, end)` overlap filter used by every backend.
fn push_range_filter(
    sql: &mut String,
    values: &mut Vec<SqlValue>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) {
    if let Some(end) = end {
        sql.push_str(" AND timestamp < ?");
        values.push(SqlValue::Text(format_timestamp(end)));
    }
    if let Some(start) = start {
        let start = format_timestamp(start);
        sql.push_str(" AND (timestamp >= ? OR endtime > ?)");
        values.push(SqlValue::Text(start.clone()));
        values.push(SqlValue::Text(start));
    }
}

fn bucket_key(conn: &Connection, bucket_id: &str) -> Result<i64> {
    conn.query_row("SELECT key FROM buckets WHERE id = ?", [bucket_id], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| DatastoreError::NoSuchBucket(bucket_id.to_string()))
}

#[derive(Debug)]
struct BucketRow {
    id: String,
    name: Option<String>,
    kind: String,
    client: String,
    hostname: String,
    created: String,
    data: String,
}

impl BucketRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: row.get(2)?,
            client: row.get(3)?,
            hostname: row.get(4)?,
            created: row.get(5)?,
            data: row.get(6)?,
        })
    }

    fn into_metadata(self) -> Result<BucketMetadata> {
        let created = parse_timestamp(&self.created, &self.id)?;
        let data: Map<String, Value> = serde_json::from_str(&self.data)?;
        Ok(BucketMetadata {
            id: BucketId::new(self.id)?,
            name: self.name,
            kind: self.kind,
            client: self.client,
            hostname: self.hostname,
            created,
            data,
        })
    }
}

#[derive(Debug)]
struct EventRow {
    id: i64,
    timestamp: String,
    endtime: String,
    data: String,
}

impl EventRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            endtime: row.get(2)?,
            data: row.get(3)?,
        })
    }

    fn into_event(self, bucket_id: &str) -> Result<Event> {
        let timestamp = parse_timestamp(&self.timestamp, bucket_id)?;
        let endtime = parse_timestamp(&self.endtime, bucket_id)?;
        Ok(Event {
            id: Some(self.id),
            timestamp,
            duration: endtime - timestamp,
            data: serde_json::from_str(&self.data)?,
        })
    }
}

fn parse_timestamp(timestamp: &str, bucket_id: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DatastoreError::TimestampParse {
            bucket_id: bucket_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
