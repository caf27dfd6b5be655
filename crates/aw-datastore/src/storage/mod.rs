//! Storage backends.
//!
//! Every backend implements [`Storage`] with identical external behavior, so
//! a [`Datastore`](crate::Datastore) can be built over any of them.

mod file;
mod memory;
mod sqlite;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use aw_core::{BucketMetadata, Event};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DatastoreError, Result};

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Raw CRUD over buckets and their events.
///
/// Implementations must be safe to share across threads. Single calls are
/// atomic with respect to each other; sequences of calls (such as a heartbeat's
/// read-decide-write) are serialized per bucket by the `Datastore`.
pub trait Storage: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> StorageKind;

    /// Creates a bucket. Fails with `BucketExists` if the id is taken.
    fn create_bucket(&self, metadata: &BucketMetadata) -> Result<()>;

    /// Deletes a bucket and all of its events.
    fn delete_bucket(&self, bucket_id: &str) -> Result<()>;

    /// Lists the metadata of every bucket, keyed by id.
    fn buckets(&self) -> Result<BTreeMap<String, BucketMetadata>>;

    /// Returns the metadata of one bucket.
    fn get_metadata(&self, bucket_id: &str) -> Result<BucketMetadata>;

    /// Renames a bucket. `None` clears the name.
    fn set_name(&self, bucket_id: &str, name: Option<&str>) -> Result<()>;

    /// Appends an event, assigning it a fresh id, and returns the stored event.
    fn insert_one(&self, bucket_id: &str, event: Event) -> Result<Event>;

    /// Appends events in order. Equivalent to repeated [`Storage::insert_one`].
    fn insert_many(&self, bucket_id: &str, events: Vec<Event>) -> Result<Vec<Event>> {
        events
            .into_iter()
            .map(|event| self.insert_one(bucket_id, event))
            .collect()
    }

    /// Returns matching events, newest first.
    fn get_events(&self, bucket_id: &str, query: &EventQuery) -> Result<Vec<Event>>;

    /// Returns a single event by id.
    fn get_event(&self, bucket_id: &str, event_id: i64) -> Result<Option<Event>>;

    /// Returns the most recently inserted event.
    fn get_last(&self, bucket_id: &str) -> Result<Option<Event>>;

    /// Replaces the most recently inserted event, keeping its id.
    fn replace_last(&self, bucket_id: &str, event: Event) -> Result<Event>;

    /// Deletes an event, returning whether it existed.
    fn delete_event(&self, bucket_id: &str, event_id: i64) -> Result<bool>;

    /// Counts events in `[start, end)`.
    fn event_count(
        &self,
        bucket_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<usize>;
}

/// Filters for [`Storage::get_events`].
///
/// Events match `[start, end)` as defined by [`Event::in_range`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventQuery {
    /// Inclusive lower bound.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub end: Option<DateTime<Utc>>,
    /// Maximum number of events; `None` is unlimited.
    pub limit: Option<usize>,
}

impl EventQuery {
    /// Matches every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the query to `[start, end)`.
    #[must_use]
    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Caps the number of events. Negative values mean unlimited.
    #[must_use]
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = usize::try_from(limit).ok();
        self
    }
}

/// The available storage backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Volatile in-process storage, mainly for tests.
    Memory,
    /// One JSON document per bucket.
    Files,
    /// Embedded `SQLite` database.
    #[default]
    Sqlite,
}

impl StorageKind {
    /// String representation for configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Files => "files",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StorageKind {
    type Err = UnknownStorageKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "files" => Ok(Self::Files),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(UnknownStorageKind(s.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognized storage kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown storage method {0:?}, expected one of: memory, files, sqlite")]
pub struct UnknownStorageKind(pub String);

/// Filters, orders (newest first) and truncates events held in memory.
pub(crate) fn select_events<'a>(
    events: impl Iterator<Item = &'a Event>,
    query: &EventQuery,
) -> Vec<Event> {
    let mut selected: Vec<Event> = events
        .filter(|event| event.in_range(query.start, query.end))
        .cloned()
        .collect();
    selected.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    });
    if let Some(limit) = query.limit {
        selected.truncate(limit);
    }
    selected
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| DatastoreError::LockPoisoned)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| DatastoreError::LockPoisoned)
}
