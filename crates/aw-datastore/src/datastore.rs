use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use aw_core::{BucketMetadata, Event, Pulsetime, heartbeat_merge};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{DatastoreError, Result};
use crate::locks::BucketLocks;
use crate::storage::{
    EventQuery, FileStorage, MemoryStorage, SqliteStorage, Storage, StorageKind,
};

/// File name of the `SQLite` database inside the data directory.
pub const SQLITE_FILE: &str = "sqlite.db";

/// Directory holding one JSON document per bucket inside the data directory.
pub const BUCKETS_DIR: &str = "buckets";

/// Routes bucket operations to a storage backend.
pub struct Datastore {
    storage: Box<dyn Storage>,
    locks: BucketLocks,
}

impl fmt::Debug for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datastore")
            .field("storage", &self.storage.kind())
            .finish_non_exhaustive()
    }
}

impl Datastore {
    /// Wraps an already constructed backend.
    pub fn new<S: Storage + 'static>(storage: S) -> Self {
        Self {
            storage: Box::new(storage),
            locks: BucketLocks::new(),
        }
    }

    /// Opens the backend of the given kind below `data_dir`.
    ///
    /// The memory backend ignores `data_dir`. The file backend uses
    /// `<data_dir>/buckets/`, the `SQLite` backend `<data_dir>/sqlite.db`.
    pub fn open(kind: StorageKind, data_dir: &Path) -> Result<Self> {
        let datastore = match kind {
            StorageKind::Memory => Self::new(MemoryStorage::new()),
            StorageKind::Files => Self::new(FileStorage::open(data_dir.join(BUCKETS_DIR))?),
            StorageKind::Sqlite => {
                fs::create_dir_all(data_dir)
                    .map_err(|source| DatastoreError::io(data_dir, source))?;
                Self::new(SqliteStorage::open(&data_dir.join(SQLITE_FILE))?)
            }
        };
        info!(storage = %kind, data_dir = %data_dir.display(), "opened datastore");
        Ok(datastore)
    }

    /// Returns which backend this datastore uses.
    pub fn storage_kind(&self) -> StorageKind {
        self.storage.kind()
    }

    /// Returns a handle to a bucket. Existence is checked by each operation.
    pub fn bucket<'a>(&'a self, bucket_id: &'a str) -> Bucket<'a> {
        Bucket {
            datastore: self,
            id: bucket_id,
        }
    }

    /// Lists the metadata of every bucket, keyed by id.
    pub fn buckets(&self) -> Result<BTreeMap<String, BucketMetadata>> {
        self.storage.buckets()
    }

    /// Creates a bucket. Fails with `BucketExists` if the id is taken.
    pub fn create_bucket(&self, metadata: &BucketMetadata) -> Result<()> {
        let bucket_id = metadata.id.as_str();
        self.locks.with_lock(bucket_id, || {
            self.storage.create_bucket(metadata)?;
            info!(bucket_id, kind = %metadata.kind, "created bucket");
            Ok(())
        })
    }

    /// Deletes a bucket and all of its events.
    pub fn delete_bucket(&self, bucket_id: &str) -> Result<()> {
        self.locks.with_lock(bucket_id, || {
            self.storage.delete_bucket(bucket_id)?;
            info!(bucket_id, "deleted bucket");
            Ok(())
        })
    }
}

/// A lightweight handle to one bucket of a [`Datastore`].
#[derive(Debug, Clone, Copy)]
pub struct Bucket<'a> {
    datastore: &'a Datastore,
    id: &'a str,
}

impl Bucket<'_> {
    /// Returns the bucket id.
    pub const fn id(&self) -> &str {
        self.id
    }

    fn storage(&self) -> &dyn Storage {
        self.datastore.storage.as_ref()
    }

    fn locked<T>(&self, f: impl FnOnce(&dyn Storage) -> Result<T>) -> Result<T> {
        self.datastore
            .locks
            .with_lock(self.id, || f(self.storage()))
    }

    /// Returns whether the bucket exists.
    pub fn exists(&self) -> Result<bool> {
        match self.storage().get_metadata(self.id) {
            Ok(_) => Ok(true),
            Err(DatastoreError::NoSuchBucket(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Returns the bucket's metadata.
    pub fn metadata(&self) -> Result<BucketMetadata> {
        self.storage().get_metadata(self.id)
    }

    /// Renames the bucket. `None` clears the name.
    pub fn set_name(&self, name: Option<&str>) -> Result<()> {
        self.locked(|storage| storage.set_name(self.id, name))
    }

    /// Returns matching events, newest first.
    pub fn get(&self, query: &EventQuery) -> Result<Vec<Event>> {
        self.storage().get_events(self.id, query)
    }

    /// Returns a single event by id.
    pub fn get_event(&self, event_id: i64) -> Result<Option<Event>> {
        self.storage().get_event(self.id, event_id)
    }

    /// Returns the most recently inserted event.
    pub fn last(&self) -> Result<Option<Event>> {
        self.storage().get_last(self.id)
    }

    /// Counts events in `[start, end)`.
    pub fn count(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<usize> {
        self.storage().event_count(self.id, start, end)
    }

    /// Stores an event and returns it with its assigned id.
    pub fn insert(&self, event: Event) -> Result<Event> {
        event.validate()?;
        self.locked(|storage| {
            let stored = storage.insert_one(self.id, event)?;
            debug!(bucket_id = self.id, event_id = ?stored.id, "inserted event");
            Ok(stored)
        })
    }

    /// Stores events in order and returns them with their assigned ids.
    ///
    /// Nothing is written if any event is out of range.
    pub fn insert_many(&self, events: Vec<Event>) -> Result<Vec<Event>> {
        events.iter().try_for_each(Event::validate)?;
        self.locked(|storage| {
            let stored = storage.insert_many(self.id, events)?;
            debug!(bucket_id = self.id, count = stored.len(), "inserted events");
            Ok(stored)
        })
    }

    /// Replaces the most recently inserted event, keeping its id.
    pub fn replace_last(&self, event: Event) -> Result<Event> {
        event.validate()?;
        self.locked(|storage| storage.replace_last(self.id, event))
    }

    /// Deletes an event, returning whether it existed.
    pub fn delete_event(&self, event_id: i64) -> Result<bool> {
        self.locked(|storage| {
            let deleted = storage.delete_event(self.id, event_id)?;
            debug!(bucket_id = self.id, event_id, deleted, "deleted event");
            Ok(deleted)
        })
    }

    /// Merges a heartbeat into the last event or stores it as a new event.
    ///
    /// The heartbeat is compared with the most recently *inserted* event,
    /// not the one with the latest timestamp, and a merge replaces that same
    /// event. Insertion order therefore decides which event a heartbeat
    /// continues; anything that copies events between stores must insert
    /// them oldest first.
    ///
    /// Runs under the bucket's lock, so concurrent heartbeats are applied
    /// one at a time against an up-to-date last event.
    pub fn heartbeat(&self, heartbeat: Event, pulsetime: Pulsetime) -> Result<Event> {
        heartbeat.validate()?;
        self.locked(|storage| {
            let last = storage.get_last(self.id)?;
            if let Some(merged) = last
                .as_ref()
                .and_then(|last| heartbeat_merge(last, &heartbeat, pulsetime))
            {
                debug!(bucket_id = self.id, event_id = ?merged.id, "merged heartbeat");
                return storage.replace_last(self.id, merged);
            }
            let stored = storage.insert_one(self.id, heartbeat)?;
            debug!(bucket_id = self.id, event_id = ?stored.id, "stored heartbeat as new event");
            Ok(stored)
        })
    }
}
