//! Volatile in-process storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use aw_core::{BucketMetadata, Event};
use chrono::{DateTime, Utc};

use super::{EventQuery, Storage, StorageKind, read, select_events, write};
use crate::error::{DatastoreError, Result};

#[derive(Debug)]
struct MemoryBucket {
    metadata: BucketMetadata,
    /// Events in insertion order.
    events: Vec<Event>,
    next_id: i64,
}

/// Keeps buckets in a lock-protected map owned by this instance.
///
/// Each bucket has its own lock, so readers and writers of different buckets
/// only contend briefly on the outer map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: RwLock<HashMap<String, Arc<RwLock<MemoryBucket>>>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        tracing::warn!(
            "using in-memory storage, events will be lost when the process exits"
        );
        Self::default()
    }

    fn bucket(&self, bucket_id: &str) -> Result<Arc<RwLock<MemoryBucket>>> {
        read(&self.buckets)?
            .get(bucket_id)
            .cloned()
            .ok_or_else(|| DatastoreError::NoSuchBucket(bucket_id.to_string()))
    }
}

impl Storage for MemoryStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Memory
    }

    fn create_bucket(&self, metadata: &BucketMetadata) -> Result<()> {
        let mut buckets = write(&self.buckets)?;
        let id = metadata.id.as_str();
        if buckets.contains_key(id) {
            return Err(DatastoreError::BucketExists(id.to_string()));
        }
        buckets.insert(
            id.to_string(),
            Arc::new(RwLock::new(MemoryBucket {
                metadata: metadata.clone(),
                events: Vec::new(),
                next_id: 1,
            })),
        );
        Ok(())
    }

    fn delete_bucket(&self, bucket_id: &str) -> Result<()> {
        write(&self.buckets)?
            .remove(bucket_id)
            .map(|_| ())
            .ok_or_else(|| DatastoreError::NoSuchBucket(bucket_id.to_string()))
    }

    fn buckets(&self) -> Result<BTreeMap<String, BucketMetadata>> {
        let buckets = read(&self.buckets)?;
        let mut all = BTreeMap::new();
        for (id, bucket) in buckets.iter() {
            all.insert(id.clone(), read(bucket)?.metadata.clone());
        }
        Ok(all)
    }

    fn get_metadata(&self, bucket_id: &str) -> Result<BucketMetadata> {
        let bucket = self.bucket(bucket_id)?;
        let metadata = read(&bucket)?.metadata.clone();
        Ok(metadata)
    }

    fn set_name(&self, bucket_id: &str, name: Option<&str>) -> Result<()> {
        let bucket = self.bucket(bucket_id)?;
        write(&bucket)?.metadata.name = name.map(str::to_string);
        Ok(())
    }

    fn insert_one(&self, bucket_id: &str, mut event: Event) -> Result<Event> {
        let bucket = self.bucket(bucket_id)?;
        let mut bucket = write(&bucket)?;
        event.id = Some(bucket.next_id);
        bucket.next_id += 1;
        bucket.events.push(event.clone());
        Ok(event)
    }

    fn insert_many(&self, bucket_id: &str, events: Vec<Event>) -> Result<Vec<Event>> {
        let bucket = self.bucket(bucket_id)?;
        let mut bucket = write(&bucket)?;
        let mut stored = Vec::with_capacity(events.len());
        for mut event in events {
            event.id = Some(bucket.next_id);
            bucket.next_id += 1;
            bucket.events.push(event.clone());
            stored.push(event);
        }
        Ok(stored)
    }

    fn get_events(&self, bucket_id: &str, query: &EventQuery) -> Result<Vec<Event>> {
        let bucket = self.bucket(bucket_id)?;
        let bucket = read(&bucket)?;
        Ok(select_events(bucket.events.iter(), query))
    }

    fn get_event(&self, bucket_id: &str, event_id: i64) -> Result<Option<Event>> {
        let bucket = self.bucket(bucket_id)?;
        let bucket = read(&bucket)?;
        Ok(bucket
            .events
            .iter()
            .find(|event| event.id == Some(event_id))
            .cloned())
    }

    fn get_last(&self, bucket_id: &str) -> Result<Option<Event>> {
        let bucket = self.bucket(bucket_id)?;
        let last = read(&bucket)?.events.last().cloned();
        Ok(last)
    }

    fn replace_last(&self, bucket_id: &str, mut event: Event) -> Result<Event> {
        let bucket = self.bucket(bucket_id)?;
        let mut bucket = write(&bucket)?;
        let Some(last) = bucket.events.last_mut() else {
            return Err(DatastoreError::NoSuchEvent(bucket_id.to_string()));
        };
        event.id = last.id;
        last.clone_from(&event);
        Ok(event)
    }

    fn delete_event(&self, bucket_id: &str, event_id: i64) -> Result<bool> {
        let bucket = self.bucket(bucket_id)?;
        let mut bucket = write(&bucket)?;
        let before = bucket.events.len();
        bucket.events.retain(|event| event.id != Some(event_id));
        Ok(bucket.events.len() != before)
    }

    fn event_count(
        &self,
        bucket_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let bucket = self.bucket(bucket_id)?;
        let bucket = read(&bucket)?;
        Ok(bucket
            .events
            .iter()
            .filter(|event| event.in_range(start, end))
            .count())
    }
}
