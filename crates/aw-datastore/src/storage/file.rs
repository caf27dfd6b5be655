//! One JSON document per bucket, for a database-free setup.
//!
//! Each bucket lives in `<dir>/<bucket_id>.json` and holds the metadata, the
//! next event id and the events in insertion order. Every mutation rewrites
//! the document to a temporary file and renames it into place, so readers
//! always see a complete document.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use aw_core::{BucketMetadata, Event};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventQuery, Storage, StorageKind, select_events};
use crate::error::{DatastoreError, Result};
use crate::locks::BucketLocks;

const EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct BucketFile {
    metadata: BucketMetadata,
    next_id: i64,
    events: Vec<Event>,
}

/// Stores each bucket as a JSON file in a directory.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    locks: BucketLocks,
}

impl FileStorage {
    /// Opens (and creates if needed) a storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| DatastoreError::io(&dir, source))?;
        Ok(Self {
            dir,
            locks: BucketLocks::new(),
        })
    }

    /// Returns the storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, bucket_id: &str) -> Result<PathBuf> {
        if !is_safe_file_stem(bucket_id) {
            return Err(DatastoreError::InvalidBucketId(bucket_id.to_string()));
        }
        Ok(self.dir.join(format!("{bucket_id}.{EXTENSION}")))
    }

    fn load(&self, bucket_id: &str) -> Result<BucketFile> {
        let path = self.path_for(bucket_id)?;
        read_bucket_file(&path).map_err(|err| match err {
            DatastoreError::Io { source, .. } if source.kind() == ErrorKind::NotFound => {
                DatastoreError::NoSuchBucket(bucket_id.to_string())
            }
            other => other,
        })
    }

    fn save(&self, file: &BucketFile) -> Result<()> {
        let bucket_id = file.metadata.id.as_str();
        let path = self.path_for(bucket_id)?;
        let tmp_path = self.dir.join(format!(".{bucket_id}.{EXTENSION}.tmp"));
        let json = serde_json::to_vec(file)?;
        fs::write(&tmp_path, json).map_err(|source| DatastoreError::io(&tmp_path, source))?;
        fs::rename(&tmp_path, &path).map_err(|source| DatastoreError::io(&path, source))?;
        Ok(())
    }

    /// Finds a stored bucket whose id equals `bucket_id` except for case.
    ///
    /// Such ids would share one file on case-insensitive filesystems.
    fn case_variant(&self, bucket_id: &str) -> Result<Option<String>> {
        let wanted = bucket_id.to_lowercase();
        let suffix = format!(".{EXTENSION}");
        let entries = fs::read_dir(&self.dir).map_err(|source| DatastoreError::io(&self.dir, source))?;
        for entry in entries {
            let name = entry
                .map_err(|source| DatastoreError::io(&self.dir, source))?
                .file_name();
            let Some(stem) = name.to_str().and_then(|name| name.strip_suffix(suffix.as_str())) else {
                continue;
            };
            if !stem.starts_with('.') && stem != bucket_id && stem.to_lowercase() == wanted {
                return Ok(Some(stem.to_string()));
            }
        }
        Ok(None)
    }

    /// Loads a bucket, applies `f` and writes the result back under the bucket's lock.
    fn modify<T>(&self, bucket_id: &str, f: impl FnOnce(&mut BucketFile) -> Result<T>) -> Result<T> {
        self.locks.with_lock(bucket_id, || {
            let mut file = self.load(bucket_id)?;
            let value = f(&mut file)?;
            self.save(&file)?;
            Ok(value)
        })
    }
}

impl Storage for FileStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Files
    }

    fn create_bucket(&self, metadata: &BucketMetadata) -> Result<()> {
        let bucket_id = metadata.id.as_str();
        self.locks.with_lock(bucket_id, || {
            let path = self.path_for(bucket_id)?;
            if let Some(existing) = self.case_variant(bucket_id)? {
                return Err(DatastoreError::CaseConflict {
                    bucket_id: bucket_id.to_string(),
                    existing,
                });
            }
            if path.exists() {
                return Err(DatastoreError::BucketExists(bucket_id.to_string()));
            }
            self.save(&BucketFile {
                metadata: metadata.clone(),
                next_id: 1,
                events: Vec::new(),
            })
        })
    }

    fn delete_bucket(&self, bucket_id: &str) -> Result<()> {
        self.locks.with_lock(bucket_id, || {
            let path = self.path_for(bucket_id)?;
            fs::remove_file(&path).map_err(|source| {
                if source.kind() == ErrorKind::NotFound {
                    DatastoreError::NoSuchBucket(bucket_id.to_string())
                } else {
                    DatastoreError::io(&path, source)
                }
            })
        })
    }

    fn buckets(&self) -> Result<BTreeMap<String, BucketMetadata>> {
        let entries = fs::read_dir(&self.dir).map_err(|source| DatastoreError::io(&self.dir, source))?;
        let mut buckets = BTreeMap::new();
        for entry in entries {
            let path = entry
                .map_err(|source| DatastoreError::io(&self.dir, source))?
                .path();
            let is_bucket_file = path.extension().is_some_and(|ext| ext == EXTENSION)
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| !name.starts_with('.'));
            if !is_bucket_file {
                continue;
            }
            match read_bucket_file(&path) {
                Ok(file) => {
                    buckets.insert(file.metadata.id.to_string(), file.metadata);
                }
                // Deleted between listing and reading.
                Err(DatastoreError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(path = ?path, error = %err, "skipping unreadable bucket file");
                }
            }
        }
        Ok(buckets)
    }

    fn get_metadata(&self, bucket_id: &str) -> Result<BucketMetadata> {
        Ok(self.load(bucket_id)?.metadata)
    }

    fn set_name(&self, bucket_id: &str, name: Option<&str>) -> Result<()> {
        self.modify(bucket_id, |file| {
            file.metadata.name = name.map(str::to_string);
            Ok(())
        })
    }

    fn insert_one(&self, bucket_id: &str, event: Event) -> Result<Event> {
        let mut stored = self.insert_many(bucket_id, vec![event])?;
        stored
            .pop()
            .ok_or_else(|| DatastoreError::NoSuchEvent(bucket_id.to_string()))
    }

    fn insert_many(&self, bucket_id: &str, events: Vec<Event>) -> Result<Vec<Event>> {
        self.modify(bucket_id, |file| {
            let mut stored = Vec::with_capacity(events.len());
            for mut event in events {
                event.id = Some(file.next_id);
                file.next_id += 1;
                file.events.push(event.clone());
                stored.push(event);
            }
            Ok(stored)
        })
    }

    fn get_events(&self, bucket_id: &str, query: &EventQuery) -> Result<Vec<Event>> {
        let file = self.load(bucket_id)?;
        Ok(select_events(file.events.iter(), query))
    }

    fn get_event(&self, bucket_id: &str, event_id: i64) -> Result<Option<Event>> {
        let file = self.load(bucket_id)?;
        Ok(file
            .events
            .into_iter()
            .find(|event| event.id == Some(event_id)))
    }

    fn get_last(&self, bucket_id: &str) -> Result<Option<Event>> {
        Ok(self.load(bucket_id)?.events.pop())
    }

    fn replace_last(&self, bucket_id: &str, mut event: Event) -> Result<Event> {
        self.modify(bucket_id, |file| {
            let Some(last) = file.events.last_mut() else {
                return Err(DatastoreError::NoSuchEvent(bucket_id.to_string()));
            };
            event.id = last.id;
            last.clone_from(&event);
            Ok(event)
        })
    }

    fn delete_event(&self, bucket_id: &str, event_id: i64) -> Result<bool> {
        self.modify(bucket_id, |file| {
            let before = file.events.len();
            file.events.retain(|event| event.id != Some(event_id));
            Ok(file.events.len() != before)
        })
    }

    fn event_count(
        &self,
        bucket_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let file = self.load(bucket_id)?;
        Ok(file
            .events
            .iter()
            .filter(|event| event.in_range(start, end))
            .count())
    }
}

fn read_bucket_file(path: &Path) -> Result<BucketFile> {
    let content = fs::read(path).map_err(|source| DatastoreError::io(path, source))?;
    Ok(serde_json::from_slice(&content)?)
}

/// Bucket ids become file names, so they must not escape the directory or
/// collide with temporary files.
fn is_safe_file_stem(bucket_id: &str) -> bool {
    !bucket_id.is_empty()
        && !bucket_id.starts_with('.')
        && !bucket_id
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
}
