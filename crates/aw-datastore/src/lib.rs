//! Event storage for the activity store.
//!
//! Buckets and their events are persisted through a pluggable [`Storage`]
//! backend: [`MemoryStorage`], [`FileStorage`] or [`SqliteStorage`]. The
//! [`Datastore`] wraps a backend and hands out [`Bucket`] handles that route
//! operations to it.
//!
//! # Thread Safety
//!
//! Every backend is `Send + Sync` and each call is atomic on its own. A
//! [`Datastore`] additionally serializes mutations per bucket with a
//! [`BucketLocks`] map, so multi-step operations such as
//! [`Bucket::heartbeat`] (read the last event, decide, write) never
//! interleave with another writer of the same bucket. Writers of different
//! buckets never wait on each other's lock.
//!
//! A `Datastore` is meant to be shared, e.g. behind an `Arc`.
//!
//! # Ordering
//!
//! Event ids are assigned by the backend on insert and are never reused
//! within a bucket. Queries return events newest first: by timestamp
//! descending, then id descending, so events with equal timestamps come
//! back in reverse insertion order.

mod datastore;
mod error;
mod locks;
mod storage;

pub use datastore::{Bucket, Datastore};
pub use error::{DatastoreError, Result};
pub use locks::BucketLocks;
pub use storage::{
    EventQuery, FileStorage, MemoryStorage, SqliteStorage, Storage, StorageKind,
    UnknownStorageKind,
};
