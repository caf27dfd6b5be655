use std::path::PathBuf;

use aw_core::ValidationError;
use thiserror::Error;

/// Datastore errors.
#[derive(Debug, Error)]
pub enum DatastoreError {
    /// The referenced bucket does not exist.
    #[error("there's no bucket named {0}")]
    NoSuchBucket(String),
    /// A bucket with this id already exists.
    #[error("a bucket named {0} already exists")]
    BucketExists(String),
    /// `replace_last` was called on a bucket without events.
    #[error("bucket {0} has no event to replace")]
    NoSuchEvent(String),
    /// The bucket id cannot be represented by this backend.
    #[error("bucket id {0:?} is not usable as a file name")]
    InvalidBucketId(String),
    /// The bucket id matches an existing one except for case.
    #[error("bucket id {bucket_id} differs from existing bucket {existing} only by case")]
    CaseConflict { bucket_id: String, existing: String },
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A file could not be read or written.
    #[error("failed to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Stored data could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp in bucket {bucket_id}: {timestamp}")]
    TimestampParse {
        bucket_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// Stored data violated a core invariant.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A thread panicked while holding a storage lock.
    #[error("storage lock poisoned")]
    LockPoisoned,
}

/// Result alias for datastore operations.
pub type Result<T> = std::result::Result<T, DatastoreError>;

impl DatastoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
