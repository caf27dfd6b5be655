//! API error taxonomy.

use aw_datastore::DatastoreError;
use thiserror::Error;

/// Errors returned by [`ActivityApi`](crate::ActivityApi) operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The referenced bucket does not exist.
    #[error("there's no bucket named {0}")]
    NoSuchBucket(String),
    /// A bucket with this id already exists.
    #[error("a bucket named {0} already exists")]
    BucketExists(String),
    /// A required parameter was not supplied.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),
    /// The request body could not be decoded or failed validation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// The operation is disabled by server policy.
    #[error("{0}")]
    Unauthorized(String),
    /// The query engine rejected or failed to run a query.
    #[error("query failed: {0}")]
    QueryError(String),
    /// The storage backend failed.
    #[error(transparent)]
    Storage(DatastoreError),
}

impl ApiError {
    /// Stable name of the error kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoSuchBucket(_) => "NoSuchBucket",
            Self::BucketExists(_) => "BucketExists",
            Self::MissingParameter(_) => "MissingParameter",
            Self::InvalidPayload(_) => "InvalidPayload",
            Self::Unauthorized(_) => "Unauthorized",
            Self::QueryError(_) => "QueryError",
            Self::Storage(_) => "InternalError",
        }
    }

    /// HTTP status code a transport layer should answer with.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NoSuchBucket(_) => 404,
            Self::BucketExists(_) => 304,
            Self::MissingParameter(_) | Self::InvalidPayload(_) | Self::QueryError(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Storage(_) => 500,
        }
    }
}

impl From<DatastoreError> for ApiError {
    fn from(err: DatastoreError) -> Self {
        match err {
            DatastoreError::NoSuchBucket(id) => Self::NoSuchBucket(id),
            DatastoreError::BucketExists(id) => Self::BucketExists(id),
            DatastoreError::InvalidBucketId(id) => {
                Self::InvalidPayload(format!("bucket id {id:?} is not supported by this storage"))
            }
            DatastoreError::Validation(err) => Self::InvalidPayload(err.to_string()),
            err @ DatastoreError::CaseConflict { .. } => Self::InvalidPayload(err.to_string()),
            other => Self::Storage(other),
        }
    }
}

impl From<aw_core::ValidationError> for ApiError {
    fn from(err: aw_core::ValidationError) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datastore_errors_map_to_api_kinds() {
        let cases = [
            (DatastoreError::NoSuchBucket("b".into()), "NoSuchBucket", 404),
            (DatastoreError::BucketExists("b".into()), "BucketExists", 304),
            (DatastoreError::InvalidBucketId("../b".into()), "InvalidPayload", 400),
            (
                DatastoreError::CaseConflict {
                    bucket_id: "a".into(),
                    existing: "A".into(),
                },
                "InvalidPayload",
                400,
            ),
            (DatastoreError::LockPoisoned, "InternalError", 500),
        ];
        for (err, kind, status) in cases {
            let err = ApiError::from(err);
            assert_eq!(err.kind(), kind);
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn missing_parameter_names_the_parameter() {
        let err = ApiError::MissingParameter("pulsetime");
        assert_eq!(err.to_string(), "missing required parameter: pulsetime");
        assert_eq!(err.status_code(), 400);
    }
}
