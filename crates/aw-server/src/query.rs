//! Seam for an external query engine.
//!
//! The server does not interpret queries itself. It hands the query text,
//! the time period and read access to the datastore to a [`QueryEngine`] and
//! returns whatever JSON the engine produces.

use aw_datastore::Datastore;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Failure reported by a query engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct QueryFailure(pub String);

/// Runs named queries over a datastore.
pub trait QueryEngine: Send + Sync {
    /// Evaluates `query` over the events in `[start, end)`.
    fn query(
        &self,
        name: &str,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        datastore: &Datastore,
    ) -> Result<Value, QueryFailure>;
}

/// Engine used when none is configured. Rejects every query.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoQueryEngine;

impl QueryEngine for NoQueryEngine {
    fn query(
        &self,
        name: &str,
        _query: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _datastore: &Datastore,
    ) -> Result<Value, QueryFailure> {
        Err(QueryFailure(format!(
            "no query engine configured, cannot run query {name:?}"
        )))
    }
}
