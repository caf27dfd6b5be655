//! The server API: bucket and event operations on top of a [`Datastore`].
//!
//! [`ActivityApi`] is the interface shared by every way of talking to an
//! activity store. [`ServerApi`] implements it natively over a local
//! datastore; a client for a remote store would implement the same trait, so
//! tooling such as [`sync`](crate::sync) works against either.

use std::collections::BTreeMap;
use std::fmt;

use aw_core::{BucketId, BucketMetadata, Event, Pulsetime};
use aw_datastore::{Datastore, DatastoreError, EventQuery};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::query::{NoQueryEngine, QueryEngine};

/// Result alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Server identity reported by [`ActivityApi::get_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub hostname: String,
    pub version: String,
    pub testing: bool,
    pub device_id: String,
}

/// Bucket metadata plus the end of its newest event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketInfo {
    #[serde(flatten)]
    pub metadata: BucketMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Payload for creating a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBucket {
    #[serde(rename = "type")]
    pub kind: String,
    pub client: String,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Defaults to the time of creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl CreateBucket {
    pub fn new(
        kind: impl Into<String>,
        client: impl Into<String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            client: client.into(),
            hostname: hostname.into(),
            name: None,
            created: None,
            data: Map::new(),
        }
    }

    fn into_metadata(self, id: BucketId) -> BucketMetadata {
        let mut metadata = BucketMetadata::new(id, self.kind, self.client, self.hostname);
        metadata.name = self.name;
        if let Some(created) = self.created {
            metadata.created = created;
        }
        metadata.data = self.data;
        metadata
    }
}

/// Buckets with their events, as produced by export and consumed by import.
///
/// Serialized as `{"buckets": {"<id>": {...metadata, "events": [...]}}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Export {
    pub buckets: BTreeMap<String, ExportedBucket>,
}

/// One exported bucket. Events carry no ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedBucket {
    #[serde(flatten)]
    pub metadata: BucketMetadata,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Operations of an activity store.
pub trait ActivityApi: Send + Sync {
    /// Returns the server's identity.
    fn get_info(&self) -> ApiResult<Info>;

    /// Lists every bucket with its `last_updated` time.
    fn get_buckets(&self) -> ApiResult<BTreeMap<String, BucketInfo>>;

    /// Returns a bucket's metadata.
    fn get_bucket_metadata(&self, bucket_id: &str) -> ApiResult<BucketMetadata>;

    /// Creates a bucket. Returns `false` if it already existed, in which
    /// case nothing is changed.
    fn create_bucket(&self, bucket_id: &str, bucket: CreateBucket) -> ApiResult<bool>;

    /// Renames a bucket. `None` clears the name.
    fn update_bucket_name(&self, bucket_id: &str, name: Option<&str>) -> ApiResult<()>;

    /// Deletes a bucket and its events.
    fn delete_bucket(&self, bucket_id: &str) -> ApiResult<()>;

    /// Returns events in `[start, end)`, newest first. A missing or negative
    /// `limit` returns every matching event.
    fn get_events(
        &self,
        bucket_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> ApiResult<Vec<Event>>;

    /// Returns one event by id.
    fn get_event(&self, bucket_id: &str, event_id: i64) -> ApiResult<Option<Event>>;

    /// Stores events and returns them with their assigned ids.
    fn create_events(&self, bucket_id: &str, events: Vec<Event>) -> ApiResult<Vec<Event>>;

    /// Counts events in `[start, end)`.
    fn get_eventcount(
        &self,
        bucket_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ApiResult<usize>;

    /// Deletes an event, returning whether it existed.
    fn delete_event(&self, bucket_id: &str, event_id: i64) -> ApiResult<bool>;

    /// Merges a heartbeat into the bucket's last event or stores it.
    ///
    /// `pulsetime` is required; `None` fails with `MissingParameter`.
    fn heartbeat(
        &self,
        bucket_id: &str,
        heartbeat: Event,
        pulsetime: Option<f64>,
    ) -> ApiResult<Event>;

    /// Exports a single bucket.
    fn export_bucket(&self, bucket_id: &str) -> ApiResult<Export>;

    /// Exports every bucket.
    fn export_all(&self) -> ApiResult<Export>;

    /// Imports one bucket. Fails with `BucketExists` if the id is taken.
    ///
    /// Events are inserted oldest first, so later heartbeats continue the
    /// newest one. Every event is checked before the bucket is created.
    fn import_bucket(&self, bucket: ExportedBucket) -> ApiResult<()>;

    /// Imports every bucket of an export.
    ///
    /// Fails with `BucketExists` before writing anything if any id is taken.
    /// If importing any bucket fails, the buckets already imported are
    /// removed again.
    fn import_all(&self, export: Export) -> ApiResult<()>;

    /// Runs a named query over `[start, end)`.
    fn query(
        &self,
        name: &str,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResult<Value>;
}

/// Policy and identity of a [`ServerApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub hostname: String,
    pub device_id: String,
    pub testing: bool,
    /// Whether `delete_bucket` is permitted.
    pub allow_bucket_delete: bool,
    /// Whether a heartbeat to a missing bucket creates it.
    pub auto_create_buckets: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            hostname: aw_core::bucket::UNKNOWN.to_string(),
            device_id: String::new(),
            testing: false,
            allow_bucket_delete: true,
            auto_create_buckets: false,
        }
    }
}

/// [`ActivityApi`] over a local [`Datastore`].
pub struct ServerApi {
    datastore: Datastore,
    settings: ApiSettings,
    query_engine: Box<dyn QueryEngine>,
}

impl fmt::Debug for ServerApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerApi")
            .field("datastore", &self.datastore)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ServerApi {
    /// Creates an API over `datastore` without a query engine.
    pub fn new(datastore: Datastore, settings: ApiSettings) -> Self {
        Self {
            datastore,
            settings,
            query_engine: Box::new(NoQueryEngine),
        }
    }

    /// Replaces the query engine.
    #[must_use]
    pub fn with_query_engine<Q: QueryEngine + 'static>(mut self, engine: Q) -> Self {
        self.query_engine = Box::new(engine);
        self
    }

    pub const fn datastore(&self) -> &Datastore {
        &self.datastore
    }

    pub const fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    /// Exports a bucket with its events oldest first, the order import
    /// inserts them in.
    fn exported_bucket(&self, metadata: BucketMetadata) -> ApiResult<ExportedBucket> {
        let events = self
            .datastore
            .bucket(metadata.id.as_str())
            .get(&EventQuery::all())?
            .iter()
            .rev()
            .map(Event::without_id)
            .collect();
        Ok(ExportedBucket { metadata, events })
    }

    /// Creates the bucket and inserts already prepared events, removing the
    /// bucket again if the insert fails.
    fn import_prepared(&self, metadata: &BucketMetadata, events: Vec<Event>) -> ApiResult<()> {
        self.datastore.create_bucket(metadata)?;

        let bucket_id = metadata.id.as_str();
        match self.datastore.bucket(bucket_id).insert_many(events) {
            Ok(imported) => {
                info!(bucket_id, events = imported.len(), "imported bucket");
                Ok(())
            }
            Err(err) => {
                self.discard_bucket(bucket_id);
                Err(err.into())
            }
        }
    }

    /// Deletes a bucket left behind by a failed import.
    fn discard_bucket(&self, bucket_id: &str) {
        match self.datastore.delete_bucket(bucket_id) {
            Ok(()) => warn!(bucket_id, "removed partially imported bucket"),
            Err(err) => warn!(bucket_id, error = %err, "failed to remove partially imported bucket"),
        }
    }

    fn last_updated(&self, bucket_id: &str) -> ApiResult<Option<DateTime<Utc>>> {
        let newest = self
            .datastore
            .bucket(bucket_id)
            .get(&EventQuery::all().with_limit(1))?;
        Ok(newest.first().map(Event::end))
    }
}

impl ActivityApi for ServerApi {
    fn get_info(&self) -> ApiResult<Info> {
        Ok(Info {
            hostname: self.settings.hostname.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            testing: self.settings.testing,
            device_id: self.settings.device_id.clone(),
        })
    }

    fn get_buckets(&self) -> ApiResult<BTreeMap<String, BucketInfo>> {
        let mut buckets = BTreeMap::new();
        for (id, metadata) in self.datastore.buckets()? {
            let last_updated = match self.last_updated(&id) {
                Ok(last_updated) => last_updated,
                // Deleted while listing.
                Err(ApiError::NoSuchBucket(_)) => continue,
                Err(err) => return Err(err),
            };
            buckets.insert(
                id,
                BucketInfo {
                    metadata,
                    last_updated,
                },
            );
        }
        Ok(buckets)
    }

    fn get_bucket_metadata(&self, bucket_id: &str) -> ApiResult<BucketMetadata> {
        Ok(self.datastore.bucket(bucket_id).metadata()?)
    }

    fn create_bucket(&self, bucket_id: &str, bucket: CreateBucket) -> ApiResult<bool> {
        let metadata = bucket.into_metadata(BucketId::new(bucket_id)?);
        match self.datastore.create_bucket(&metadata) {
            Ok(()) => Ok(true),
            Err(DatastoreError::BucketExists(_)) => {
                debug!(bucket_id, "bucket already exists");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn update_bucket_name(&self, bucket_id: &str, name: Option<&str>) -> ApiResult<()> {
        Ok(self.datastore.bucket(bucket_id).set_name(name)?)
    }

    fn delete_bucket(&self, bucket_id: &str) -> ApiResult<()> {
        if !self.settings.allow_bucket_delete {
            return Err(ApiError::Unauthorized(
                "deleting buckets is disabled by configuration".to_string(),
            ));
        }
        Ok(self.datastore.delete_bucket(bucket_id)?)
    }

    fn get_events(
        &self,
        bucket_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<i64>,
    ) -> ApiResult<Vec<Event>> {
        let query = EventQuery::all()
            .between(start, end)
            .with_limit(limit.unwrap_or(-1));
        Ok(self.datastore.bucket(bucket_id).get(&query)?)
    }

    fn get_event(&self, bucket_id: &str, event_id: i64) -> ApiResult<Option<Event>> {
        Ok(self.datastore.bucket(bucket_id).get_event(event_id)?)
    }

    fn create_events(&self, bucket_id: &str, events: Vec<Event>) -> ApiResult<Vec<Event>> {
        Ok(self.datastore.bucket(bucket_id).insert_many(events)?)
    }

    fn get_eventcount(
        &self,
        bucket_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ApiResult<usize> {
        Ok(self.datastore.bucket(bucket_id).count(start, end)?)
    }

    fn delete_event(&self, bucket_id: &str, event_id: i64) -> ApiResult<bool> {
        Ok(self.datastore.bucket(bucket_id).delete_event(event_id)?)
    }

    fn heartbeat(
        &self,
        bucket_id: &str,
        heartbeat: Event,
        pulsetime: Option<f64>,
    ) -> ApiResult<Event> {
        let pulsetime = pulsetime.ok_or(ApiError::MissingParameter("pulsetime"))?;
        let pulsetime = Pulsetime::from_secs_f64(pulsetime)?;
        let bucket = self.datastore.bucket(bucket_id);

        if self.settings.auto_create_buckets && !bucket.exists()? {
            let metadata = BucketMetadata::placeholder(BucketId::new(bucket_id)?);
            match self.datastore.create_bucket(&metadata) {
                Ok(()) => info!(bucket_id, "created bucket for heartbeat"),
                // Another heartbeat created it first.
                Err(DatastoreError::BucketExists(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        Ok(bucket.heartbeat(heartbeat, pulsetime)?)
    }

    fn export_bucket(&self, bucket_id: &str) -> ApiResult<Export> {
        let metadata = self.datastore.bucket(bucket_id).metadata()?;
        let mut export = Export::default();
        export
            .buckets
            .insert(bucket_id.to_string(), self.exported_bucket(metadata)?);
        Ok(export)
    }

    fn export_all(&self) -> ApiResult<Export> {
        let mut export = Export::default();
        for (id, metadata) in self.datastore.buckets()? {
            export.buckets.insert(id, self.exported_bucket(metadata)?);
        }
        Ok(export)
    }

    fn import_bucket(&self, bucket: ExportedBucket) -> ApiResult<()> {
        let ExportedBucket { metadata, events } = bucket;
        let events = prepare_import(events)?;
        self.import_prepared(&metadata, events)
    }

    fn import_all(&self, export: Export) -> ApiResult<()> {
        let existing = self.datastore.buckets()?;
        if let Some(taken) = export
            .buckets
            .values()
            .map(|bucket| bucket.metadata.id.as_str())
            .find(|id| existing.contains_key(*id))
        {
            return Err(ApiError::BucketExists(taken.to_string()));
        }

        let buckets = export
            .buckets
            .into_values()
            .map(|ExportedBucket { metadata, events }| {
                prepare_import(events).map(|events| (metadata, events))
            })
            .collect::<ApiResult<Vec<_>>>()?;

        let results: Vec<(BucketMetadata, ApiResult<()>)> = buckets
            .into_par_iter()
            .map(|(metadata, events)| {
                let result = self.import_prepared(&metadata, events);
                (metadata, result)
            })
            .collect();

        let mut failure = None;
        let mut imported = Vec::new();
        for (metadata, result) in results {
            match result {
                Ok(()) => imported.push(metadata.id),
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        match failure {
            None => Ok(()),
            Some(err) => {
                for bucket_id in &imported {
                    self.discard_bucket(bucket_id.as_str());
                }
                Err(err)
            }
        }
    }

    fn query(
        &self,
        name: &str,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResult<Value> {
        self.query_engine
            .query(name, query, start, end, &self.datastore)
            .map_err(|err| ApiError::QueryError(err.0))
    }
}

/// Strips ids, checks every event and orders them oldest first.
///
/// The sort is stable, so events sharing a timestamp keep their order.
fn prepare_import(mut events: Vec<Event>) -> ApiResult<Vec<Event>> {
    for event in &mut events {
        event.id = None;
        event.validate()?;
    }
    events.sort_by_key(|event| event.timestamp);
    Ok(events)
}

/// Decodes a JSON event or array of events.
pub fn decode_events(input: &str) -> ApiResult<Vec<Event>> {
    let value: Value = serde_json::from_str(input)?;
    let events = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(events)
}
