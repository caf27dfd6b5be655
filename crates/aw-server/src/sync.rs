//! Copying buckets between activity stores.

use serde::Serialize;
use tracing::{debug, info};

use crate::api::{ActivityApi, ApiResult};

/// A bucket copied by [`sync`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncedBucket {
    pub bucket_id: String,
    pub events: usize,
}

/// Outcome of a [`sync`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Buckets that were missing in the target and have been copied.
    pub synced: Vec<SyncedBucket>,
    /// Buckets the target already had.
    pub skipped: Vec<String>,
}

/// Copies every bucket of `source` that `target` does not have yet.
///
/// Buckets present in both stores are left untouched, so running the sync
/// twice copies nothing the second time.
pub fn sync(source: &dyn ActivityApi, target: &dyn ActivityApi) -> ApiResult<SyncReport> {
    let existing = target.get_buckets()?;
    let mut report = SyncReport::default();

    for bucket_id in source.get_buckets()?.into_keys() {
        if existing.contains_key(&bucket_id) {
            debug!(bucket_id, "target already has bucket");
            report.skipped.push(bucket_id);
            continue;
        }

        let export = source.export_bucket(&bucket_id)?;
        for bucket in export.buckets.into_values() {
            let events = bucket.events.len();
            target.import_bucket(bucket)?;
            report.synced.push(SyncedBucket {
                bucket_id: bucket_id.clone(),
                events,
            });
        }
    }

    info!(
        synced = report.synced.len(),
        skipped = report.skipped.len(),
        "sync finished"
    );
    Ok(report)
}
