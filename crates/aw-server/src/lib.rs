//! Activity store server.
//!
//! This crate provides the [`ServerApi`] over an `aw-datastore` backend and
//! the command-line interface built on it.

pub mod api;
mod cli;
pub mod commands;
mod config;
pub mod device;
mod error;
pub mod query;
pub mod sync;

use anyhow::{Context, Result};

pub use api::{
    ActivityApi, ApiResult, ApiSettings, BucketInfo, CreateBucket, Export, ExportedBucket, Info,
    ServerApi, decode_events,
};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::ApiError;
pub use query::{NoQueryEngine, QueryEngine, QueryFailure};

/// Opens the configured datastore and wraps it in a [`ServerApi`].
///
/// Creates the data directory and device identity on first use.
pub fn open_api(config: &Config) -> Result<ServerApi> {
    let data_dir = config.effective_data_dir();
    let device = device::load_or_init(&data_dir)?;
    let datastore = aw_datastore::Datastore::open(config.storage, &data_dir)
        .with_context(|| format!("failed to open {} storage in {}", config.storage, data_dir.display()))?;

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| aw_core::bucket::UNKNOWN.to_string());

    let settings = ApiSettings {
        hostname,
        device_id: device.device_id,
        testing: config.testing,
        allow_bucket_delete: config.allow_bucket_delete,
        auto_create_buckets: config.auto_create_buckets,
    };
    Ok(ServerApi::new(datastore, settings))
}
