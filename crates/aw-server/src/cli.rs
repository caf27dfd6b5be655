//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::buckets::{CreateBucketArgs, DeleteBucketArgs, ListBucketsArgs, RenameBucketArgs};
use crate::commands::events::{CountArgs, DeleteEventArgs, InsertArgs, ListEventsArgs};
use crate::commands::export::ExportArgs;
use crate::commands::heartbeat::HeartbeatArgs;
use crate::commands::import::ImportArgs;
use crate::commands::sync::SyncArgs;

/// Local activity event store.
///
/// Stores timestamped events from activity watchers in named buckets and
/// merges heartbeats into duration-bearing events.
#[derive(Debug, Parser)]
#[command(name = "aw-server", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Use the separate testing store.
    #[arg(long, global = true)]
    pub testing: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show server identity.
    Info,

    /// List buckets.
    Buckets(ListBucketsArgs),

    /// Create a bucket.
    CreateBucket(CreateBucketArgs),

    /// Set or clear a bucket's display name.
    RenameBucket(RenameBucketArgs),

    /// Delete a bucket and all of its events.
    DeleteBucket(DeleteBucketArgs),

    /// Print events of a bucket as JSON, newest first.
    Events(ListEventsArgs),

    /// Insert events (a JSON object or array) into a bucket.
    Insert(InsertArgs),

    /// Send a heartbeat, merging it into the last event when possible.
    Heartbeat(HeartbeatArgs),

    /// Count events of a bucket.
    Count(CountArgs),

    /// Delete a single event.
    DeleteEvent(DeleteEventArgs),

    /// Export one or all buckets as JSON.
    Export(ExportArgs),

    /// Import buckets from an export.
    Import(ImportArgs),

    /// Copy buckets missing here from another data directory.
    Sync(SyncArgs),
}
