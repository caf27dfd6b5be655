//! Sync command for pulling buckets from another data directory.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use aw_datastore::{Datastore, StorageKind};
use clap::Args;

use crate::commands::util::plural;
use crate::sync::{SyncReport, sync};
use crate::{ApiSettings, ServerApi};

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Data directory of the store to pull from.
    #[arg(long)]
    pub from: PathBuf,
    /// Storage backend of the source store. Defaults to the configured one.
    #[arg(long)]
    pub from_storage: Option<StorageKind>,
}

pub fn run<W: Write>(
    writer: &mut W,
    api: &ServerApi,
    args: &SyncArgs,
    default_storage: StorageKind,
) -> Result<SyncReport> {
    if !args.from.is_dir() {
        bail!("source data directory {} does not exist", args.from.display());
    }
    let storage = args.from_storage.unwrap_or(default_storage);
    let datastore = Datastore::open(storage, &args.from)
        .with_context(|| format!("failed to open {}", args.from.display()))?;
    let source = ServerApi::new(datastore, ApiSettings::default());

    let report = sync(&source, api)?;
    for bucket in &report.synced {
        writeln!(
            writer,
            "Synced {} ({})",
            bucket.bucket_id,
            plural(bucket.events, "event")
        )?;
    }
    for bucket_id in &report.skipped {
        writeln!(writer, "Skipped {bucket_id} (already present)")?;
    }
    if report.synced.is_empty() && report.skipped.is_empty() {
        writeln!(writer, "Nothing to sync.")?;
    }
    Ok(report)
}
