//! Import command for loading an export into the store.

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::commands::util::{plural, read_input};
use crate::{ActivityApi, Export, ServerApi};

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Export file to read. Read from stdin when omitted.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

pub fn run<R: Read, W: Write>(
    reader: R,
    writer: &mut W,
    api: &ServerApi,
    args: &ImportArgs,
) -> Result<()> {
    let input = match &args.file {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            read_input(None, file)?
        }
        None => read_input(None, reader)?,
    };
    let export: Export = serde_json::from_str(&input).context("invalid export JSON")?;

    let buckets = export.buckets.len();
    let events: usize = export.buckets.values().map(|bucket| bucket.events.len()).sum();
    api.import_all(export)?;
    writeln!(
        writer,
        "Imported {} with {}",
        plural(buckets, "bucket"),
        plural(events, "event")
    )?;
    Ok(())
}
