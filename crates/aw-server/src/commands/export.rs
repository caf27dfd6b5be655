//! Export command for dumping buckets as JSON.

use std::io::Write;

use anyhow::Result;
use clap::Args;

use crate::{ActivityApi, ServerApi};

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Export only this bucket.
    pub bucket_id: Option<String>,
}

pub fn run<W: Write>(writer: &mut W, api: &ServerApi, args: &ExportArgs) -> Result<()> {
    let export = match &args.bucket_id {
        Some(bucket_id) => api.export_bucket(bucket_id)?,
        None => api.export_all()?,
    };
    writeln!(writer, "{}", serde_json::to_string_pretty(&export)?)?;
    Ok(())
}
