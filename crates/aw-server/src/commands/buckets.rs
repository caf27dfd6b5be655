//! Bucket management commands.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Map, Value};

use crate::commands::util::format_timestamp;
use crate::{ActivityApi, CreateBucket, ServerApi};

#[derive(Debug, Args)]
pub struct ListBucketsArgs {
    /// Print the full bucket listing as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CreateBucketArgs {
    /// Bucket ID (e.g. aw-watcher-window_myhost).
    pub bucket_id: String,
    /// Kind of events stored (e.g. currentwindow).
    #[arg(long = "type")]
    pub kind: String,
    /// Name of the watcher that owns the bucket.
    #[arg(long)]
    pub client: String,
    /// Host the watcher runs on. Defaults to this host.
    #[arg(long)]
    pub hostname: Option<String>,
    /// Human-readable name.
    #[arg(long)]
    pub name: Option<String>,
    /// Extra bucket attributes as a JSON object.
    #[arg(long)]
    pub data: Option<String>,
}

#[derive(Debug, Args)]
pub struct RenameBucketArgs {
    /// Bucket ID.
    pub bucket_id: String,
    /// New name. Omit to clear the name.
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, Args)]
pub struct DeleteBucketArgs {
    /// Bucket ID.
    pub bucket_id: String,
}

pub fn list<W: Write>(writer: &mut W, api: &ServerApi, args: &ListBucketsArgs) -> Result<()> {
    let buckets = api.get_buckets()?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&buckets)?)?;
        return Ok(());
    }

    if buckets.is_empty() {
        writeln!(writer, "No buckets.")?;
        return Ok(());
    }

    writeln!(writer, "Buckets:")?;
    for (id, bucket) in &buckets {
        let metadata = &bucket.metadata;
        let last_updated = bucket
            .last_updated
            .map_or_else(|| "never".to_string(), format_timestamp);
        write!(writer, "- {id}")?;
        if let Some(name) = &metadata.name {
            write!(writer, " ({name})")?;
        }
        writeln!(
            writer,
            ": {} from {} on {}, last updated {last_updated}",
            metadata.kind, metadata.client, metadata.hostname
        )?;
    }
    Ok(())
}

pub fn create<W: Write>(writer: &mut W, api: &ServerApi, args: &CreateBucketArgs) -> Result<()> {
    let hostname = args
        .hostname
        .clone()
        .unwrap_or_else(|| api.settings().hostname.clone());
    let mut bucket = CreateBucket::new(&args.kind, &args.client, hostname);
    bucket.name.clone_from(&args.name);
    if let Some(data) = &args.data {
        bucket.data = serde_json::from_str::<Map<String, Value>>(data)
            .context("--data must be a JSON object")?;
    }

    if api.create_bucket(&args.bucket_id, bucket)? {
        writeln!(writer, "Created bucket {}", args.bucket_id)?;
    } else {
        writeln!(writer, "Bucket {} already exists", args.bucket_id)?;
    }
    Ok(())
}

pub fn rename<W: Write>(writer: &mut W, api: &ServerApi, args: &RenameBucketArgs) -> Result<()> {
    api.update_bucket_name(&args.bucket_id, args.name.as_deref())?;
    match &args.name {
        Some(name) => writeln!(writer, "Renamed bucket {} to {name}", args.bucket_id)?,
        None => writeln!(writer, "Cleared name of bucket {}", args.bucket_id)?,
    }
    Ok(())
}

pub fn delete<W: Write>(writer: &mut W, api: &ServerApi, args: &DeleteBucketArgs) -> Result<()> {
    api.delete_bucket(&args.bucket_id)?;
    writeln!(writer, "Deleted bucket {}", args.bucket_id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use aw_core::Event;
    use aw_datastore::{Datastore, MemoryStorage};
    use chrono::{DateTime, Duration, Utc};
    use insta::assert_snapshot;

    use crate::ApiSettings;

    fn api() -> ServerApi {
        let settings = ApiSettings {
            hostname: "devbox".to_string(),
            ..ApiSettings::default()
        };
        ServerApi::new(Datastore::new(MemoryStorage::new()), settings)
    }

    fn create_args(bucket_id: &str) -> CreateBucketArgs {
        CreateBucketArgs {
            bucket_id: bucket_id.to_string(),
            kind: "currentwindow".to_string(),
            client: "aw-watcher-window".to_string(),
            hostname: None,
            name: None,
            data: None,
        }
    }

    #[test]
    fn list_buckets_outputs_one_line_per_bucket() {
        let api = api();
        let mut output = Vec::new();
        create(&mut output, &api, &create_args("window")).unwrap();
        create(&mut output, &api, &create_args("window")).unwrap();
        let mut afk = create_args("afk");
        afk.kind = "afkstatus".to_string();
        afk.client = "aw-watcher-afk".to_string();
        afk.hostname = Some("laptop".to_string());
        afk.name = Some("Away".to_string());
        create(&mut output, &api, &afk).unwrap();

        let start = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        api.create_events(
            "window",
            vec![Event::new(start, Duration::seconds(15), Map::new())],
        )
        .unwrap();

        list(&mut output, &api, &ListBucketsArgs { json: false }).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Created bucket window
        Bucket window already exists
        Created bucket afk
        Buckets:
        - afk (Away): afkstatus from aw-watcher-afk on laptop, last updated never
        - window: currentwindow from aw-watcher-window on devbox, last updated 2025-01-01T00:00:15Z
        ");
    }

    #[test]
    fn list_buckets_when_empty() {
        let mut output = Vec::new();
        list(&mut output, &api(), &ListBucketsArgs { json: false }).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "No buckets.\n");
    }

    #[test]
    fn create_rejects_non_object_data() {
        let mut args = create_args("window");
        args.data = Some("[1, 2]".to_string());
        let err = create(&mut Vec::new(), &api(), &args).unwrap_err();
        assert!(err.to_string().contains("--data must be a JSON object"));
    }

    #[test]
    fn rename_and_delete() {
        let api = api();
        let mut output = Vec::new();
        create(&mut output, &api, &create_args("window")).unwrap();
        rename(
            &mut output,
            &api,
            &RenameBucketArgs {
                bucket_id: "window".to_string(),
                name: Some("Windows".to_string()),
            },
        )
        .unwrap();
        assert_eq!(
            api.get_bucket_metadata("window").unwrap().name.as_deref(),
            Some("Windows")
        );
        delete(
            &mut output,
            &api,
            &DeleteBucketArgs {
                bucket_id: "window".to_string(),
            },
        )
        .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Created bucket window
        Renamed bucket window to Windows
        Deleted bucket window
        ");
        assert!(api.get_buckets().unwrap().is_empty());
    }
}
