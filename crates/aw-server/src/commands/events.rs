//! Event commands: list, insert, count and delete.

use std::io::{Read, Write};

use anyhow::{Result, bail};
use clap::Args;

use crate::commands::util::{parse_range, plural, read_input};
use crate::{ActivityApi, ServerApi, decode_events};

#[derive(Debug, Args)]
pub struct ListEventsArgs {
    /// Bucket ID.
    pub bucket_id: String,
    /// Only events running at or after this time (RFC 3339 or "2 hours ago").
    #[arg(long)]
    pub start: Option<String>,
    /// Only events starting before this time.
    #[arg(long)]
    pub end: Option<String>,
    /// Maximum number of events. Negative means unlimited.
    #[arg(long, allow_negative_numbers = true)]
    pub limit: Option<i64>,
}

#[derive(Debug, Args)]
pub struct InsertArgs {
    /// Bucket ID.
    pub bucket_id: String,
    /// Event JSON. Read from stdin when omitted.
    #[arg(long)]
    pub data: Option<String>,
}

#[derive(Debug, Args)]
pub struct CountArgs {
    /// Bucket ID.
    pub bucket_id: String,
    /// Only events running at or after this time.
    #[arg(long)]
    pub start: Option<String>,
    /// Only events starting before this time.
    #[arg(long)]
    pub end: Option<String>,
}

#[derive(Debug, Args)]
pub struct DeleteEventArgs {
    /// Bucket ID.
    pub bucket_id: String,
    /// Event ID.
    pub event_id: i64,
}

pub fn list<W: Write>(writer: &mut W, api: &ServerApi, args: &ListEventsArgs) -> Result<()> {
    let (start, end) = parse_range(args.start.as_deref(), args.end.as_deref())?;
    let events = api.get_events(&args.bucket_id, start, end, args.limit)?;
    writeln!(writer, "{}", serde_json::to_string_pretty(&events)?)?;
    Ok(())
}

pub fn insert<R: Read, W: Write>(
    reader: R,
    writer: &mut W,
    api: &ServerApi,
    args: &InsertArgs,
) -> Result<()> {
    let input = read_input(args.data.as_deref(), reader)?;
    let events = decode_events(&input)?;
    let stored = api.create_events(&args.bucket_id, events)?;
    writeln!(
        writer,
        "Inserted {} into {}",
        plural(stored.len(), "event"),
        args.bucket_id
    )?;
    Ok(())
}

pub fn count<W: Write>(writer: &mut W, api: &ServerApi, args: &CountArgs) -> Result<()> {
    let (start, end) = parse_range(args.start.as_deref(), args.end.as_deref())?;
    let count = api.get_eventcount(&args.bucket_id, start, end)?;
    writeln!(writer, "{count}")?;
    Ok(())
}

pub fn delete<W: Write>(writer: &mut W, api: &ServerApi, args: &DeleteEventArgs) -> Result<()> {
    if !api.delete_event(&args.bucket_id, args.event_id)? {
        bail!(
            "event {} not found in bucket {}",
            args.event_id,
            args.bucket_id
        );
    }
    writeln!(
        writer,
        "Deleted event {} from {}",
        args.event_id, args.bucket_id
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use aw_datastore::{Datastore, MemoryStorage};
    use insta::assert_snapshot;

    use crate::{ApiSettings, CreateBucket};

    fn api_with_bucket() -> ServerApi {
        let api = ServerApi::new(Datastore::new(MemoryStorage::new()), ApiSettings::default());
        api.create_bucket("window", CreateBucket::new("currentwindow", "watcher", "host"))
            .unwrap();
        api
    }

    const EVENTS: &str = r#"[
        {"timestamp": "2025-01-01T09:00:00Z", "duration": 60, "data": {"app": "editor"}},
        {"timestamp": "2025-01-01T09:05:00Z", "duration": 30.5, "data": {"app": "browser"}},
        {"timestamp": "2025-01-01T09:10:00Z", "data": {"app": "terminal"}}
    ]"#;

    fn list_args(start: Option<&str>, end: Option<&str>, limit: Option<i64>) -> ListEventsArgs {
        ListEventsArgs {
            bucket_id: "window".to_string(),
            start: start.map(str::to_string),
            end: end.map(str::to_string),
            limit,
        }
    }

    #[test]
    fn insert_reads_stdin_and_list_prints_newest_first() {
        let api = api_with_bucket();
        let mut output = Vec::new();
        let args = InsertArgs {
            bucket_id: "window".to_string(),
            data: None,
        };
        insert(EVENTS.as_bytes(), &mut output, &api, &args).unwrap();

        let mut listing = Vec::new();
        list(&mut listing, &api, &list_args(None, None, Some(2))).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @"Inserted 3 events into window");
        let listing = String::from_utf8(listing).unwrap();
        assert_snapshot!(listing, @r#"
        [
          {
            "id": 3,
            "timestamp": "2025-01-01T09:10:00Z",
            "duration": 0.0,
            "data": {
              "app": "terminal"
            }
          },
          {
            "id": 2,
            "timestamp": "2025-01-01T09:05:00Z",
            "duration": 30.5,
            "data": {
              "app": "browser"
            }
          }
        ]
        "#);
    }

    #[test]
    fn count_respects_range() {
        let api = api_with_bucket();
        let args = InsertArgs {
            bucket_id: "window".to_string(),
            data: Some(EVENTS.to_string()),
        };
        insert(std::io::empty(), &mut Vec::new(), &api, &args).unwrap();

        let mut output = Vec::new();
        let count_args = CountArgs {
            bucket_id: "window".to_string(),
            start: Some("2025-01-01T09:00:30Z".to_string()),
            end: Some("2025-01-01T09:10:00Z".to_string()),
        };
        count(&mut output, &api, &count_args).unwrap();
        // The first event is still running at start; the last starts at end.
        assert_eq!(String::from_utf8(output).unwrap(), "2\n");
    }

    #[test]
    fn insert_rejects_negative_duration() {
        let api = api_with_bucket();
        let args = InsertArgs {
            bucket_id: "window".to_string(),
            data: Some(r#"{"timestamp": "2025-01-01T09:00:00Z", "duration": -5}"#.to_string()),
        };
        let err = insert(std::io::empty(), &mut Vec::new(), &api, &args).unwrap_err();
        assert!(err.to_string().contains("invalid payload"));
        assert_eq!(api.get_eventcount("window", None, None).unwrap(), 0);
    }

    #[test]
    fn delete_reports_missing_event() {
        let api = api_with_bucket();
        let args = InsertArgs {
            bucket_id: "window".to_string(),
            data: Some(EVENTS.to_string()),
        };
        insert(std::io::empty(), &mut Vec::new(), &api, &args).unwrap();

        let mut output = Vec::new();
        let delete_args = DeleteEventArgs {
            bucket_id: "window".to_string(),
            event_id: 1,
        };
        delete(&mut output, &api, &delete_args).unwrap();
        let err = delete(&mut output, &api, &delete_args).unwrap_err();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Deleted event 1 from window\n"
        );
        assert!(err.to_string().contains("event 1 not found in bucket window"));
    }

    #[test]
    fn list_missing_bucket_fails() {
        let api = api_with_bucket();
        let mut args = list_args(None, None, None);
        args.bucket_id = "missing".to_string();
        let err = list(&mut Vec::new(), &api, &args).unwrap_err();
        assert!(err.to_string().contains("no bucket named missing"));
    }
}
