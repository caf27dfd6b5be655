//! Heartbeat command.

use std::io::{Read, Write};

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::commands::util::read_input;
use crate::{ActivityApi, ServerApi, decode_events};

#[derive(Debug, Args)]
pub struct HeartbeatArgs {
    /// Bucket ID.
    pub bucket_id: String,
    /// Largest gap in seconds for the heartbeat to merge into the last event.
    #[arg(long)]
    pub pulsetime: Option<f64>,
    /// Event JSON. Read from stdin when omitted.
    #[arg(long)]
    pub data: Option<String>,
}

pub fn run<R: Read, W: Write>(
    reader: R,
    writer: &mut W,
    api: &ServerApi,
    args: &HeartbeatArgs,
) -> Result<()> {
    let input = read_input(args.data.as_deref(), reader)?;
    let mut events = decode_events(&input)?;
    if events.len() != 1 {
        bail!("a heartbeat must be a single event, got {}", events.len());
    }
    let heartbeat = events.pop().context("missing heartbeat event")?;

    let event = api.heartbeat(&args.bucket_id, heartbeat, args.pulsetime)?;
    writeln!(writer, "{}", serde_json::to_string_pretty(&event)?)?;
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
        api.create_bucket("afk", CreateBucket::new("afkstatus", "watcher", "host"))
            .unwrap();
        api
    }

    fn args(timestamp: &str, status: &str) -> HeartbeatArgs {
        HeartbeatArgs {
            bucket_id: "afk".to_string(),
            pulsetime: Some(60.0),
            data: Some(format!(
                r#"{{"timestamp": "{timestamp}", "data": {{"status": "{status}"}}}}"#
            )),
        }
    }

    #[test]
    fn heartbeats_merge_and_split() {
        let api = api_with_bucket();
        let mut output = Vec::new();

        run(std::io::empty(), &mut Vec::new(), &api, &args("2025-01-01T10:00:00Z", "not-afk"))
            .unwrap();
        run(std::io::empty(), &mut output, &api, &args("2025-01-01T10:00:45Z", "not-afk"))
            .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r#"
        {
          "id": 1,
          "timestamp": "2025-01-01T10:00:00Z",
          "duration": 45.0,
          "data": {
            "status": "not-afk"
          }
        }
        "#);

        run(std::io::empty(), &mut Vec::new(), &api, &args("2025-01-01T10:01:00Z", "afk"))
            .unwrap();
        assert_eq!(api.get_eventcount("afk", None, None).unwrap(), 2);
    }

    #[test]
    fn heartbeat_without_pulsetime_fails() {
        let api = api_with_bucket();
        let mut heartbeat = args("2025-01-01T10:00:00Z", "afk");
        heartbeat.pulsetime = None;

        let err = run(std::io::empty(), &mut Vec::new(), &api, &heartbeat).unwrap_err();
        assert!(err.to_string().contains("missing required parameter: pulsetime"));
    }

    #[test]
    fn heartbeat_rejects_arrays() {
        let api = api_with_bucket();
        let mut heartbeat = args("2025-01-01T10:00:00Z", "afk");
        heartbeat.data = Some("[]".to_string());

        let err = run(std::io::empty(), &mut Vec::new(), &api, &heartbeat).unwrap_err();
        assert!(err.to_string().contains("single event"));
    }
}
