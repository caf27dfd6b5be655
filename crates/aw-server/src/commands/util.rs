//! Shared utilities for CLI commands.

use std::io::Read;
use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use regex::Regex;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(second|minute|hour|day|week)s?\s+ago$").unwrap()
});

/// Conservative bounds for relative time parsing (~1000 years in seconds).
const MAX_RELATIVE_SECONDS: i64 = 1000 * 365 * 24 * 60 * 60;

/// Parse a datetime string as either RFC 3339 or relative time.
///
/// Supports:
/// - RFC 3339: "2026-01-15T10:30:00Z", "2026-01-15T12:30:00+02:00"
/// - Relative: "90 seconds ago", "2 hours ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s.trim()) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use RFC 3339 (e.g., 2026-01-15T10:30:00Z) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let seconds_per_unit = match &caps[2] {
        "second" => 1,
        "minute" => 60,
        "hour" => 60 * 60,
        "day" => 60 * 60 * 24,
        "week" => 60 * 60 * 24 * 7,
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > MAX_RELATIVE_SECONDS / seconds_per_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(Utc::now() - Duration::seconds(n * seconds_per_unit))
}

/// Parses optional `--start`/`--end` arguments.
pub fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
) -> anyhow::Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let start = start.map(parse_datetime).transpose().context("invalid --start")?;
    let end = end.map(parse_datetime).transpose().context("invalid --end")?;
    Ok((start, end))
}

/// Returns `data` if given, otherwise everything readable from `reader`.
pub fn read_input<R: Read>(data: Option<&str>, mut reader: R) -> anyhow::Result<String> {
    if let Some(data) = data {
        return Ok(data.to_string());
    }
    let mut input = String::new();
    reader
        .read_to_string(&mut input)
        .context("failed to read stdin")?;
    Ok(input)
}

/// Formats a timestamp for human-readable output.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// "1 event", "2 events".
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_with_offset() {
        let parsed = parse_datetime("2025-01-01T02:00:00+02:00").unwrap();
        assert_eq!(format_timestamp(parsed), "2025-01-01T00:00:00Z");
    }

    #[test]
    fn parses_relative_time() {
        let before = Utc::now();
        let parsed = parse_datetime("2 hours ago").unwrap();
        let after = Utc::now();
        assert!(parsed <= before - Duration::hours(2) + Duration::seconds(1));
        assert!(parsed >= before - Duration::hours(2) - Duration::seconds(1));
        assert!(parsed < after);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_datetime("yesterday-ish").is_err());
        assert!(parse_datetime("99999999999 weeks ago").is_err());
    }

    #[test]
    fn data_argument_wins_over_reader() {
        let input = read_input(Some("{}"), "ignored".as_bytes()).unwrap();
        assert_eq!(input, "{}");
        let input = read_input(None, "from stdin".as_bytes()).unwrap();
        assert_eq!(input, "from stdin");
    }

    #[test]
    fn plural_forms() {
        assert_eq!(plural(1, "event"), "1 event");
        assert_eq!(plural(0, "event"), "0 events");
    }
}
