//! Timestamped activity events.

use std::ops::RangeInclusive;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::ValidationError;

/// Years an event may start and end in. Four-digit years keep stored
/// timestamps fixed-width, so they sort and parse as text.
const SUPPORTED_YEARS: RangeInclusive<i32> = 0..=9999;

/// A single timestamped, duration-bearing activity record.
///
/// Events are created by watchers without an `id`; the storage backend
/// assigns one on insert. The `data` payload is compared by exact
/// key/value match when deciding whether heartbeats merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Backend-assigned identifier. Absent until the event is stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// When the event started.
    pub timestamp: DateTime<Utc>,
    /// How long the event lasted, as float seconds on the wire.
    #[serde(default = "Duration::zero", with = "duration_seconds")]
    pub duration: Duration,
    /// Free-form payload (e.g. `{"app": "firefox", "title": "..."}`).
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Event {
    /// Creates an unstored event.
    pub const fn new(timestamp: DateTime<Utc>, duration: Duration, data: Map<String, Value>) -> Self {
        Self {
            id: None,
            timestamp,
            duration,
            data,
        }
    }

    /// Returns the instant the event ends (`timestamp + duration`).
    ///
    /// Saturates at the latest representable instant; [`Event::validate`]
    /// rejects such events before they are stored.
    pub fn end(&self) -> DateTime<Utc> {
        self.timestamp
            .checked_add_signed(self.duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Checks that the duration is non-negative and that the event starts
    /// and ends within the years 0000 to 9999.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.duration < Duration::zero() {
            return Err(ValidationError::InvalidSeconds {
                field: "duration",
                value: duration_to_seconds(self.duration),
            });
        }
        if !SUPPORTED_YEARS.contains(&self.timestamp.year()) {
            return Err(ValidationError::YearOutOfRange { field: "timestamp" });
        }
        match self.timestamp.checked_add_signed(self.duration) {
            Some(end) if SUPPORTED_YEARS.contains(&end.year()) => Ok(()),
            _ => Err(ValidationError::YearOutOfRange { field: "event end" }),
        }
    }

    /// Returns whether the event falls within `[start, end)`.
    ///
    /// An event matches when it starts before `end` and either starts at or
    /// after `start` or is still running at `start`. Missing bounds are open.
    pub fn in_range(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
        if let Some(end) = end {
            if self.timestamp >= end {
                return false;
            }
        }
        match start {
            Some(start) => self.timestamp >= start || self.end() > start,
            None => true,
        }
    }

    /// Returns a copy with the `id` removed, for export.
    #[must_use]
    pub fn without_id(&self) -> Self {
        Self {
            id: None,
            ..self.clone()
        }
    }
}

/// Converts float seconds into a validated, non-negative duration.
pub fn seconds_to_duration(field: &'static str, seconds: f64) -> Result<Duration, ValidationError> {
    let std_duration = std::time::Duration::try_from_secs_f64(seconds)
        .map_err(|_| ValidationError::InvalidSeconds { field, value: seconds })?;
    Duration::from_std(std_duration).map_err(|_| ValidationError::OutOfRange { field })
}

/// Converts a duration into float seconds.
#[expect(
    clippy::cast_precision_loss,
    reason = "durations are exchanged as float seconds"
)]
pub fn duration_to_seconds(duration: Duration) -> f64 {
    duration.num_seconds() as f64 + f64::from(duration.subsec_nanos()) / 1e9
}

/// Serde adapter encoding [`Duration`] as float seconds.
mod duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(super::duration_to_seconds(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        super::seconds_to_duration("duration", seconds).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn label(value: &str) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("label".to_string(), json!(value));
        data
    }

    #[test]
    fn event_serializes_duration_as_seconds() {
        let event = Event::new(
            ts("2025-01-01T00:00:00Z"),
            Duration::milliseconds(1500),
            label("x"),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "timestamp": "2025-01-01T00:00:00Z",
                "duration": 1.5,
                "data": {"label": "x"}
            })
        );
    }

    #[test]
    fn event_deserializes_with_defaults() {
        let event: Event = serde_json::from_str(r#"{"timestamp": "2025-01-01T02:00:00+02:00"}"#).unwrap();
        assert_eq!(event.id, None);
        assert_eq!(event.timestamp, ts("2025-01-01T00:00:00Z"));
        assert_eq!(event.duration, Duration::zero());
        assert!(event.data.is_empty());
    }

    #[test]
    fn event_rejects_negative_duration() {
        let result: Result<Event, _> =
            serde_json::from_str(r#"{"timestamp": "2025-01-01T00:00:00Z", "duration": -1.0}"#);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("duration must be a finite"));
    }

    #[test]
    fn event_rejects_missing_timestamp() {
        let result: Result<Event, _> = serde_json::from_str(r#"{"duration": 1.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn event_rejects_non_object_data() {
        let result: Result<Event, _> =
            serde_json::from_str(r#"{"timestamp": "2025-01-01T00:00:00Z", "data": [1, 2]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn event_keeps_id_when_present() {
        let event: Event =
            serde_json::from_str(r#"{"id": 7, "timestamp": "2025-01-01T00:00:00Z", "duration": 2}"#)
                .unwrap();
        assert_eq!(event.id, Some(7));
        assert_eq!(event.duration, Duration::seconds(2));
        let json = serde_json::to_value(event.without_id()).unwrap();
        assert!(json.get("id").is_none());
    }

    #[test]
    fn end_adds_duration() {
        let event = Event::new(ts("2025-01-01T00:00:00Z"), Duration::seconds(90), Map::new());
        assert_eq!(event.end(), ts("2025-01-01T00:01:30Z"));
    }

    #[test]
    fn end_saturates_instead_of_overflowing() {
        let event = Event::new(
            ts("2025-01-01T00:00:00Z"),
            Duration::seconds(10_000_000_000_000),
            Map::new(),
        );
        assert_eq!(event.end(), DateTime::<Utc>::MAX_UTC);
        assert!(event.in_range(Some(ts("2025-06-01T00:00:00Z")), None));
    }

    #[test]
    fn validate_accepts_events_up_to_year_9999() {
        let event = Event::new(ts("9999-12-31T00:00:00Z"), Duration::hours(23), Map::new());
        assert_eq!(event.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_end_past_year_9999() {
        let event = Event::new(ts("9999-12-31T00:00:00Z"), Duration::days(2), Map::new());
        assert_eq!(
            event.validate(),
            Err(ValidationError::YearOutOfRange { field: "event end" })
        );
    }

    #[test]
    fn validate_rejects_overflowing_duration() {
        let event: Event =
            serde_json::from_str(r#"{"timestamp": "2025-01-01T00:00:00Z", "duration": 1e13}"#)
                .unwrap();
        let err = event.validate().unwrap_err();
        assert_eq!(err.to_string(), "event end must fall within the years 0000 to 9999");
    }

    #[test]
    fn validate_rejects_negative_duration_built_in_code() {
        let event = Event::new(ts("2025-01-01T00:00:00Z"), Duration::seconds(-1), Map::new());
        assert!(matches!(
            event.validate(),
            Err(ValidationError::InvalidSeconds { field: "duration", .. })
        ));
    }

    #[test]
    fn in_range_includes_start_and_excludes_end() {
        let start = ts("2025-01-01T00:00:00Z");
        let end = ts("2025-01-01T01:00:00Z");
        let at_start = Event::new(start, Duration::zero(), Map::new());
        let at_end = Event::new(end, Duration::zero(), Map::new());
        assert!(at_start.in_range(Some(start), Some(end)));
        assert!(!at_end.in_range(Some(start), Some(end)));
    }

    #[test]
    fn in_range_includes_events_running_at_start() {
        let start = ts("2025-01-01T00:00:00Z");
        let running = Event::new(ts("2024-12-31T23:59:00Z"), Duration::seconds(120), Map::new());
        let finished = Event::new(ts("2024-12-31T23:58:00Z"), Duration::seconds(60), Map::new());
        assert!(running.in_range(Some(start), None));
        assert!(!finished.in_range(Some(start), None));
        assert!(finished.in_range(None, None));
    }

    #[test]
    fn seconds_to_duration_rejects_invalid_values() {
        assert!(seconds_to_duration("duration", f64::NAN).is_err());
        assert!(seconds_to_duration("duration", f64::INFINITY).is_err());
        assert!(seconds_to_duration("duration", -0.5).is_err());
        assert_eq!(
            seconds_to_duration("duration", 0.25).unwrap(),
            Duration::milliseconds(250)
        );
    }
}
