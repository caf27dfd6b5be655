//! Heartbeat merging.
//!
//! Watchers that track a state (active window, AFK status, current file)
//! send the same payload repeatedly as zero-duration heartbeats. When a
//! heartbeat carries the same `data` as the bucket's last event and arrives
//! within `pulsetime` of it, the last event is stretched to cover it instead
//! of storing a new event.
//!
//! The gap is measured between the two intervals and clamped at zero, so a
//! heartbeat that lands inside the last event's span always merges, and a
//! heartbeat that arrives out of order (earlier than the last event) is
//! measured from its own end to the last event's start.

use std::fmt;

use chrono::Duration;

use crate::event::{Event, duration_to_seconds, seconds_to_duration};
use crate::types::ValidationError;

/// Largest gap allowed between a heartbeat and the last event for them to merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pulsetime(Duration);

impl Pulsetime {
    /// Creates a pulsetime from float seconds.
    ///
    /// Returns an error if the value is negative, NaN or infinite.
    pub fn from_secs_f64(seconds: f64) -> Result<Self, ValidationError> {
        seconds_to_duration("pulsetime", seconds).map(Self)
    }

    /// Returns the pulsetime as a duration.
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        self.0
    }
}

impl TryFrom<f64> for Pulsetime {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_secs_f64(value)
    }
}

impl fmt::Display for Pulsetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", duration_to_seconds(self.0))
    }
}

/// Tries to merge `heartbeat` into `last`.
///
/// Returns the merged event (keeping `last`'s id and data) when both carry
/// identical data and the gap between them is at most `pulsetime`. The merged
/// event spans from the earlier start to the later end of the two, so a
/// forward heartbeat keeps `last.timestamp` and extends the duration up to the
/// heartbeat. Returns `None` when the heartbeat should be stored as a new event.
pub fn heartbeat_merge(last: &Event, heartbeat: &Event, pulsetime: Pulsetime) -> Option<Event> {
    if last.data != heartbeat.data {
        tracing::trace!("heartbeat data differs from last event");
        return None;
    }

    let gap = interval_gap(last, heartbeat);
    if gap > pulsetime.as_duration() {
        tracing::trace!(
            gap_ms = gap.num_milliseconds(),
            %pulsetime,
            "heartbeat outside pulsetime window"
        );
        return None;
    }

    let start = last.timestamp.min(heartbeat.timestamp);
    let end = last.end().max(heartbeat.end());
    Some(Event {
        id: last.id,
        timestamp: start,
        duration: end - start,
        data: last.data.clone(),
    })
}

/// Time between two events' spans, zero when they touch or overlap.
fn interval_gap(a: &Event, b: &Event) -> Duration {
    let b_after_a = b.timestamp - a.end();
    let b_before_a = a.timestamp - b.end();
    b_after_a.max(b_before_a).max(Duration::zero())
}
