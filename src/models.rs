//! Core data models used throughout the Geolife loader.
//!
//! These types represent the label records and trajectory points that flow
//! through the ingestion pipeline before they land in SQLite. User rows have
//! no in-memory counterpart; they exist only as SQL.

use chrono::NaiveDateTime;

/// Altitude value at or below which a reading means "unknown", not a real
/// measurement. The raw dataset records -777 as the documented invalid
/// placeholder. Ingestion passes the value through untouched; only analytics
/// filter on it.
pub const ALTITUDE_SENTINEL: i64 = -777;

/// Timestamp format used for storage and display (`2008-10-23 02:53:04`).
pub const STORE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp the way it is stored in the database.
pub fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(STORE_TIME_FORMAT).to_string()
}

/// One human-annotated transportation-mode label: the activity that spans
/// exactly `[start, end]` was performed using `mode`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRecord {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub mode: String,
}

/// A parsed GPS fix from one `.plt` data line. Transient: it only becomes a
/// trackpoint row once its owning activity has been matched and committed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Truncated to whole units; may be the [`ALTITUDE_SENTINEL`].
    pub altitude: i64,
    pub time: NaiveDateTime,
}

/// A parsed trajectory file: the surviving points plus the raw data-line
/// count (before malformed interior lines were dropped). The size cap applies
/// to `line_count`, not to the number of surviving points.
#[derive(Debug, Clone)]
pub struct Trajectory {
    pub points: Vec<RawPoint>,
    pub line_count: usize,
}

impl Trajectory {
    /// Start and end timestamps of the trajectory, taken from the first and
    /// last parsed points. `None` when there are no points.
    pub fn span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => Some((first.time, last.time)),
            _ => None,
        }
    }

    /// Number of interior lines dropped as malformed.
    pub fn dropped_lines(&self) -> usize {
        self.line_count.saturating_sub(self.points.len())
    }
}

/// The accepted half of a match decision: the span and mode under which a
/// trajectory will be committed as an activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySpan {
    pub mode: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}
