//! Per-file failure taxonomy for the ingestion pipeline.
//!
//! Every trajectory file ends in exactly one of two terminal states:
//! committed, or skipped with a [`SkipReason`]. Skips are never fatal for the
//! run; the pipeline records them and reports a breakdown in its summary.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::matcher::MAX_TRACKPOINTS;

/// Why a trajectory file was skipped instead of committed.
#[derive(Debug, Error)]
pub enum SkipReason {
    /// The file could not be read at all.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line the file cannot survive without (a label line, or the first or
    /// last trajectory data line) was malformed.
    #[error("format error: {0}")]
    Format(String),

    /// The file has no data lines after the header.
    #[error("empty trajectory")]
    Empty,

    /// The file exceeds the hard trackpoint cap. Whole-file discard, never
    /// truncation.
    #[error("{0} data lines exceeds the cap of {MAX_TRACKPOINTS}")]
    SizeCap(usize),

    /// No label record's bounds equal the trajectory span exactly.
    #[error("no label matches span {start} .. {end}")]
    NoLabel {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    /// A store write failed. If the activity row had already been inserted it
    /// was rolled back before this reason was recorded.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl SkipReason {
    /// Stable short tag used to group skips in the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::Io(_) => "io",
            SkipReason::Format(_) => "format",
            SkipReason::Empty => "empty",
            SkipReason::SizeCap(_) => "size cap",
            SkipReason::NoLabel { .. } => "no label",
            SkipReason::Persistence(_) => "persistence",
        }
    }
}
