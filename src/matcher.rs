//! Activity matching: decide whether a parsed trajectory becomes an activity.
//!
//! A trajectory is committed only when it fits under the hard size cap and
//! its start/end timestamps equal one label record's bounds exactly. Anything
//! else is a whole-file rejection; there is no truncation, no nearest-match
//! fallback, and no manual-review queue.

use crate::error::SkipReason;
use crate::labels::LabelIndex;
use crate::models::{ActivitySpan, Trajectory};

/// Hard cap on data lines per trajectory file. Files above it are discarded
/// wholesale, never partially ingested.
pub const MAX_TRACKPOINTS: usize = 2500;

/// Outcome of matching one trajectory against a user's label index.
#[derive(Debug)]
pub enum MatchOutcome {
    Accepted(ActivitySpan),
    Rejected(SkipReason),
}

pub fn match_activity(trajectory: &Trajectory, labels: &LabelIndex) -> MatchOutcome {
    if trajectory.line_count == 0 {
        return MatchOutcome::Rejected(SkipReason::Empty);
    }
    if trajectory.line_count > MAX_TRACKPOINTS {
        return MatchOutcome::Rejected(SkipReason::SizeCap(trajectory.line_count));
    }

    let Some((start, end)) = trajectory.span() else {
        // All lines within the cap parsed away. The parser treats boundary
        // failures as fatal, so this only happens for pathological inputs.
        return MatchOutcome::Rejected(SkipReason::Format(
            "no parseable points in trajectory".to_string(),
        ));
    };

    match labels.find(start, end) {
        Some(record) => MatchOutcome::Accepted(ActivitySpan {
            mode: record.mode.clone(),
            start,
            end,
        }),
        None => MatchOutcome::Rejected(SkipReason::NoLabel { start, end }),
    }
}
