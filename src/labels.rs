//! Label file parsing.
//!
//! Each labeled user carries a `labels.txt` next to their `Trajectory/`
//! directory: a header line, then one `start<TAB>end<TAB>mode` record per
//! line with timestamps in `2008/10/23 02:53:04` form. The index is the only
//! matching key the pipeline has: exact start/end equality, no tolerance.
//!
//! A label file that exists but fails to parse is a loud failure, not an
//! empty index. The pipeline surfaces the error in its summary and processes
//! that user against [`LabelIndex::empty`] (so every trajectory is rejected
//! downstream rather than silently mislabeled).

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use std::path::Path;

use crate::models::LabelRecord;

/// Timestamp pattern used inside label files (`2008/10/23 02:53:04`).
pub const LABEL_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Ordered collection of one user's label records.
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    records: Vec<LabelRecord>,
}

impl LabelIndex {
    /// An index with no records. Used for unlabeled users; every trajectory
    /// matched against it is rejected.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a label file. The first line is a header and is always skipped.
    /// Any malformed data line fails the whole file.
    pub fn parse(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read label file: {}", path.display()))?;

        let mut records = Vec::new();
        // Line 1 is the header; data lines are numbered from 2 for messages.
        for (idx, line) in content.lines().enumerate().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record = parse_label_line(line)
                .with_context(|| format!("{}:{}", path.display(), idx + 1))?;
            records.push(record);
        }

        Ok(Self { records })
    }

    /// First record whose bounds equal `(start, end)` exactly. When several
    /// records share identical bounds the earliest one in file order wins.
    pub fn find(&self, start: NaiveDateTime, end: NaiveDateTime) -> Option<&LabelRecord> {
        self.records
            .iter()
            .find(|r| r.start == start && r.end == end)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn parse_label_line(line: &str) -> Result<LabelRecord> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 3 {
        bail!(
            "expected 3 tab-separated fields (start, end, mode), got {}",
            fields.len()
        );
    }

    let start = NaiveDateTime::parse_from_str(fields[0].trim(), LABEL_TIME_FORMAT)
        .with_context(|| format!("bad start timestamp '{}'", fields[0]))?;
    let end = NaiveDateTime::parse_from_str(fields[1].trim(), LABEL_TIME_FORMAT)
        .with_context(|| format!("bad end timestamp '{}'", fields[1]))?;

    Ok(LabelRecord {
        start,
        end,
        mode: fields[2].trim().to_string(),
    })
}

/// Parse a flat manifest of already-labeled user ids, one per line. Used by
/// the bulk `mark-labeled` pass after initial user population.
pub fn parse_labeled_ids(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labeled-ids manifest: {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
