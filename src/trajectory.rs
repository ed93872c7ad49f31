//! Trajectory (`.plt`) file parsing.
//!
//! Every trajectory file carries a fixed 6-line header followed by one data
//! line per GPS fix: `lat,lon,_,altitude,_,date,time` (7 comma-separated
//! fields; fields 2 and 4 are unused in the source format). A malformed
//! interior line loses that one point; a malformed first or last data line
//! loses the whole file, because the activity span is computed from them.

use chrono::NaiveDateTime;
use std::path::Path;

use crate::error::SkipReason;
use crate::models::{RawPoint, Trajectory, STORE_TIME_FORMAT};

/// Number of fixed-format header lines at the top of every `.plt` file.
pub const HEADER_LINES: usize = 6;

const FIELD_COUNT: usize = 7;

/// Parse a single trajectory file into its surviving points and raw data-line
/// count. Errors here are per-file skip reasons, not run failures.
pub fn parse_plt(path: &Path) -> Result<Trajectory, SkipReason> {
    let content = std::fs::read_to_string(path)?;
    parse_plt_content(&content)
}

fn parse_plt_content(content: &str) -> Result<Trajectory, SkipReason> {
    let data_lines: Vec<&str> = content
        .lines()
        .skip(HEADER_LINES)
        .filter(|l| !l.trim().is_empty())
        .collect();
    let line_count = data_lines.len();

    let mut points = Vec::with_capacity(line_count);
    for (idx, line) in data_lines.iter().enumerate() {
        match parse_point_line(line) {
            Ok(point) => points.push(point),
            Err(reason) => {
                // The span depends on the boundary lines; losing either one
                // makes the file unmatchable.
                if idx == 0 || idx == line_count - 1 {
                    return Err(SkipReason::Format(format!(
                        "data line {} (file boundary): {}",
                        idx + 1,
                        reason
                    )));
                }
                // Interior point: drop it and keep going.
            }
        }
    }

    Ok(Trajectory { points, line_count })
}

fn parse_point_line(line: &str) -> Result<RawPoint, String> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(format!(
            "expected {} comma-separated fields, got {}",
            FIELD_COUNT,
            fields.len()
        ));
    }

    let latitude: f64 = fields[0]
        .trim()
        .parse()
        .map_err(|_| format!("bad latitude '{}'", fields[0]))?;
    let longitude: f64 = fields[1]
        .trim()
        .parse()
        .map_err(|_| format!("bad longitude '{}'", fields[1]))?;
    // Altitude arrives as a float string; the schema stores whole units.
    let altitude: f64 = fields[3]
        .trim()
        .parse()
        .map_err(|_| format!("bad altitude '{}'", fields[3]))?;

    let stamp = format!("{} {}", fields[5].trim(), fields[6].trim());
    let time = NaiveDateTime::parse_from_str(&stamp, STORE_TIME_FORMAT)
        .map_err(|_| format!("bad date/time '{}'", stamp))?;

    Ok(RawPoint {
        latitude,
        longitude,
        altitude: altitude as i64,
        time,
    })
}
