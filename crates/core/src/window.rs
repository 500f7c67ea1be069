//! Query window planning.
//!
//! A requested interval is split into fixed-size windows separated by one
//! step, so the sample sitting exactly on a window boundary is only ever
//! requested once. Boundaries are aligned to whole minutes.

use chrono::{DateTime, Duration, Timelike, Utc};
use std::fmt;

/// A half-open interval `[start, end)` plus the sampling step to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
}

impl TimeWindow {
    /// Length of the window.
    pub fn span(&self) -> Duration {
        self.end - self.start
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{} step {}s",
            self.start.to_rfc3339(),
            self.end.to_rfc3339(),
            self.step.num_seconds()
        )
    }
}

/// Drop the seconds and sub-second part of a timestamp.
pub fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .unwrap_or(t)
}

/// Plan the windows covering `[begin, end)`.
///
/// Every window spans exactly `chunk_size`, except the final one when
/// `allow_incomplete` is set, which is clipped to `end`. Without
/// `allow_incomplete` a trailing partial period is never emitted.
/// `max_windows <= 0` means unbounded. Zero or negative sizes yield nothing.
pub fn plan_windows(
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk_size: Duration,
    step_size: Duration,
    max_windows: i64,
    allow_incomplete: bool,
) -> Vec<TimeWindow> {
    let mut windows = Vec::new();
    if begin >= end || chunk_size <= Duration::zero() || step_size <= Duration::zero() {
        return windows;
    }

    let end_bound = truncate_to_minute(end);
    let mut chunk_start = truncate_to_minute(begin);
    let mut chunk_end = truncate_to_minute(chunk_start + chunk_size);

    while max_windows <= 0 || (windows.len() as i64) < max_windows {
        if allow_incomplete {
            if chunk_end > end_bound {
                chunk_end = end_bound;
            }
            if chunk_end <= chunk_start {
                break;
            }
        } else if chunk_end > end_bound || chunk_end - chunk_start < chunk_size {
            break;
        }

        windows.push(TimeWindow {
            start: chunk_start,
            end: chunk_end,
            step: step_size,
        });

        if allow_incomplete && chunk_end == end_bound {
            break;
        }

        chunk_start = truncate_to_minute(chunk_end + step_size);
        chunk_end = truncate_to_minute(chunk_start + chunk_size);
    }

    windows
}
