//! CLOCK_TAI to CLOCK_MONOTONIC offset sampling.
//!
//! perf records on CLOCK_MONOTONIC while the data-plane tools stamp packets
//! on CLOCK_TAI. The offset between the two converts one into the other; if
//! it moves during an iteration, that iteration's timestamps are suspect.

use std::path::PathBuf;

use tracing::warn;

use crate::error::{ExperimentError, Result};

const TIMER_LIST: &str = "/proc/timer_list";
const TAI_BASE_MARKER: &str = "ktime_get_clocktai";

/// Source of the TAI-monotonic offset in nanoseconds.
pub trait OffsetClock {
    fn tai_offset(&self) -> Result<i64>;
}

/// Reads the offset from the kernel's timer list.
#[derive(Debug, Clone)]
pub struct TimerListClock {
    path: PathBuf,
}

impl TimerListClock {
    pub fn new() -> Self {
        Self::with_path(TIMER_LIST)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for TimerListClock {
    fn default() -> Self {
        Self::new()
    }
}

impl OffsetClock for TimerListClock {
    fn tai_offset(&self) -> Result<i64> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| ExperimentError::io(format!("reading {}", self.path.display()), e))?;
        parse_timer_list(&text)
    }
}

/// Extract the TAI clock base offset.
///
/// The value is the second token of the line following the
/// `ktime_get_clocktai` base name, for example `  .offset:     37000000000 nsecs`.
pub fn parse_timer_list(text: &str) -> Result<i64> {
    let mut lines = text.lines();
    lines
        .by_ref()
        .find(|line| line.trim_end().ends_with(TAI_BASE_MARKER))
        .ok_or_else(|| ExperimentError::Clock(format!("no {TAI_BASE_MARKER} clock base")))?;

    let line = lines
        .next()
        .ok_or_else(|| ExperimentError::Clock("timer list ends after clock base".to_string()))?;
    let token = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| ExperimentError::Clock(format!("offset line too short: '{line}'")))?;
    token
        .parse()
        .map_err(|_| ExperimentError::Clock(format!("offset '{token}' is not an integer")))
}

/// Compare a fresh sample against the one taken at iteration start.
///
/// Returns `true` when the offset moved; that is logged and the iteration is
/// reported as suspect rather than aborted.
pub fn drifted(clock: &dyn OffsetClock, start_offset: i64) -> Result<bool> {
    let now = clock.tai_offset()?;
    if now != start_offset {
        warn!(
            start_offset,
            now, "offset between CLOCK_TAI and CLOCK_MONOTONIC changed; data might be invalid"
        );
        return Ok(true);
    }
    Ok(false)
}
