//! Elapsed-time accounting
//!
//! `pause_intervals` is the only source of truth for pause accounting. The
//! displayed timer is recomputed from it on every read:
//!
//! `elapsed = (open pause start ?? now) - start - sum(closed pause durations)`
//!
//! so it freezes while paused and never counts paused wall-clock time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One pause/resume cycle; `resumed_at` is `None` while still paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseInterval {
    pub paused_at: DateTime<Utc>,
    pub resumed_at: Option<DateTime<Utc>>,
}

impl PauseInterval {
    pub fn open(paused_at: DateTime<Utc>) -> Self {
        Self {
            paused_at,
            resumed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.resumed_at.is_none()
    }

    /// Length of a closed interval; open intervals contribute nothing
    pub fn closed_duration(&self) -> Duration {
        match self.resumed_at {
            Some(resumed_at) => (resumed_at - self.paused_at).max(Duration::zero()),
            None => Duration::zero(),
        }
    }
}

/// Start of the open pause interval, if currently paused
pub fn open_pause(intervals: &[PauseInterval]) -> Option<DateTime<Utc>> {
    intervals
        .last()
        .filter(|i| i.is_open())
        .map(|i| i.paused_at)
}

/// Sum of all closed pause intervals
pub fn total_paused(intervals: &[PauseInterval]) -> Duration {
    intervals
        .iter()
        .fold(Duration::zero(), |acc, i| acc + i.closed_duration())
}

/// Active time between `start` and `now`
pub fn elapsed(start: DateTime<Utc>, intervals: &[PauseInterval], now: DateTime<Utc>) -> Duration {
    let reference = open_pause(intervals).unwrap_or(now);
    (reference - start - total_paused(intervals)).max(Duration::zero())
}

/// Active time in whole seconds
pub fn elapsed_secs(start: DateTime<Utc>, intervals: &[PauseInterval], now: DateTime<Utc>) -> i64 {
    elapsed(start, intervals, now).num_seconds()
}

/// Open a new pause interval at `at`; no-op if one is already open
pub fn pause(intervals: &mut Vec<PauseInterval>, at: DateTime<Utc>) -> bool {
    if open_pause(intervals).is_some() {
        return false;
    }
    intervals.push(PauseInterval::open(at));
    true
}

/// Close the open pause interval at `at`; no-op if none is open
pub fn resume(intervals: &mut [PauseInterval], at: DateTime<Utc>) -> bool {
    match intervals.last_mut() {
        Some(interval) if interval.is_open() => {
            interval.resumed_at = Some(at.max(interval.paused_at));
            true
        }
        _ => false,
    }
}

/// Format seconds as `MM:SS`, or `H:MM:SS` past the hour
pub fn format_clock(secs: i64) -> String {
    let secs = secs.max(0);
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
