// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A small stopwatch used to time invocations, modules, and shards.
//!
//! We track both a wall-clock [`chrono::DateTime`] (for display/serialization) and a monotonic
//! [`Instant`] (for the actual elapsed-time computation), since the two clocks can drift and only
//! the monotonic one is safe to subtract.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Starts a new stopwatch.
pub fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// The running state of a stopwatch, started via [`stopwatch`].
#[derive(Clone, Debug)]
pub struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            start_time: Local::now(),
            instant: Instant::now(),
        }
    }

    /// Takes a snapshot of the elapsed time so far, without stopping the stopwatch.
    pub fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            elapsed: self.instant.elapsed(),
        }
    }
}

/// A point-in-time snapshot of a [`StopwatchStart`].
#[derive(Clone, Copy, Debug)]
pub struct StopwatchSnapshot {
    /// The time at which the stopwatch was started.
    pub start_time: DateTime<Local>,

    /// The amount of time elapsed since the stopwatch was started.
    pub elapsed: Duration,
}

/// Returns the larger of two durations, as used by the shard merger to report
/// `invocationEnded(max(elapsed))` across shards.
pub fn max_duration(a: Duration, b: Duration) -> Duration {
    if a >= b { a } else { b }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_elapsed_is_monotonic() {
        let start = stopwatch();
        let first = start.snapshot();
        std::thread::sleep(Duration::from_millis(10));
        let second = start.snapshot();
        assert!(second.elapsed >= first.elapsed);
    }

    #[test]
    fn max_duration_picks_larger() {
        assert_eq!(
            max_duration(Duration::from_secs(1), Duration::from_secs(2)),
            Duration::from_secs(2)
        );
        assert_eq!(
            max_duration(Duration::from_secs(5), Duration::from_secs(2)),
            Duration::from_secs(5)
        );
    }
}
