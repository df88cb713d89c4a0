//! Refresh scheduling.
//!
//! The loop aims to start a refresh once per period. Refreshes take a
//! variable amount of time, so after each one the loop waits only for what
//! is left of the period, measured from when the refresh started. The wait
//! is split into short ticks so a stop request is noticed within one tick
//! instead of once per period.

use std::time::{Duration, Instant};

/// A fixed refresh period divided into stop-check ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    period: Duration,
    ticks: u32,
}

impl Cadence {
    /// Create a cadence. `ticks` is clamped to at least one.
    pub fn new(period: Duration, ticks: u32) -> Self {
        Self {
            period,
            ticks: ticks.max(1),
        }
    }

    /// The refresh period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Length of one stop-check tick.
    pub fn tick(&self) -> Duration {
        self.period / self.ticks
    }

    /// When the cycle after one started at `cycle_start` is due.
    pub fn next_cycle(&self, cycle_start: Instant) -> Instant {
        cycle_start + self.period
    }

    /// Ticks left to wait after a refresh that took `elapsed`.
    ///
    /// Zero once the refresh has used up the whole period.
    pub fn ticks_remaining(&self, elapsed: Duration) -> u32 {
        let remaining = self.period.saturating_sub(elapsed);
        let tick = self.tick().as_nanos().max(1);
        remaining.as_nanos().div_ceil(tick) as u32
    }

    /// How long to sleep before checking for a stop request again, or
    /// `None` if the next cycle is due.
    ///
    /// Never longer than one tick; the last slice is shortened so the wait
    /// ends exactly at `deadline`.
    pub fn wait_slice(&self, now: Instant, deadline: Instant) -> Option<Duration> {
        deadline
            .checked_duration_since(now)
            .filter(|remaining| !remaining.is_zero())
            .map(|remaining| remaining.min(self.tick()))
    }
}
