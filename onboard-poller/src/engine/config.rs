//! Engine configuration.

use std::time::Duration;

use super::cadence::Cadence;

/// Configuration for a polling engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Target time between the starts of two refresh cycles.
    pub period: Duration,

    /// How many times per period the loop checks for a stop request
    /// while waiting for the next cycle.
    pub ticks_per_period: u32,

    /// How long `start()` waits for the first successful refresh.
    pub start_timeout: Duration,

    /// Consecutive failed cycles after which the engine reports itself as
    /// disconnected. `None` keeps it connected for the rest of the run.
    pub disconnect_after: Option<u32>,
}

impl EngineConfig {
    /// Set the refresh period.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Set the number of stop checks per period.
    pub fn with_ticks_per_period(mut self, ticks: u32) -> Self {
        self.ticks_per_period = ticks;
        self
    }

    /// Set the start timeout.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Report the engine as disconnected after `failures` consecutive failed cycles.
    pub fn with_disconnect_after(mut self, failures: u32) -> Self {
        self.disconnect_after = Some(failures);
        self
    }

    /// The refresh schedule described by this config.
    pub fn cadence(&self) -> Cadence {
        Cadence::new(self.period, self.ticks_per_period)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            ticks_per_period: 20,
            start_timeout: Duration::from_secs(15),
            disconnect_after: None,
        }
    }
}
