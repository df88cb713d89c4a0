//! Lock-free engine status shared between the refresh thread and readers.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Constructed or stopped; no refresh thread.
    Idle,
    /// `start()` is waiting for the first refresh.
    Starting,
    /// The refresh thread is running and has connected.
    Running,
    /// The first refresh of the last start failed; reset before restarting.
    Failed,
}

impl EngineState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => EngineState::Starting,
            2 => EngineState::Running,
            3 => EngineState::Failed,
            _ => EngineState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            EngineState::Idle => 0,
            EngineState::Starting => 1,
            EngineState::Running => 2,
            EngineState::Failed => 3,
        }
    }
}

/// Refresh counters for one run of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Refresh cycles completed, successful or not.
    pub cycles: u64,
    /// Cycles whose refresh failed.
    pub failures: u64,
    /// Failed cycles since the last success.
    pub consecutive_failures: u32,
    /// When the last successful refresh finished.
    pub last_success: Option<DateTime<Utc>>,
}

/// Atomic flags and counters.
///
/// The refresh thread is the only writer of the counters and of
/// `connected` while a run is active; the owning engine writes the rest.
#[derive(Debug, Default)]
pub(crate) struct Status {
    state: AtomicU8,
    running: AtomicBool,
    connected: AtomicBool,
    cycles: AtomicU64,
    failures: AtomicU64,
    consecutive_failures: AtomicU32,
    /// Unix millis of the last success, 0 if none.
    last_success_ms: AtomicI64,
}

impl Status {
    pub(crate) fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Mark a new run as started and clear the previous run's counters.
    pub(crate) fn begin_run(&self) {
        self.clear_counters();
        self.connected.store(false, Ordering::Release);
        self.running.store(true, Ordering::Release);
    }

    /// Return to the state of a freshly constructed engine.
    pub(crate) fn reset(&self) {
        self.end_run();
        self.clear_counters();
        self.set_state(EngineState::Idle);
    }

    fn clear_counters(&self) {
        self.cycles.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_success_ms.store(0, Ordering::Relaxed);
    }

    /// Mark the run as over. Connectivity never outlives a run.
    pub(crate) fn end_run(&self) {
        self.connected.store(false, Ordering::Release);
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn record_success(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_success_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.connected.store(true, Ordering::Release);
    }

    /// Record a failed cycle. Returns true if this failure took the engine
    /// from connected to disconnected.
    pub(crate) fn record_failure(&self, disconnect_after: Option<u32>) -> bool {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        let consecutive = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(limit) = disconnect_after
            && consecutive >= limit
        {
            return self.connected.swap(false, Ordering::AcqRel);
        }
        false
    }

    pub(crate) fn stats(&self) -> EngineStats {
        let last_success_ms = self.last_success_ms.load(Ordering::Relaxed);
        EngineStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_success: (last_success_ms != 0)
                .then(|| DateTime::from_timestamp_millis(last_success_ms))
                .flatten(),
        }
    }
}
