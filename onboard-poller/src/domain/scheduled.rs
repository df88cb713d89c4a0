//! Planned values and what actually happened.

use std::fmt;

use chrono::{DateTime, TimeDelta, TimeZone};
use serde::{Deserialize, Serialize};

/// A value that was planned as `scheduled` and may have turned out
/// differently.
///
/// Portals report things like arrival times and platforms this way. When
/// the actual value is unknown it is assumed to match the plan.
///
/// # Examples
///
/// ```
/// use onboard_poller::domain::ScheduledEvent;
///
/// let platform = ScheduledEvent::new("7", Some("9"));
/// assert_eq!(*platform.actual(), "9");
/// assert!(platform.deviates());
///
/// let platform = ScheduledEvent::on_time("7");
/// assert_eq!(*platform.actual(), "7");
/// assert_eq!(platform.to_string(), "7");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduledEvent<T> {
    pub scheduled: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<T>,
}

impl<T> ScheduledEvent<T> {
    pub fn new(scheduled: T, actual: Option<T>) -> Self {
        Self { scheduled, actual }
    }

    /// An event with no reported deviation.
    pub fn on_time(scheduled: T) -> Self {
        Self {
            scheduled,
            actual: None,
        }
    }

    /// The actual value, or the scheduled one if nothing was reported.
    pub fn actual(&self) -> &T {
        self.actual.as_ref().unwrap_or(&self.scheduled)
    }

    /// Apply `f` to both values.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> ScheduledEvent<U> {
        ScheduledEvent {
            scheduled: f(self.scheduled),
            actual: self.actual.map(f),
        }
    }
}

impl<T: PartialEq> ScheduledEvent<T> {
    /// Whether a reported actual value differs from the plan.
    pub fn deviates(&self) -> bool {
        self.actual.as_ref().is_some_and(|a| *a != self.scheduled)
    }
}

impl<Tz: TimeZone> ScheduledEvent<DateTime<Tz>> {
    /// How late the event is. Negative when early, zero without an
    /// actual time.
    pub fn delay(&self) -> TimeDelta {
        match &self.actual {
            Some(actual) => actual.clone().signed_duration_since(self.scheduled.clone()),
            None => TimeDelta::zero(),
        }
    }

    /// Whether the event happens later than planned.
    pub fn is_delayed(&self) -> bool {
        self.delay() > TimeDelta::zero()
    }
}

impl<T: fmt::Display> fmt::Display for ScheduledEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.actual().fmt(f)
    }
}
