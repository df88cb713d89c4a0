//! Shapes that portal data is translated into.

mod scheduled;

pub use scheduled::ScheduledEvent;
