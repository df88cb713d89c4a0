//! Background polling for on-board transport portals.
//!
//! Trains, buses and planes with passenger Wi-Fi usually run a small web
//! portal that reports speed, position, the trip and connections. Those
//! portals are slow, flaky and disappear whenever the vehicle loses its
//! uplink. A [`PollingEngine`](engine::PollingEngine) polls one of them about
//! once a second from a background thread and keeps the latest answers in a
//! cache that the rest of the program reads without waiting.

pub mod cache;
pub mod domain;
pub mod engine;
pub mod sources;
pub mod transport;
pub mod web;
