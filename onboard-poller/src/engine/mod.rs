//! Background polling engine.
//!
//! A [`PollingEngine`] owns the connection to one portal and keeps a
//! [`CacheStore`](crate::cache::CacheStore) of the latest values it returned.
//! After [`start`](PollingEngine::start) a dedicated thread calls the
//! engine's [`DataSource`] about once per second, while any number of
//! readers on other threads pull values out of the cache without waiting.
//!
//! Failure handling is deliberately asymmetric:
//!
//! - if the very first refresh fails, `start()` returns
//!   [`EngineError::InitialConnection`] so the caller is told at once that
//!   there is nothing to show (usually: not connected to the on-board Wi-Fi);
//! - once connected, failed refreshes are logged and skipped, and readers
//!   keep seeing the last good values until the portal answers again.

mod cadence;
mod config;
mod error;
mod poller;
mod source;
mod status;


pub use cadence::Cadence;
pub use config::EngineConfig;
pub use error::EngineError;
pub use poller::PollingEngine;
pub use source::DataSource;
pub use status::{EngineState, EngineStats};
