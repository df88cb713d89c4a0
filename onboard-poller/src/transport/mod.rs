//! HTTP transport for on-board portals.
//!
//! Every engine owns one [`Transport`]. It performs single request/response
//! cycles against the portal's base URL, tags each request with this crate's
//! user agent, and classifies failures into [`ConnectionError`].
//!
//! Portals typically live on the vehicle's Wi-Fi and answer within a few
//! hundred milliseconds or not at all, so the default request timeout is
//! short and failed requests are retried a couple of times in place.

mod client;
mod error;

pub use client::{DEFAULT_USER_AGENT, Transport, TransportConfig};
pub use error::ConnectionError;
