//! Data transfer objects for web responses.

use serde::Serialize;

use crate::engine::{EngineState, EngineStats};

/// Snapshot of an engine, returned by `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Portal base URL
    pub endpoint: String,

    pub state: EngineState,

    /// Whether the refresh thread is running
    pub running: bool,

    /// Whether the current run has completed a refresh
    pub connected: bool,

    pub stats: EngineStats,

    /// Keys currently held in the cache
    pub keys: Vec<String>,
}

/// Error body for failed requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
