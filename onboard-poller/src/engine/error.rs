//! Engine lifecycle errors.

use crate::transport::ConnectionError;

/// Errors returned by [`PollingEngine::start`](super::PollingEngine::start).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine never completed a refresh, so there is no data to serve
    #[error("unable to connect to {endpoint}, are you connected to the on-board Wi-Fi?")]
    InitialConnection {
        endpoint: String,
        #[source]
        cause: Option<ConnectionError>,
    },

    /// A previous start failed; the engine must be reset first
    #[error("engine for {endpoint} failed and must be reset before it can start again")]
    NeedsReset { endpoint: String },

    /// The refresh thread or its runtime could not be created
    #[error("failed to launch refresh thread: {0}")]
    Runtime(#[from] std::io::Error),
}
