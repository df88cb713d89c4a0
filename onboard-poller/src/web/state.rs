//! Application state for the web layer.

use std::sync::Arc;

use crate::engine::PollingEngine;
use crate::sources::JsonGroups;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The engine whose cache is served
    pub engine: Arc<PollingEngine<JsonGroups>>,
}

impl AppState {
    pub fn new(engine: Arc<PollingEngine<JsonGroups>>) -> Self {
        Self { engine }
    }
}
