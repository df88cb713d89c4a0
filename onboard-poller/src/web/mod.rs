//! HTTP status surface for a running engine.
//!
//! Exposes the engine's state and cached documents as JSON, so the poller
//! can be inspected with a browser or `curl` while on board.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
