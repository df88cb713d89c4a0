//! Ready-made data sources.
//!
//! Most portals expose a handful of JSON documents (status, trip, ...) that
//! can simply be fetched and cached as-is. [`JsonGroups`] does that for any
//! list of `key=path` pairs; portals with more involved APIs implement
//! [`DataSource`](crate::engine::DataSource) themselves.

mod json_groups;

pub use json_groups::{DataGroup, InvalidGroup, JsonGroups};
