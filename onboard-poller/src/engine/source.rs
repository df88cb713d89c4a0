//! The refresh hook supplied by each portal integration.

use std::future::Future;

use crate::cache::CacheStore;
use crate::transport::{ConnectionError, Transport};

/// Something that knows which requests to make against a portal and where
/// to store the results.
///
/// The engine calls [`refresh`](DataSource::refresh) from its refresh thread,
/// never concurrently with itself. An implementation should only `put` values
/// it actually obtained: whatever it fails to fetch must leave the previous
/// entry in place, so readers keep the last good value.
///
/// ```
/// use onboard_poller::cache::CacheStore;
/// use onboard_poller::engine::DataSource;
/// use onboard_poller::transport::{ConnectionError, Transport};
///
/// struct Status;
///
/// impl DataSource for Status {
///     async fn refresh(
///         &mut self,
///         transport: &Transport,
///         cache: &CacheStore,
///     ) -> Result<(), ConnectionError> {
///         let status = transport.get_json("api1/rs/status", &[]).await?;
///         cache.put("status", status);
///         Ok(())
///     }
/// }
/// ```
pub trait DataSource: Send + 'static {
    /// Fetch one round of data and store it in `cache`.
    fn refresh(
        &mut self,
        transport: &Transport,
        cache: &CacheStore,
    ) -> impl Future<Output = Result<(), ConnectionError>>;

    /// Forget any per-connection state before the engine is reused.
    fn reset(&mut self) {}
}
