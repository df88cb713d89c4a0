//! The polling engine and its refresh thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, info, trace, warn};

use crate::cache::CacheStore;
use crate::transport::{ConnectionError, Transport, TransportConfig};

use super::cadence::Cadence;
use super::config::EngineConfig;
use super::error::EngineError;
use super::source::DataSource;
use super::status::{EngineState, EngineStats, Status};

/// Outcome of the first refresh of a run, sent back to `start()`.
type Ready = Result<(), EngineError>;

/// Polls one portal from a background thread and caches what it returns.
///
/// All methods take `&self`, so an engine can be shared behind an `Arc`
/// between the thread that controls it and any number of readers.
/// Lifecycle calls (`start`, `stop`, `reset`) are serialized; reads
/// (`get`, `is_connected`, `stats`, ...) never wait for them.
pub struct PollingEngine<S: DataSource> {
    endpoint: String,
    transport_config: TransportConfig,
    config: EngineConfig,
    source: Arc<Mutex<S>>,
    cache: RwLock<CacheStore>,
    status: Arc<Status>,
    lifecycle: Mutex<Lifecycle>,
}

/// State only touched by lifecycle calls.
struct Lifecycle {
    transport: Transport,
    worker: Option<Worker>,
}

/// Handle to a running refresh thread.
struct Worker {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Ask the thread to exit and wait until it has.
    fn stop(self, endpoint: &str) {
        self.shutdown.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            error!(endpoint, "refresh thread panicked");
        }
    }
}

impl<S: DataSource> PollingEngine<S> {
    /// Create an idle engine for `endpoint` with default settings.
    pub fn new(endpoint: impl Into<String>, source: S) -> Result<Self, ConnectionError> {
        Self::with_config(
            TransportConfig::new(endpoint),
            EngineConfig::default(),
            source,
        )
    }

    /// Create an idle engine. The endpoint is `transport.base_url`.
    pub fn with_config(
        transport: TransportConfig,
        config: EngineConfig,
        source: S,
    ) -> Result<Self, ConnectionError> {
        let client = Transport::new(&transport)?;

        Ok(Self {
            endpoint: transport.base_url.clone(),
            transport_config: transport,
            config,
            source: Arc::new(Mutex::new(source)),
            cache: RwLock::new(CacheStore::new()),
            status: Arc::new(Status::default()),
            lifecycle: Mutex::new(Lifecycle {
                transport: client,
                worker: None,
            }),
        })
    }

    /// The portal this engine polls.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The engine's settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start polling and wait for the first refresh.
    ///
    /// Returns once the first refresh has succeeded. If it fails, or does
    /// not finish within the configured start timeout, the refresh thread is
    /// shut down, the engine enters [`EngineState::Failed`] and
    /// [`EngineError::InitialConnection`] is returned.
    ///
    /// Does nothing if the engine is already running.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut lifecycle = self.lock_lifecycle();

        if let Some(worker) = lifecycle.worker.take() {
            if !worker.is_finished() {
                lifecycle.worker = Some(worker);
                return Ok(());
            }
            // The thread died on its own
            worker.stop(&self.endpoint);
        }

        if self.status.state() == EngineState::Failed {
            return Err(EngineError::NeedsReset {
                endpoint: self.endpoint.clone(),
            });
        }

        info!(endpoint = %self.endpoint, "starting engine");
        self.status.begin_run();
        self.status.set_state(EngineState::Starting);

        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Ready>(1);
        let refresh_loop = RefreshLoop {
            endpoint: self.endpoint.clone(),
            source: Arc::clone(&self.source),
            transport: lifecycle.transport.clone(),
            cache: self.cache(),
            status: Arc::clone(&self.status),
            cadence: self.config.cadence(),
            disconnect_after: self.config.disconnect_after,
            shutdown: Arc::clone(&shutdown),
        };

        let spawned = thread::Builder::new()
            .name(format!("poll {}", self.endpoint))
            .spawn(move || refresh_loop.run(ready_tx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.status.end_run();
                self.status.set_state(EngineState::Failed);
                return Err(EngineError::Runtime(e));
            }
        };
        let worker = Worker { handle, shutdown };

        let ready = match ready_rx.recv_timeout(self.config.start_timeout) {
            Ok(ready) => ready,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    endpoint = %self.endpoint,
                    timeout_ms = self.config.start_timeout.as_millis() as u64,
                    "no refresh completed before the start timeout"
                );
                Err(self.initial_connection_error())
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.initial_connection_error()),
        };

        match ready {
            Ok(()) => {
                lifecycle.worker = Some(worker);
                self.status.set_state(EngineState::Running);
                info!(endpoint = %self.endpoint, "engine connected");
                Ok(())
            }
            Err(e) => {
                worker.stop(&self.endpoint);
                self.status.end_run();
                self.status.set_state(EngineState::Failed);
                Err(e)
            }
        }
    }

    /// Stop polling and wait for the refresh thread to exit.
    ///
    /// An in-flight request is allowed to finish or time out first. Does
    /// nothing if the engine is not running. Cached values stay readable.
    pub fn stop(&self) {
        let mut lifecycle = self.lock_lifecycle();
        self.stop_locked(&mut lifecycle);
    }

    /// Stop polling and discard everything tied to the current connection.
    ///
    /// The cache is replaced by an empty one, the HTTP session is rebuilt
    /// and the data source's own [`reset`](DataSource::reset) hook runs.
    /// Afterwards the engine is idle and can be started again, including
    /// after a failed start.
    pub fn reset(&self) {
        let mut lifecycle = self.lock_lifecycle();
        self.stop_locked(&mut lifecycle);

        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = CacheStore::new();

        match Transport::new(&self.transport_config) {
            Ok(transport) => lifecycle.transport = transport,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "keeping previous HTTP session");
            }
        }

        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        self.status.reset();
        debug!(endpoint = %self.endpoint, "engine reset");
    }

    /// Whether the refresh thread is running.
    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// Whether the current run has completed at least one refresh.
    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    /// The engine's lifecycle state.
    pub fn state(&self) -> EngineState {
        self.status.state()
    }

    /// Refresh counters for the current or last run.
    pub fn stats(&self) -> EngineStats {
        self.status.stats()
    }

    /// A read handle to the current cache.
    ///
    /// The handle keeps pointing at the old entries after a [`reset`](Self::reset).
    pub fn cache(&self) -> CacheStore {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the cached value for `key`, or `default`.
    pub fn get<T>(&self, key: &str, default: T) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key, default)
    }

    /// Store a value in the cache.
    pub fn put<T>(&self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, value);
    }

    fn stop_locked(&self, lifecycle: &mut Lifecycle) {
        let Some(worker) = lifecycle.worker.take() else {
            return;
        };

        info!(endpoint = %self.endpoint, "stopping engine");
        worker.stop(&self.endpoint);
        self.status.end_run();
        if self.status.state() != EngineState::Failed {
            self.status.set_state(EngineState::Idle);
        }
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn initial_connection_error(&self) -> EngineError {
        EngineError::InitialConnection {
            endpoint: self.endpoint.clone(),
            cause: None,
        }
    }
}

impl<S: DataSource> fmt::Debug for PollingEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingEngine")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl<S: DataSource> Drop for PollingEngine<S> {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = lifecycle.worker.take() {
            worker.stop(&self.endpoint);
            self.status.end_run();
        }
    }
}

/// Everything the refresh thread needs, moved onto it at start.
struct RefreshLoop<S> {
    endpoint: String,
    source: Arc<Mutex<S>>,
    transport: Transport,
    cache: CacheStore,
    status: Arc<Status>,
    cadence: Cadence,
    disconnect_after: Option<u32>,
    shutdown: Arc<AtomicBool>,
}

/// Clears the running flags when the refresh thread exits. A panicking
/// data source leaves the engine failed until it is reset.
struct RunGuard(Arc<Status>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.set_state(EngineState::Failed);
        }
        self.0.end_run();
    }
}

impl<S: DataSource> RefreshLoop<S> {
    /// Thread entry point.
    fn run(self, ready: SyncSender<Ready>) {
        let _guard = RunGuard(Arc::clone(&self.status));

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = ready.send(Err(EngineError::Runtime(e)));
                return;
            }
        };

        debug!(endpoint = %self.endpoint, "refresh thread started");
        runtime.block_on(self.poll(ready));
        debug!(endpoint = %self.endpoint, "refresh thread stopped");
    }

    async fn poll(&self, ready: SyncSender<Ready>) {
        let mut ready = Some(ready);
        let mut cycle: u64 = 0;
        let mut failing_since: Option<u64> = None;

        while !self.stopping() {
            cycle += 1;
            let started = Instant::now();

            match self.refresh().await {
                Ok(()) => {
                    self.status.record_success();
                    if let Some(ready) = ready.take() {
                        // start() may have given up already
                        let _ = ready.send(Ok(()));
                    }
                    if let Some(first) = failing_since.take() {
                        info!(
                            endpoint = %self.endpoint,
                            failed_cycles = cycle - first,
                            "portal reachable again"
                        );
                    }
                }
                Err(err) => {
                    if let Some(ready) = ready.take() {
                        warn!(endpoint = %self.endpoint, error = %err, "initial refresh failed");
                        let _ = ready.send(Err(EngineError::InitialConnection {
                            endpoint: self.endpoint.clone(),
                            cause: Some(err),
                        }));
                        return;
                    }

                    failing_since.get_or_insert(cycle);
                    let disconnected = self.status.record_failure(self.disconnect_after);
                    warn!(
                        endpoint = %self.endpoint,
                        cycle,
                        error = %err,
                        "refresh failed, serving cached data"
                    );
                    if disconnected {
                        warn!(endpoint = %self.endpoint, "engine disconnected");
                    }
                }
            }

            trace!(
                endpoint = %self.endpoint,
                cycle,
                ticks = self.cadence.ticks_remaining(started.elapsed()),
                "waiting for next cycle"
            );
            self.wait_for_next_cycle(started).await;
        }
    }

    // The source is shared only with the owning engine, which does not lock
    // it while this thread is alive.
    #[allow(clippy::await_holding_lock)]
    async fn refresh(&self) -> Result<(), ConnectionError> {
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        source.refresh(&self.transport, &self.cache).await
    }

    /// Sleep until one period after `started`, a tick at a time.
    async fn wait_for_next_cycle(&self, started: Instant) {
        let deadline = self.cadence.next_cycle(started);
        while !self.stopping() {
            match self.cadence.wait_slice(Instant::now(), deadline) {
                Some(slice) => tokio::time::sleep(slice).await,
                None => break,
            }
        }
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
