//! Network service lifecycle.
//!
//! `NetworkService` owns the HTTP listener. Transitions run under one lock:
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopped
//!            Starting -> Failed  -> Stopped
//! ```
//!
//! The bind happens on the runtime, not on the caller's thread, so a bind
//! failure is reported through the [`StartError`] slot of that start.

mod listener;
mod start_error;

pub use start_error::StartError;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::ServiceConfig;
use crate::domain::ServiceState;
use crate::error::{Error, PortConfigError, Result};

use listener::{ClosedSignal, TrackedListener};

/// How long the availability probe waits for a connection.
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

struct Lifecycle {
    config: ServiceConfig,
    state: ServiceState,
    /// Identifies the current start; stale serve tasks compare against it.
    generation: u64,
    shutdown: Option<oneshot::Sender<()>>,
    /// Fires once the listener of the current start is closed.
    closed: Option<ClosedSignal>,
    task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    start_error: StartError,
}

/// Start/stop-able HTTP listener serving a fixed router.
pub struct NetworkService {
    runtime: Handle,
    router: Router,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl NetworkService {
    /// Create a stopped service. Serving tasks are spawned on `runtime`.
    pub fn new(config: ServiceConfig, router: Router, runtime: Handle) -> Self {
        Self {
            runtime,
            router,
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                config,
                state: ServiceState::Stopped,
                generation: 0,
                shutdown: None,
                closed: None,
                task: None,
                local_addr: None,
                start_error: StartError::new(),
            })),
        }
    }

    /// Set the port for the next start. A running listener is unaffected.
    pub fn set_port(&self, port: impl Into<String>) {
        let port = port.into();
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state.is_active() {
            debug!(port = %port, "port change deferred until the next start");
        }
        lifecycle.config.port = port;
    }

    /// Port the next start will use.
    pub fn port(&self) -> String {
        self.lifecycle.lock().config.port.clone()
    }

    pub fn state(&self) -> ServiceState {
        self.lifecycle.lock().state
    }

    /// Whether a listener is running or being bound.
    pub fn is_running(&self) -> bool {
        self.state().is_active()
    }

    /// Address the running listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.lock().local_addr
    }

    /// Check that the configured port is an integer in 0..=65535 and that no
    /// listener answers on it. Does not change any state.
    pub async fn is_valid(&self) -> Result<()> {
        let config = self.lifecycle.lock().config.clone();
        let port = parse_port(&config.port)?;
        if port != 0 && is_port_in_use(&config.host, port).await {
            return Err(PortConfigError::InUse(port).into());
        }
        Ok(())
    }

    /// Start serving without waiting for the bind.
    ///
    /// No-op if the service is already running or starting. A bind failure
    /// is pushed to the slot returned by [`get_start_error`](Self::get_start_error)
    /// and the service falls back to `Stopped`.
    pub fn start_async(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state.is_active() {
            debug!(state = %lifecycle.state, "start ignored, service already running");
            return;
        }

        lifecycle.generation += 1;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (open, closed) = ClosedSignal::channel();
        let start_error = StartError::new();
        lifecycle.start_error = start_error.clone();
        lifecycle.shutdown = Some(shutdown_tx);
        lifecycle.closed = Some(closed);
        lifecycle.local_addr = None;
        lifecycle.state = ServiceState::Starting;

        let run = ServeRun {
            lifecycle: Arc::clone(&self.lifecycle),
            generation: lifecycle.generation,
            addr: lifecycle.config.address(),
            start_error,
            open,
        };
        lifecycle.task = Some(
            self.runtime
                .spawn(run.serve(self.router.clone(), shutdown_rx)),
        );
    }

    /// Stop serving. No-op (and `Ok`) if the service is not running.
    ///
    /// Returns once the listening socket is closed, so the port can be
    /// probed or bound again right away. Requests already being handled run
    /// to completion in the background.
    pub async fn stop(&self) -> Result<()> {
        let (generation, closed, aborted) = {
            let mut lifecycle = self.lifecycle.lock();
            if !lifecycle.state.is_active() {
                return Ok(());
            }

            info!("Stopping HTTP service...");
            // A concurrent stop has already taken the sender; it only waits.
            let undelivered = lifecycle
                .shutdown
                .take()
                .is_some_and(|tx| tx.send(()).is_err());
            let aborted = undelivered
                && match &lifecycle.task {
                    Some(task) if !task.is_finished() => {
                        task.abort();
                        true
                    }
                    _ => false,
                };
            (lifecycle.generation, lifecycle.closed.clone(), aborted)
        };

        if let Some(closed) = closed {
            closed.wait().await;
        }

        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.generation == generation {
                lifecycle.state = ServiceState::Stopped;
                lifecycle.closed = None;
                lifecycle.local_addr = None;
            }
        }

        if aborted {
            return Err(Error::ListenerShutdown(
                "serving task did not accept the shutdown signal and was aborted".to_string(),
            ));
        }
        Ok(())
    }

    /// Error slot of the most recent start.
    pub fn get_start_error(&self) -> StartError {
        self.lifecycle.lock().start_error.clone()
    }

    /// Wait for the most recent serving task to finish, including requests
    /// that were in flight when it stopped.
    ///
    /// Returns immediately if no task was ever started.
    pub async fn wait_stopped(&self) {
        let task = self.lifecycle.lock().task.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for NetworkService {
    fn drop(&mut self) {
        if let Some(tx) = self.lifecycle.lock().shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// One bind-and-serve attempt.
struct ServeRun {
    lifecycle: Arc<Mutex<Lifecycle>>,
    generation: u64,
    addr: String,
    start_error: StartError,
    /// Moved into the listener; dropped with it, or with `self` if the bind
    /// never happens.
    open: watch::Sender<()>,
}

impl ServeRun {
    async fn serve(self, router: Router, shutdown: oneshot::Receiver<()>) {
        let listener = match TcpListener::bind(&self.addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.fail(Error::ListenerBind {
                    addr: self.addr.clone(),
                    source,
                });
                return;
            }
        };

        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.generation != self.generation
                || lifecycle.state != ServiceState::Starting
                || lifecycle.shutdown.is_none()
            {
                // Stopped while binding.
                return;
            }
            lifecycle.state = ServiceState::Running;
            lifecycle.local_addr = listener.local_addr().ok();
        }
        info!(addr = %self.addr, "HTTP service started on http://{}", self.addr);

        let Self {
            lifecycle,
            generation,
            open,
            ..
        } = self;
        let result = axum::serve(TrackedListener::new(listener, open), router)
            .with_graceful_shutdown(async {
                let _ = shutdown.await;
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "HTTP service terminated");
        }

        let mut lifecycle = lifecycle.lock();
        if lifecycle.generation == generation && lifecycle.state.is_active() {
            lifecycle.state = ServiceState::Stopped;
            lifecycle.shutdown = None;
            lifecycle.closed = None;
            lifecycle.local_addr = None;
        }
    }

    fn fail(&self, err: Error) {
        error!(error = %err, "HTTP service failed to start");
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation != self.generation {
            return;
        }
        lifecycle.state = ServiceState::Failed;
        self.start_error.fill(err);
        lifecycle.shutdown = None;
        lifecycle.closed = None;
        lifecycle.state = ServiceState::Stopped;
    }
}

/// Parse a port string, distinguishing non-integers from out-of-range values.
pub fn parse_port(port: &str) -> std::result::Result<u16, PortConfigError> {
    let value: i64 = port
        .trim()
        .parse()
        .map_err(|_| PortConfigError::NotInteger(port.to_string()))?;
    u16::try_from(value).map_err(|_| PortConfigError::OutOfRange(value))
}

/// Connect-and-close probe: a successful connection means the port is taken.
async fn is_port_in_use(host: &str, port: u16) -> bool {
    let Ok(addrs) = tokio::net::lookup_host((host, port)).await else {
        return false;
    };
    for addr in addrs {
        if let Ok(Ok(_)) = tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await {
            return true;
        }
    }
    false
}
