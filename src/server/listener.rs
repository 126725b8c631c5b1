use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::http::connection::{Connection, ReadLimits};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::pool::balancer::RoundRobin;
use crate::server::context::{Context, System};
use crate::server::dispatcher::{Dispatcher, Event};
use crate::server::router::{Handler, RouteTable};

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// One listening port with its own routing table.
///
/// Lifecycle: created → started → shut down → (started again) → disposed.
/// Cloning yields another handle onto the same server.
#[derive(Clone)]
pub struct Server {
    shared: Arc<Shared>,
}

struct Shared {
    port: u16,
    config: ServerConfig,
    dispatcher: Dispatcher,
    balancer: OnceLock<RoundRobin>,
    /// Listener bound at creation, adopted by the first start
    reserved: StdMutex<Option<std::net::TcpListener>>,
    routes: RwLock<RouteTable>,
    requests: AtomicU64,
    running: AtomicBool,
    disposed: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

enum Lifecycle {
    Idle,
    Running {
        stop: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
    Disposed,
}

impl Server {
    /// Creates a server for `port` with default settings.
    ///
    /// The port is bound right away and held until the first start, so a
    /// port that is already bound fails here. Port 0 resolves to an
    /// OS-assigned port.
    pub fn create(port: u16, dispatcher: Dispatcher) -> Result<Self> {
        Self::create_with(port, dispatcher, ServerConfig::default())
    }

    pub fn create_with(port: u16, dispatcher: Dispatcher, config: ServerConfig) -> Result<Self> {
        let reserved = std::net::TcpListener::bind((config.host.as_str(), port)).map_err(|e| bind_error(port, e))?;
        let port = reserved
            .local_addr()
            .map_err(|source| Error::Bind { port, source })?
            .port();
        debug!(port, host = %config.host, "Server created");

        Ok(Self {
            shared: Arc::new(Shared {
                port,
                routes: RwLock::new(RouteTable::with_capacity(config.route_capacity)),
                config,
                dispatcher,
                balancer: OnceLock::new(),
                reserved: StdMutex::new(Some(reserved)),
                requests: AtomicU64::new(0),
                running: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                lifecycle: Mutex::new(Lifecycle::Idle),
            }),
        })
    }

    /// Registers or replaces the handler for an exact resource path.
    pub fn add_route(&self, resource: &str, handler: Handler) -> Result<()> {
        let mut routes = self.shared.routes.write().unwrap_or_else(PoisonError::into_inner);
        if self.shared.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed(self.shared.port));
        }

        if routes.insert(resource, handler) {
            debug!(port = self.shared.port, resource, "Route replaced");
        } else {
            debug!(port = self.shared.port, resource, "Route added");
        }
        Ok(())
    }

    /// Takes over the listener bound at creation (or binds again after a
    /// shutdown) and spawns the accept loop. Requests with no matching
    /// route go to `fallback`.
    pub async fn start(&self, system: Arc<System>, fallback: Handler) -> Result<()> {
        let port = self.shared.port;
        let mut lifecycle = self.shared.lifecycle.lock().await;

        match *lifecycle {
            Lifecycle::Running { .. } => return Err(Error::AlreadyStarted(port)),
            Lifecycle::Disposed => return Err(Error::Disposed(port)),
            Lifecycle::Idle => {}
        }

        let reserved = self.shared.reserved.lock().unwrap_or_else(PoisonError::into_inner).take();
        let listener = match reserved {
            Some(listener) => adopt(listener).map_err(|source| Error::Bind { port, source })?,
            None => TcpListener::bind((self.shared.config.host.as_str(), port))
                .await
                .map_err(|e| bind_error(port, e))?,
        };

        let ctx = Context::new(
            system,
            port,
            self.shared.config.host.clone(),
            self.shared.balancer.get().cloned(),
        );
        let (stop, stop_rx) = watch::channel(false);

        self.shared.running.store(true, Ordering::Release);
        let task = tokio::spawn(accept_loop(self.shared.clone(), listener, ctx, fallback, stop_rx));
        *lifecycle = Lifecycle::Running { stop, task };

        info!(port, "Server listening");
        self.shared.dispatcher.publish(Event::ServerStarted { port });
        Ok(())
    }

    /// Clears the running flag and waits for the accept loop to finish the
    /// exchange it is in. Stopping a server that is not running is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let port = self.shared.port;
        let mut lifecycle = self.shared.lifecycle.lock().await;

        match std::mem::replace(&mut *lifecycle, Lifecycle::Idle) {
            Lifecycle::Running { stop, task } => {
                self.shared.running.store(false, Ordering::Release);
                let _ = stop.send(true);

                if let Err(e) = task.await {
                    warn!(port, error = %e, "Accept loop ended abnormally");
                }

                info!(port, requests = self.request_count(), "Server stopped");
                self.shared.dispatcher.publish(Event::ServerStopped { port });
                Ok(())
            }
            Lifecycle::Disposed => {
                *lifecycle = Lifecycle::Disposed;
                Err(Error::Disposed(port))
            }
            Lifecycle::Idle => Ok(()),
        }
    }

    /// Releases the routing table. The server cannot be used afterwards.
    pub async fn dispose(&self) -> Result<()> {
        let port = self.shared.port;
        let mut lifecycle = self.shared.lifecycle.lock().await;

        match *lifecycle {
            Lifecycle::Running { .. } => Err(Error::StillRunning(port)),
            Lifecycle::Disposed => Err(Error::AlreadyDisposed(port)),
            Lifecycle::Idle => {
                let mut routes = self.shared.routes.write().unwrap_or_else(PoisonError::into_inner);
                self.shared.disposed.store(true, Ordering::Release);
                routes.clear();
                self.shared.reserved.lock().unwrap_or_else(PoisonError::into_inner).take();
                *lifecycle = Lifecycle::Disposed;
                debug!(port, "Server disposed");
                Ok(())
            }
        }
    }

    pub fn port(&self) -> u16 {
        self.shared.port
    }

    /// Number of completed exchanges. May lag the accept loop slightly.
    pub fn request_count(&self) -> u64 {
        self.shared.requests.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    pub fn routes(&self) -> Vec<String> {
        self.shared
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resources()
    }

    pub(crate) fn attach_balancer(&self, balancer: RoundRobin) -> Result<()> {
        self.shared
            .balancer
            .set(balancer)
            .map_err(|_| Error::Unrecoverable("server already belongs to a pool"))
    }
}

impl Shared {
    async fn serve(&self, socket: TcpStream, peer: SocketAddr, limits: ReadLimits, ctx: &Context, fallback: &Handler) {
        let mut conn = Connection::new(socket, limits);

        match conn.run(|request| self.dispatch(ctx, fallback, request)).await {
            Ok(Some(status)) => {
                let served = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(port = self.port, %peer, status = status.as_u16(), served, "Exchange completed");
            }
            Ok(None) => {
                debug!(port = self.port, %peer, "Peer closed before sending a request");
            }
            Err(e) => {
                error!(port = self.port, %peer, error = %e, "Connection error");
            }
        }
    }

    fn dispatch(&self, ctx: &Context, fallback: &Handler, request: &Request) -> Response {
        let route = request.resource().and_then(|resource| {
            self.routes
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .lookup(resource)
        });

        debug!(
            port = self.port,
            method = request.method.as_str(),
            resource = request.resource().unwrap_or(""),
            valid = request.is_valid,
            routed = route.is_some(),
            "Dispatching request"
        );

        let mut response = Response::default();
        match route {
            Some(handler) => handler(ctx, request, &mut response),
            None => fallback(ctx, request, &mut response),
        }
        response
    }
}

async fn accept_loop(
    shared: Arc<Shared>,
    listener: TcpListener,
    ctx: Context,
    fallback: Handler,
    mut stop: watch::Receiver<bool>,
) {
    let port = shared.port;
    let limits = ReadLimits {
        max_message_size: shared.config.max_message_size,
        read_timeout: shared.config.select_timeout(),
    };

    let mut failures: u32 = 0;

    while shared.running.load(Ordering::Acquire) {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    failures = 0;
                    debug!(port, %peer, "Accepted connection");
                    shared.serve(socket, peer, limits, &ctx, &fallback).await;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = accept_backoff(failures);
                    warn!(port, error = %e, failures, ?delay, "Accept failed");
                    shared.dispatcher.publish(Event::ServerFailed {
                        port,
                        reason: e.to_string(),
                    });

                    tokio::select! {
                        _ = stop.changed() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            },
            _ = stop.changed() => {}
            _ = tokio::time::sleep(shared.config.select_timeout()) => {}
        }
    }

    debug!(port, "Accept loop exited");
}

/// Delay after the `failures`-th accept error in a row: doubles from
/// 10 ms up to 1 s.
fn accept_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_MIN
        .saturating_mul(1 << exponent)
        .min(ACCEPT_BACKOFF_MAX)
}

fn adopt(listener: std::net::TcpListener) -> io::Result<TcpListener> {
    listener.set_nonblocking(true)?;
    TcpListener::from_std(listener)
}

fn bind_error(port: u16, source: io::Error) -> Error {
    if source.kind() == io::ErrorKind::AddrInUse {
        Error::PortInUse(port)
    } else {
        Error::Bind { port, source }
    }
}
