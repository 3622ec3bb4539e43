//! HTTP server and graceful shutdown.
//!
//! A [`Server`] binds the configured address, serves HTTP/1.1 and HTTP/2
//! through a [`Dispatcher`], and moves through the [`Lifecycle`] latch as it
//! goes. Stopping:
//!
//! 1. Stops accepting: the listener is dropped straight away.
//! 2. Asks every open connection to finish its in-flight requests and close.
//! 3. After `shutdown_grace_period_ms`, fires the request cancellation
//!    signal and aborts whatever connections are still open. HTTP/2 stream
//!    handlers only see the cancellation signal; see [`Server`].
//!
//! # Kubernetes
//!
//! On pod termination Kubernetes sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before SIGKILL. Keep the
//! grace period below that so the forced close happens on our terms.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::lifecycle::{Lifecycle, State};
use crate::request::{Cancellation, Request};
use crate::response::Response;

/// The HTTP server.
///
/// `start` and `stop` take `&self`, so share the server behind an [`Arc`]
/// to drive it from several tasks:
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use switchyard::{Config, Dispatcher, Router, Server};
///
/// # async fn run() -> Result<(), switchyard::Error> {
/// let server = Arc::new(Server::new(Config::default(), Dispatcher::new(Router::new())));
/// let running = tokio::spawn({
///     let server = Arc::clone(&server);
///     async move { server.start().await }
/// });
///
/// server.lifecycle().wait_started().await?;
/// server.stop().await?;
/// running.await.expect("server task panicked")?;
/// # Ok(())
/// # }
/// ```
///
/// # Forced close
///
/// When the grace period runs out the server aborts its connection tasks.
/// For HTTP/1 that drops the in-flight handler future. HTTP/2 streams run on
/// tasks hyper spawns itself, so aborting the connection does not stop a
/// handler already executing on one of them. Long-running handlers should
/// watch [`Request::cancellation`], which fires for both protocols at the
/// same moment.
pub struct Server {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    lifecycle: Lifecycle,
    shutdown: watch::Sender<bool>,
    cancel: watch::Sender<bool>,
    local_addr: OnceLock<SocketAddr>,
}

impl Server {
    pub fn new(config: Config, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            lifecycle: Lifecycle::new(),
            shutdown: watch::Sender::new(false),
            cancel: watch::Sender::new(false),
            local_addr: OnceLock::new(),
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn state(&self) -> State {
        self.lifecycle.state()
    }

    /// The bound address, once started. Useful with port `0`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Binds and serves until [`stop`](Self::stop) is called, then drains.
    ///
    /// Fails with [`Error::CannotStart`] unless the server has never been
    /// started. A bind failure moves the server straight to `Stopped`.
    pub async fn start(&self) -> Result<(), Error> {
        self.lifecycle.begin_start()?;

        let (listener, addr) = match bind(&self.config.bind_addr).await {
            Ok(bound) => bound,
            Err(e) => {
                self.lifecycle.abort_start();
                error!(addr = %self.config.bind_addr, "bind failed: {e}");
                return Err(e);
            }
        };
        let _ = self.local_addr.set(addr);

        for route in self.dispatcher.router().routes() {
            debug!(method = %route.method(), pattern = route.pattern(), name = route.name(), "route");
        }
        info!(%addr, "switchyard listening");

        let stop = stop_requested(self.shutdown.subscribe());
        self.lifecycle.mark_started();
        self.run(listener, stop).await;

        self.lifecycle.mark_stopped();
        info!("switchyard stopped");
        Ok(())
    }

    /// Stops a started server and waits until it has drained.
    ///
    /// Fails with [`Error::CannotStop`] unless the server is `Started`.
    pub async fn stop(&self) -> Result<(), Error> {
        self.lifecycle.begin_stop()?;
        self.shutdown.send_replace(true);
        self.lifecycle.wait_stopped().await;
        Ok(())
    }

    /// Runs [`start`](Self::start) and stops on SIGTERM or Ctrl-C.
    ///
    /// Returns once the server has fully stopped.
    pub async fn serve(self) -> Result<(), Error> {
        let run = self.start();
        tokio::pin!(run);

        tokio::select! {
            res = &mut run => return res,
            () = shutdown_signal() => info!("shutdown signal received"),
        }

        let stop = async {
            match self.lifecycle.wait_started().await {
                Ok(()) => self.stop().await,
                Err(_) => Ok(()),
            }
        };
        let (ran, stopped) = tokio::join!(run, stop);
        ran.and(stopped)
    }

    async fn run(&self, listener: TcpListener, stop: impl Future<Output = ()>) {
        tokio::pin!(stop);
        let builder = ConnBuilder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                // Check the stop signal first so no connection is accepted
                // after a stop, even if more are queued.
                biased;

                () = &mut stop => break,

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = Arc::clone(&self.dispatcher);
                    let cancel = self.cancel.subscribe();
                    let timeout = self.config.request_timeout();
                    let svc = service_fn(move |req: hyper::Request<Incoming>| {
                        let dispatcher = Arc::clone(&dispatcher);
                        let cancel = Cancellation::new(cancel.clone());
                        async move {
                            Ok::<_, Infallible>(
                                serve_request(&dispatcher, req, remote_addr, timeout, cancel).await,
                            )
                        }
                    });

                    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), svc);
                    let conn = graceful.watch(conn.into_owned());
                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            debug!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set does not grow
                // without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        info!(in_flight = tasks.len(), "draining connections");

        let grace = self.config.shutdown_grace_period();
        tokio::select! {
            () = graceful.shutdown() => debug!("all connections drained"),
            () = tokio::time::sleep(grace) => {
                warn!(
                    grace_ms = duration_ms(grace),
                    open = tasks.len(),
                    "grace period elapsed, closing remaining connections",
                );
                self.cancel.send_replace(true);
                tasks.abort_all();
            }
        }
        while tasks.join_next().await.is_some() {}
    }
}

async fn bind(addr: &str) -> Result<(TcpListener, SocketAddr), Error> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    Ok((listener, local))
}

async fn stop_requested(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|&stop| stop).await;
}

/// Collects the body, then hands the request to the dispatcher.
async fn serve_request(
    dispatcher: &Dispatcher,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    timeout: Option<Duration>,
    cancel: Cancellation,
) -> http::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(peer = %remote_addr, "failed to read request body: {e}");
            return Response::status(http::StatusCode::BAD_REQUEST).into_inner();
        }
    };

    let req = Request::from_http(http::Request::from_parts(parts, body))
        .with_remote_addr(remote_addr)
        .with_deadline(timeout)
        .with_cancellation(cancel);
    dispatcher.dispatch(req).await.into_inner()
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available. A handler that cannot be installed
/// is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
