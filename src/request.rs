//! Incoming HTTP request type.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use tokio::sync::watch;

use crate::route::{Params, Route};

/// An incoming HTTP request with its body fully read.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: Params,
    pub(crate) route: Option<Arc<Route>>,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) started: Instant,
    pub(crate) deadline: Option<Instant>,
    pub(crate) cancellation: Cancellation,
}

impl Request {
    /// Converts an `http::Request` whose body has already been collected.
    pub fn from_http<B: Into<Bytes>>(req: http::Request<B>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body: body.into(),
            params: Params::new(),
            route: None,
            remote_addr: None,
            started: Instant::now(),
            deadline: None,
            cancellation: Cancellation::never(),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn params(&self) -> &Params { &self.params }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Header lookup. Names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    /// The route this request matched. `None` inside not-found and
    /// method-not-allowed handlers.
    pub fn route(&self) -> Option<&Route> {
        self.route.as_deref()
    }

    /// Time since the request reached the dispatcher.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Deadline forwarded from the server configuration. Not enforced by the
    /// dispatcher; handlers doing long work should honour it.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fires when the server force-closes connections after its shutdown
    /// grace period.
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub(crate) fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub(crate) fn with_deadline(mut self, timeout: Option<Duration>) -> Self {
        self.deadline = timeout.map(|t| self.started + t);
        self
    }

    pub(crate) fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    #[cfg(test)]
    pub(crate) fn get(path: &str) -> Self {
        let req = http::Request::get(path).body(Bytes::new());
        Self::from_http(req.unwrap())
    }
}

/// Cancellation signal carried alongside a request.
#[derive(Clone, Debug)]
pub struct Cancellation(watch::Receiver<bool>);

impl Cancellation {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the signal fires. Never resolves for
    /// [`Cancellation::never`].
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        if rx.wait_for(|&cancelled| cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
