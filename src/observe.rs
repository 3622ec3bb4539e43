//! Observability hooks.
//!
//! The dispatcher reports each routed request to an [`Observer`] (one event
//! on arrival, one once the response is ready) and brackets the handler with
//! a [`Tracer`] span. Both are fire-and-forget: a hook that panics is logged
//! and the request carries on.
//!
//! [`LogObserver`] and [`SpanTracer`] are the `tracing`-backed defaults.

use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use http::{Method, StatusCode};
use tracing::{Span, debug, info, warn};

use crate::error::Error;

/// Emitted before the handler runs.
#[derive(Clone, Debug)]
pub struct RequestEvent<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    /// Route label, `None` when no route matched.
    pub route: Option<&'a str>,
    pub remote_addr: Option<SocketAddr>,
}

/// Emitted after the response has been produced.
#[derive(Clone, Debug)]
pub struct ResponseEvent<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub route: Option<&'a str>,
    pub status: StatusCode,
    pub content_length: usize,
    pub elapsed: Duration,
}

/// Receives request and response events.
pub trait Observer: Send + Sync + 'static {
    fn request_received(&self, _event: &RequestEvent<'_>) {}
    fn response_sent(&self, _event: &ResponseEvent<'_>) {}
}

/// Starts a trace around each handler invocation.
pub trait Tracer: Send + Sync + 'static {
    fn start(&self, event: &RequestEvent<'_>) -> Box<dyn TraceFinisher>;
}

/// Completes a trace started by a [`Tracer`].
pub trait TraceFinisher: Send {
    /// Span the handler future is instrumented with.
    fn span(&self) -> Span {
        Span::none()
    }

    /// `err` is set when the handler panicked.
    fn finish(self: Box<Self>, status: StatusCode, err: Option<&Error>);
}

/// Logs one line per response at `info`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn request_received(&self, event: &RequestEvent<'_>) {
        debug!(
            method = %event.method,
            path = event.path,
            route = event.route.unwrap_or("-"),
            "request received",
        );
    }

    fn response_sent(&self, event: &ResponseEvent<'_>) {
        info!(
            method = %event.method,
            path = event.path,
            route = event.route.unwrap_or("-"),
            status = event.status.as_u16(),
            bytes = event.content_length,
            elapsed_ms = event.elapsed.as_secs_f64() * 1000.0,
            "response sent",
        );
    }
}

/// Opens an `http.request` span per handler invocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpanTracer;

impl Tracer for SpanTracer {
    fn start(&self, event: &RequestEvent<'_>) -> Box<dyn TraceFinisher> {
        let span = tracing::info_span!(
            "http.request",
            method = %event.method,
            route = event.route.unwrap_or("-"),
            status = tracing::field::Empty,
        );
        Box::new(SpanFinisher(span))
    }
}

struct SpanFinisher(Span);

impl TraceFinisher for SpanFinisher {
    fn span(&self) -> Span {
        self.0.clone()
    }

    fn finish(self: Box<Self>, status: StatusCode, err: Option<&Error>) {
        self.0.record("status", status.as_u16());
        if let Some(err) = err {
            self.0.in_scope(|| warn!(error = %err, "request failed"));
        }
    }
}

/// Runs a collaborator hook, logging instead of unwinding if it panics.
pub(crate) fn guarded<T>(hook: &'static str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => Some(v),
        Err(payload) => {
            warn!(hook, error = %Error::from_panic(payload.as_ref()), "observability hook panicked");
            None
        }
    }
}
