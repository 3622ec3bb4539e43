//! Middleware composition.
//!
//! A [`Middleware`] turns one handler into another. [`compose`] applies a
//! list of them so that the **first** entry is the outermost wrapper: it sees
//! the request before every other layer and the response after them.
//!
//! Composition happens once, when a route is registered. Per-route
//! middleware comes first, app-level middleware added with
//! [`Router::layer`](crate::Router::layer) is appended after it.
//!
//! ```rust,no_run
//! use switchyard::{Middleware, Next, Request, Router};
//!
//! let timing = Middleware::from_fn(|req: Request, next: Next| async move {
//!     let started = std::time::Instant::now();
//!     let res = next.run(req).await;
//!     tracing::debug!(elapsed = ?started.elapsed(), "handled");
//!     res
//! });
//!
//! # async fn index(_: Request) -> &'static str { "ok" }
//! let app = Router::new().layer(timing).get("/", index);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler, Endpoint};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A function from handler to handler.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync>);

impl Middleware {
    /// Wraps a raw handler transformer.
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    {
        Self(Arc::new(wrap))
    }

    /// Builds middleware from an async function that receives the request
    /// and the rest of the chain.
    pub fn from_fn<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + Send + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |inner| {
            Arc::new(FromFn { f: Arc::clone(&f), inner }) as BoxedHandler
        })
    }

    pub(crate) fn apply(&self, handler: BoxedHandler) -> BoxedHandler {
        (self.0)(handler)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}

/// The remainder of a middleware chain.
pub struct Next(BoxedHandler);

impl Next {
    /// Runs the inner layers and the handler.
    pub async fn run(self, req: Request) -> Response {
        self.0.call(req).await
    }
}

struct FromFn<F> {
    f: Arc<F>,
    inner: BoxedHandler,
}

impl<F, Fut, R> Endpoint for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.f)(req, Next(Arc::clone(&self.inner)));
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Wraps `handler` in `middleware`, first entry outermost.
///
/// An empty list returns `handler` itself. The result is a fresh handler;
/// composing the same inputs twice yields two independent, equivalent ones.
pub fn compose(handler: BoxedHandler, middleware: &[Middleware]) -> BoxedHandler {
    middleware.iter().rev().fold(handler, |inner, mw| mw.apply(inner))
}
