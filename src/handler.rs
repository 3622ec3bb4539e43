//! Endpoints: the unit a route runs.
//!
//! Registration turns a user handler into an [`Endpoint`] exactly once,
//! wraps it in the route's middleware chain, and stores the result on the
//! [`Route`](crate::Route). From then on the dispatcher only sees
//! [`BoxedHandler`] values; whether one is a bare `async fn` or five layers
//! of middleware around one makes no difference to it.
//!
//! ```text
//! async fn show(req: Request) -> impl IntoResponse
//!        │  Handler::into_endpoint
//!        ▼
//! Arc<AsyncFn<show>>                 : Endpoint
//!        │  middleware::compose(.., &[auth, app])
//!        ▼
//! Arc<FromFn<auth, FromFn<app, ..>>> : Endpoint   stored on the Route
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// The future an [`Endpoint`] returns.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Something that answers a request.
///
/// Implemented by every registered handler and by every middleware layer
/// wrapped around one. Implement it directly when writing middleware with
/// [`Middleware::new`](crate::Middleware::new).
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A shared, type-erased endpoint.
pub type BoxedHandler = Arc<dyn Endpoint>;

/// A route handler: any `Fn(Request) -> impl Future<Output = impl IntoResponse>`.
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
pub trait Handler: Send + Sync + 'static {
    fn into_endpoint(self) -> BoxedHandler;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_endpoint(self) -> BoxedHandler {
        Arc::new(AsyncFn(self))
    }
}

struct AsyncFn<F>(F);

impl<F, Fut, R> Endpoint for AsyncFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Converts a handler into the endpoint form routes store.
pub fn endpoint(handler: impl Handler) -> BoxedHandler {
    handler.into_endpoint()
}
