//! # switchyard
//!
//! A trie-based HTTP router and dispatcher for Rust services, with a
//! start/stop lifecycle and graceful shutdown.
//!
//! - **Routing**: one compressed path trie per method. Segments are literal,
//!   `:param` (one segment) or a final `*rest`. Literals beat parameters,
//!   parameters beat catch-alls, and lookups backtrack when a more specific
//!   branch dead-ends.
//! - **Dispatch**: trailing-slash redirects, `OPTIONS` with `Allow`, `405`,
//!   `404`, and a panic boundary that turns a crashing handler into a 500
//!   without taking the server down.
//! - **Middleware**: composed once at registration; the first middleware in
//!   the list is the outermost.
//! - **Lifecycle**: `NotStarted → Starting → Started → Stopping → Stopped`,
//!   one winner per transition, with started/stopped notifications.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use switchyard::{Config, Dispatcher, LogObserver, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), switchyard::Error> {
//!     let config = Config::default().apply_env();
//!     switchyard::logging::init(&config.log)?;
//!
//!     let app = Router::new()
//!         .get("/users/:id", get_user)
//!         .post("/users", create_user)
//!         .get("/static/*path", asset);
//!
//!     let dispatcher = Dispatcher::new(app).with_config(&config).observer(LogObserver);
//!     Server::new(config, dispatcher).serve().await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//!
//! async fn create_user(req: Request) -> Response {
//!     if req.body().is_empty() {
//!         return Response::status(StatusCode::BAD_REQUEST);
//!     }
//!     Response::builder()
//!         .status(StatusCode::CREATED)
//!         .header("location", "/users/99")
//!         .no_body()
//! }
//!
//! async fn asset(req: Request) -> String {
//!     format!("asset {}", req.param("path").unwrap_or_default())
//! }
//! ```

mod config;
mod dispatch;
mod error;
mod handler;
mod lifecycle;
mod middleware;
mod request;
mod response;
mod route;
mod router;
mod server;
mod tree;

pub mod logging;
pub mod observe;

pub use config::{Config, DispatchConfig, LogConfig};
pub use dispatch::{Dispatcher, PanicAction, RequestInfo};
pub use error::{Error, RouteError};
pub use handler::{BoxFuture, BoxedHandler, Endpoint, Handler, endpoint};
pub use lifecycle::{Lifecycle, State};
pub use middleware::{Middleware, Next, compose};
pub use observe::{LogObserver, Observer, SpanTracer, Tracer};
pub use request::{Cancellation, Request};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use route::{Params, Route};
pub use router::Router;
pub use server::Server;
pub use tree::{Lookup, Tree};
