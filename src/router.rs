//! Per-method request router.
//!
//! One [`Tree`] per HTTP method, kept in registration order so the `Allow`
//! header lists methods in the order they were first registered. Build the
//! router once at startup and hand it to a [`Dispatcher`](crate::Dispatcher);
//! it is read-only from then on.

use std::sync::Arc;

use http::Method;

use crate::error::RouteError;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{self, Middleware};
use crate::route::Route;
use crate::tree::{Lookup, Tree};

/// The application router.
///
/// Each chaining helper ([`Router::on`], [`Router::get`], …) returns `self`
/// so registrations read as a table. They panic on an invalid pattern; use
/// [`Router::handle`] or [`Router::route`] to get the [`RouteError`] instead.
#[derive(Default)]
pub struct Router {
    trees: Vec<(Method, Tree<Arc<Route>>)>,
    middleware: Vec<Middleware>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends app-level middleware.
    ///
    /// It wraps every route registered **after** this call, inside that
    /// route's own middleware.
    pub fn layer(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Registers a handler for a method + pattern pair. Returns `self` for
    /// chaining.
    ///
    /// Patterns use `:name` for one segment and a final `*name` for the rest
    /// of the path:
    ///
    /// ```rust,no_run
    /// # use http::Method;
    /// # use switchyard::{Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn asset(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET, "/users/:id",     get_user)
    ///     .on(Method::GET, "/assets/*path",  asset);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the pattern is rejected. Route tables are fixed at startup,
    /// so a bad pattern is a programming error.
    pub fn on(mut self, method: Method, pattern: &str, handler: impl Handler) -> Self {
        if let Err(e) = self.handle(method, pattern, handler) {
            panic!("invalid route `{pattern}`: {e}");
        }
        self
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, pattern, handler)
    }

    pub fn patch(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, pattern, handler)
    }

    pub fn head(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::HEAD, pattern, handler)
    }

    pub fn options(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::OPTIONS, pattern, handler)
    }

    /// Registers a handler, reporting a rejected pattern as an error.
    pub fn handle(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Handler,
    ) -> Result<(), RouteError> {
        self.register(method, pattern, None, handler.into_endpoint(), &[])
    }

    /// Registers a handler wrapped in per-route `middleware`.
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Handler,
        middleware: &[Middleware],
    ) -> Result<(), RouteError> {
        self.register(method, pattern, None, handler.into_endpoint(), middleware)
    }

    /// Like [`Router::route`], with a display name reported to observers in
    /// place of the pattern.
    pub fn named(
        &mut self,
        method: Method,
        pattern: &str,
        name: &str,
        handler: impl Handler,
        middleware: &[Middleware],
    ) -> Result<(), RouteError> {
        self.register(method, pattern, Some(name.to_owned()), handler.into_endpoint(), middleware)
    }

    fn register(
        &mut self,
        method: Method,
        pattern: &str,
        name: Option<String>,
        handler: BoxedHandler,
        middleware: &[Middleware],
    ) -> Result<(), RouteError> {
        let chain: Vec<Middleware> = middleware.iter().chain(&self.middleware).cloned().collect();
        let route = Arc::new(Route {
            method: method.clone(),
            pattern: pattern.to_owned(),
            name,
            handler: middleware::compose(handler, &chain),
        });
        self.tree_mut(method).insert(pattern, route)
    }

    fn tree_mut(&mut self, method: Method) -> &mut Tree<Arc<Route>> {
        let idx = match self.trees.iter().position(|(m, _)| *m == method) {
            Some(idx) => idx,
            None => {
                self.trees.push((method, Tree::new()));
                self.trees.len() - 1
            }
        };
        &mut self.trees[idx].1
    }

    fn tree(&self, method: &Method) -> Option<&Tree<Arc<Route>>> {
        self.trees.iter().find(|(m, _)| m == method).map(|(_, t)| t)
    }

    /// Looks up `path` in the tree for `method`.
    pub fn lookup(&self, method: &Method, path: &str) -> Lookup<'_, Arc<Route>> {
        match self.tree(method) {
            Some(tree) => tree.lookup(path),
            None => Lookup::Miss,
        }
    }

    /// Computes the `Allow` header value for `path`.
    ///
    /// Lists every method other than `requested` and OPTIONS with a route
    /// matching `path`, in registration order, then appends OPTIONS. The
    /// server-wide path `*` lists every registered method except OPTIONS.
    /// Returns `None` when nothing else matches.
    pub fn allowed(&self, path: &str, requested: &Method) -> Option<String> {
        let server_wide = path == "*";
        let mut allow = String::new();
        for (method, tree) in &self.trees {
            if *method == Method::OPTIONS {
                continue;
            }
            let listed = if server_wide {
                !tree.values().is_empty()
            } else {
                method != requested && tree.contains(path)
            };
            if listed {
                if !allow.is_empty() {
                    allow.push_str(", ");
                }
                allow.push_str(method.as_str());
            }
        }

        if allow.is_empty() {
            return None;
        }
        if !server_wide {
            allow.push_str(", OPTIONS");
        }
        Some(allow)
    }

    /// Every registered route, grouped by method in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.trees.iter().flat_map(|(_, tree)| tree.values()).map(|r| r.as_ref())
    }
}
