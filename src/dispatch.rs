//! Request dispatch.
//!
//! The [`Dispatcher`] owns the finished [`Router`] and turns every request
//! into exactly one [`Response`]:
//!
//! 1. A route matches: run its composed handler inside the panic boundary.
//! 2. Only the path with the trailing slash flipped matches: redirect there,
//!    `301` for GET/HEAD and `307` otherwise so the method and body survive.
//! 3. OPTIONS, and some other method matches the path: `200` with `Allow`.
//! 4. Some other method matches the path: `405` with `Allow`.
//! 5. Otherwise `404`.
//!
//! A panic in a handler (or in a middleware around it) is caught, logged and
//! turned into a 500 by the panic action. The dispatcher keeps serving.

use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use http::{Method, StatusCode, Uri};
use tracing::{Instrument, Span, debug, error};

use crate::config::{Config, DispatchConfig};
use crate::error::Error;
use crate::handler::{self, BoxedHandler, Handler};
use crate::observe::{self, Observer, RequestEvent, ResponseEvent, Tracer};
use crate::request::Request;
use crate::response::Response;
use crate::route::Route;
use crate::router::Router;
use crate::tree::Lookup;

const NOT_FOUND_BODY: &str = "404 page not found";
const METHOD_NOT_ALLOWED_BODY: &str = "405 method not allowed";
const INTERNAL_ERROR_BODY: &str = "an internal server error occurred";

/// Called with the intercepted panic to build the response. It runs at most
/// once per panicking request.
pub type PanicAction = Arc<dyn Fn(&RequestInfo, &Error) -> Response + Send + Sync>;

/// What a panic action gets to know about the failed request.
#[derive(Clone, Debug)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub route: Option<Arc<Route>>,
    pub remote_addr: Option<SocketAddr>,
}

/// Routes requests and applies the miss-handling policy.
///
/// ```rust,no_run
/// use http::StatusCode;
/// use switchyard::{Dispatcher, LogObserver, Request, Response, Router};
///
/// # async fn index(_: Request) -> &'static str { "ok" }
/// let dispatcher = Dispatcher::new(Router::new().get("/", index))
///     .observer(LogObserver)
///     .on_panic(|_info, _err| Response::status(StatusCode::SERVICE_UNAVAILABLE));
/// ```
pub struct Dispatcher {
    router: Router,
    config: DispatchConfig,
    default_headers: Vec<(String, String)>,
    not_found: Option<BoxedHandler>,
    method_not_allowed: Option<BoxedHandler>,
    panic_action: Option<PanicAction>,
    observer: Option<Arc<dyn Observer>>,
    tracer: Option<Arc<dyn Tracer>>,
}

impl Dispatcher {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            config: DispatchConfig::default(),
            default_headers: Vec::new(),
            not_found: None,
            method_not_allowed: None,
            panic_action: None,
            observer: None,
            tracer: None,
        }
    }

    /// Takes the dispatch flags and default headers from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.config = config.dispatch.clone();
        self.default_headers = config
            .default_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self
    }

    /// Replaces the generic 404 response.
    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.not_found = Some(handler::endpoint(handler));
        self
    }

    /// Replaces the generic 405 response. The `Allow` header is added to
    /// whatever the handler returns unless it sets one itself.
    pub fn method_not_allowed(mut self, handler: impl Handler) -> Self {
        self.method_not_allowed = Some(handler::endpoint(handler));
        self
    }

    /// Sets the response builder used after a handler panics.
    pub fn on_panic<F>(mut self, action: F) -> Self
    where
        F: Fn(&RequestInfo, &Error) -> Response + Send + Sync + 'static,
    {
        self.panic_action = Some(Arc::new(action));
        self
    }

    pub fn observer(mut self, observer: impl Observer) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn tracer(mut self, tracer: impl Tracer) -> Self {
        self.tracer = Some(Arc::new(tracer));
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Produces the response for one request. Never panics on account of a
    /// handler.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let method = req.method.clone();
        let path = req.uri.path().to_owned();

        match self.router.lookup(&method, &path) {
            Lookup::Found(route, params) => {
                let route = Arc::clone(route);
                req.params = params;
                req.route = Some(Arc::clone(&route));
                return self.invoke(&route.handler, req).await;
            }
            Lookup::Redirect
                if self.config.redirect_trailing_slash
                    && method != Method::CONNECT
                    && path != "/" =>
            {
                return redirect(&method, &path, req.uri.query());
            }
            _ => {}
        }

        if method == Method::OPTIONS && self.config.handle_options {
            if let Some(allow) = self.router.allowed(&path, &method) {
                return Response::builder().header("allow", &allow).no_body();
            }
        } else if self.config.handle_method_not_allowed {
            if let Some(allow) = self.router.allowed(&path, &method) {
                debug!(%method, path, allow, "method not allowed");
                let mut res = match &self.method_not_allowed {
                    Some(handler) => self.invoke(handler, req).await,
                    None => Response::builder()
                        .status(StatusCode::METHOD_NOT_ALLOWED)
                        .text(METHOD_NOT_ALLOWED_BODY),
                };
                res.set_default_header("allow", &allow);
                return res;
            }
        }

        match &self.not_found {
            Some(handler) => self.invoke(handler, req).await,
            None => Response::builder().status(StatusCode::NOT_FOUND).text(NOT_FOUND_BODY),
        }
    }

    /// Runs `handler` inside the panic boundary, bracketed by the observer
    /// and tracer hooks.
    async fn invoke(&self, handler: &BoxedHandler, req: Request) -> Response {
        let info = RequestInfo {
            method: req.method.clone(),
            uri: req.uri.clone(),
            route: req.route.clone(),
            remote_addr: req.remote_addr,
        };
        let started = req.started;
        let event = RequestEvent {
            method: &info.method,
            path: info.uri.path(),
            route: info.route.as_deref().map(Route::label),
            remote_addr: info.remote_addr,
        };

        if let Some(observer) = &self.observer {
            observe::guarded("request_received", || observer.request_received(&event));
        }
        let trace = self
            .tracer
            .as_ref()
            .and_then(|tracer| observe::guarded("trace_start", || tracer.start(&event)));
        let span = trace
            .as_ref()
            .and_then(|t| observe::guarded("trace_span", || t.span()))
            .unwrap_or_else(Span::none);

        // Handler construction can panic before the future exists, so both
        // the call and the poll are inside the boundary.
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| handler.call(req))) {
            Ok(fut) => AssertUnwindSafe(fut).catch_unwind().instrument(span).await,
            Err(payload) => Err(payload),
        };

        let (mut res, failure) = match outcome {
            Ok(res) => (res, None),
            Err(payload) => {
                let err = Error::from_panic(payload.as_ref());
                error!(
                    method = %info.method,
                    path = info.uri.path(),
                    route = event.route.unwrap_or("-"),
                    error = %err,
                    "handler panicked",
                );
                (self.recover(&info, &err), Some(err))
            }
        };

        for (name, value) in &self.default_headers {
            res.set_default_header(name, value);
        }

        if let Some(trace) = trace {
            let status = res.status_code();
            observe::guarded("trace_finish", || trace.finish(status, failure.as_ref()));
        }
        if let Some(observer) = &self.observer {
            let sent = ResponseEvent {
                method: event.method,
                path: event.path,
                route: event.route,
                status: res.status_code(),
                content_length: res.content_length(),
                elapsed: started.elapsed(),
            };
            observe::guarded("response_sent", || observer.response_sent(&sent));
        }
        res
    }

    fn recover(&self, info: &RequestInfo, err: &Error) -> Response {
        if let Some(action) = &self.panic_action {
            match panic::catch_unwind(AssertUnwindSafe(|| action(info, err))) {
                Ok(res) => return res,
                Err(payload) => {
                    error!(error = %Error::from_panic(payload.as_ref()), "panic action panicked");
                }
            }
        }
        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .text(INTERNAL_ERROR_BODY)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("default_headers", &self.default_headers)
            .field("routes", &self.router.routes().count())
            .finish_non_exhaustive()
    }
}

fn redirect(method: &Method, path: &str, query: Option<&str>) -> Response {
    let mut location = match path.strip_suffix('/') {
        Some(stripped) => stripped.to_owned(),
        None => format!("{path}/"),
    };
    if let Some(query) = query {
        location.push('?');
        location.push_str(query);
    }

    let code = if *method == Method::GET || *method == Method::HEAD {
        StatusCode::MOVED_PERMANENTLY
    } else {
        StatusCode::TEMPORARY_REDIRECT
    };
    debug!(%method, path, location, status = code.as_u16(), "trailing slash redirect");
    Response::redirect(code, &location)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok(_req: Request) -> &'static str { "ok" }

    fn request(method: Method, uri: &str) -> Request {
        let req = http::Request::builder().method(method).uri(uri).body(bytes::Bytes::new());
        Request::from_http(req.unwrap())
    }

    #[test]
    fn redirect_flips_the_trailing_slash_and_keeps_the_query() {
        let res = redirect(&Method::GET, "/users/", Some("page=2"));
        assert_eq!(res.status_code(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.header("location"), Some("/users?page=2"));

        let res = redirect(&Method::POST, "/users", None);
        assert_eq!(res.status_code(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(res.header("location"), Some("/users/"));
    }

    #[tokio::test]
    async fn matched_routes_see_their_params_and_route() {
        let dispatcher = Dispatcher::new(Router::new().get("/users/:id", |req: Request| async move {
            let route = req.route().map(|r| r.pattern().to_owned()).unwrap_or_default();
            format!("{} {}", req.param("id").unwrap_or("-"), route)
        }));
        let res = dispatcher.dispatch(request(Method::GET, "/users/42")).await;
        assert_eq!(res.body(), b"42 /users/:id");
    }

    #[tokio::test]
    async fn redirect_precedes_method_not_allowed() {
        let dispatcher = Dispatcher::new(Router::new().get("/a/", ok).post("/a", ok));
        let res = dispatcher.dispatch(request(Method::GET, "/a")).await;
        assert_eq!(res.status_code(), StatusCode::MOVED_PERMANENTLY);
    }

    #[tokio::test]
    async fn connect_and_root_are_never_redirected() {
        let dispatcher = Dispatcher::new(Router::new().on(Method::CONNECT, "/tunnel/", ok));
        let res = dispatcher.dispatch(request(Method::CONNECT, "/tunnel")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn disabled_flags_fall_through_to_not_found() {
        let config = Config::from_toml_str(
            "[dispatch]\nredirect_trailing_slash = false\nhandle_options = false\nhandle_method_not_allowed = false",
        )
        .unwrap();
        let dispatcher = Dispatcher::new(Router::new().get("/a/", ok).post("/b", ok)).with_config(&config);

        for (method, path) in [(Method::GET, "/a"), (Method::OPTIONS, "/b"), (Method::GET, "/b")] {
            let res = dispatcher.dispatch(request(method, path)).await;
            assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn default_headers_apply_to_invoked_responses_only() {
        let config = Config::from_toml_str("[default_headers]\nx-frame-options = \"DENY\"").unwrap();
        let dispatcher = Dispatcher::new(Router::new().get("/", ok)).with_config(&config);

        let res = dispatcher.dispatch(request(Method::GET, "/")).await;
        assert_eq!(res.header("x-frame-options"), Some("DENY"));

        let res = dispatcher.dispatch(request(Method::GET, "/missing")).await;
        assert_eq!(res.header("x-frame-options"), None);
    }

    #[tokio::test]
    async fn default_headers_apply_to_custom_fallbacks() {
        let config = Config::from_toml_str("[default_headers]\nx-frame-options = \"DENY\"").unwrap();
        let dispatcher = Dispatcher::new(Router::new().get("/things", ok))
            .with_config(&config)
            .not_found(|_req: Request| async { (StatusCode::NOT_FOUND, "gone") })
            .method_not_allowed(|_req: Request| async {
                Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .header("x-frame-options", "SAMEORIGIN")
                    .text("nope")
            });

        let res = dispatcher.dispatch(request(Method::GET, "/missing")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.header("x-frame-options"), Some("DENY"));

        let res = dispatcher.dispatch(request(Method::DELETE, "/things")).await;
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("x-frame-options"), Some("SAMEORIGIN"));
    }

    #[tokio::test]
    async fn panicking_panic_action_yields_generic_500() {
        async fn boom(_req: Request) -> &'static str {
            panic!("handler")
        }
        let dispatcher = Dispatcher::new(Router::new().get("/", boom))
            .on_panic(|_info, _err| panic!("panic action"));

        let res = dispatcher.dispatch(request(Method::GET, "/")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), INTERNAL_ERROR_BODY.as_bytes());
    }
}
