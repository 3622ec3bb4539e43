//! CRUD-style endpoints with middleware, a catch-all and a panic action.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:8080/users/42
//!   curl -i http://localhost:8080/users/42/          # 301 to /users/42
//!   curl -i -X POST http://localhost:8080/users -d '{"name":"alice"}'
//!   curl -i -X PUT http://localhost:8080/users        # 405, Allow: POST, OPTIONS
//!   curl -i -X OPTIONS http://localhost:8080/users/42
//!   curl -i http://localhost:8080/files/css/site.css
//!   curl -i http://localhost:8080/boom                # 500, server keeps running

use http::StatusCode;
use switchyard::{
    Config, Dispatcher, LogObserver, Middleware, Next, Request, Response, Router, Server,
    SpanTracer,
};

#[tokio::main]
async fn main() -> Result<(), switchyard::Error> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .apply_env();
    switchyard::logging::init(&config.log)?;

    let request_id = Middleware::from_fn(|req: Request, next: Next| async move {
        let id = req.header("x-request-id").unwrap_or("-").to_owned();
        let mut res = next.run(req).await;
        res.set_header("x-request-id", id);
        res
    });

    let app = Router::new()
        .layer(request_id)
        .get("/users/:id", get_user)
        .post("/users", create_user)
        .delete("/users/:id", delete_user)
        .get("/files/*path", file)
        .get("/boom", boom);

    let dispatcher = Dispatcher::new(app)
        .with_config(&config)
        .observer(LogObserver)
        .tracer(SpanTracer)
        .on_panic(|info, err| {
            tracing::warn!(uri = %info.uri, "recovered: {err}");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .json(br#"{"error":"internal"}"#.to_vec())
        });

    Server::new(config, dispatcher).serve().await
}

async fn get_user(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes())
}

async fn create_user(req: Request) -> Response {
    if req.body().is_empty() {
        return Response::status(StatusCode::BAD_REQUEST);
    }
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(br#"{"id":"99","name":"new_user"}"#.to_vec())
}

async fn delete_user(_req: Request) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn file(req: Request) -> String {
    format!("would serve {}\n", req.param("path").unwrap_or_default())
}

async fn boom(_req: Request) -> Response {
    panic!("something went badly wrong")
}
