//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use switchyard::{Config, Dispatcher, Request, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

pub fn request(method: Method, uri: &str) -> Request {
    let req = http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Bytes::new())
        .unwrap();
    Request::from_http(req)
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.bind_addr = "127.0.0.1:0".to_owned();
    config.shutdown_grace_period_ms = 200;
    config
}

/// Spawns `start` and waits until the server is accepting.
pub async fn spawn_server(
    config: Config,
    dispatcher: Dispatcher,
) -> (Arc<Server>, SocketAddr, JoinHandle<Result<(), switchyard::Error>>) {
    let server = Arc::new(Server::new(config, dispatcher));
    let handle = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.start().await }
    });
    tokio::time::timeout(Duration::from_secs(5), server.lifecycle().wait_started())
        .await
        .expect("server did not start in time")
        .expect("server failed to start");
    let addr = server.local_addr().expect("started server has an address");
    (server, addr, handle)
}

/// A parsed HTTP/1.1 response.
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends one request on a fresh connection and reads until the server closes it.
pub async fn send(addr: SocketAddr, method: &str, path: &str) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let head = format!("{method} {path} HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\ncontent-length: 0\r\n\r\n");
    stream.write_all(head.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    parse(&String::from_utf8_lossy(&raw))
}

fn parse(raw: &str) -> RawResponse {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .expect("malformed status line");
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .collect();
    RawResponse { status, headers, body: body.to_owned() }
}
