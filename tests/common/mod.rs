//! Shared utilities for integration tests.
//!
//! Mock backends are raw TCP servers speaking just enough HTTP/1.1 for the
//! gateway's client. Every helper binds an ephemeral port and returns it.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use api_gateway::config::{GatewayConfig, RouteConfig, ServiceConfig};
use api_gateway::http::Caller;
use api_gateway::{AppState, HttpServer, Shutdown};

pub const JWT_SECRET: &str = "integration-test-secret";

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Read until the end of the request head; bodies are ignored.
async fn read_request_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}

async fn respond(socket: &mut TcpStream, status: u16, headers: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
        status_line(status),
        body.len(),
        headers,
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// A backend answering every request with 200 and `body`.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, body.to_string()) }).await
}

/// A backend whose status and body come from `f` on every request.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let (listener, addr) = bind().await;
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let (status, body) = f().await;
                respond(
                    &mut socket,
                    status,
                    "X-Internal-Service: secret-node-7\r\n",
                    &body,
                )
                .await;
            });
        }
    });
    addr
}

/// A backend that echoes the request head it received as the body.
pub async fn start_echo_backend() -> SocketAddr {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = read_request_head(&mut socket).await;
                let body = serde_json::json!({ "head": head }).to_string();
                respond(&mut socket, 200, "", &body).await;
            });
        }
    });
    addr
}

/// A backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(socket);
            });
        }
    });
    addr
}

/// A backend that answers with bytes that are not HTTP.
pub async fn start_garbage_backend() -> SocketAddr {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let _ = socket.write_all(b"\x00\x01garbage that is not http\r\n\r\n").await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// An address with nothing listening on it.
pub async fn refused_addr() -> SocketAddr {
    let (listener, addr) = bind().await;
    drop(listener);
    addr
}

/// Gateway config with auth enabled and every limiter off.
pub fn test_config(services: &[(&str, SocketAddr)]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.services = services
        .iter()
        .map(|(name, addr)| {
            let mut service = ServiceConfig::new(*name, format!("http://{}", addr));
            service.timeout_ms = 2_000;
            service
        })
        .collect();
    config.routes = services
        .iter()
        .map(|(name, _)| RouteConfig::new(format!("/api/{}", name), *name))
        .collect();
    config.auth.enabled = true;
    config.auth.jwt_secret = JWT_SECRET.to_string();
    config.rate_limit.enabled = false;
    config.rate_limit.whitelist_ips.clear();
    config.health.service_check_timeout_ms = 1_000;
    config.logging.access_log = false;
    config
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub state: AppState,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Signed access token for `user_id`.
    pub fn token(&self, user_id: i64) -> String {
        let caller = Caller {
            user_id,
            username: format!("user{}", user_id),
            email: format!("user{}@example.com", user_id),
        };
        self.state.auth.issue(&caller).unwrap().token
    }

    /// Poll until the hub reports `expected` connections.
    pub async fn wait_for_connections(&self, expected: usize) {
        for _ in 0..100 {
            if self.state.hub.connection_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "expected {} websocket connections, have {}",
            expected,
            self.state.hub.connection_count()
        );
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway on an ephemeral port with its hub running.
pub async fn spawn_gateway(config: GatewayConfig) -> TestGateway {
    let (listener, addr) = bind().await;
    let shutdown = Shutdown::new();
    let (state, hub) = AppState::new(config);

    tokio::spawn(hub.run(shutdown.subscribe()));
    let server = HttpServer::new(state.clone());
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestGateway {
        addr,
        state,
        shutdown,
    }
}
