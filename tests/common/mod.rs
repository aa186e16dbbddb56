//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use csp_edge::config::EdgeConfig;
use csp_edge::http::HttpServer;
use csp_edge::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A canned origin response, written in `parts` with a pause between each.
#[derive(Clone)]
pub struct OriginReply {
    pub status: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub parts: Vec<&'static [u8]>,
}

impl OriginReply {
    pub fn ok(content_type: &str, body: &'static str) -> Self {
        Self {
            status: "200 OK",
            headers: vec![
                ("Content-Type", content_type.to_string()),
                ("Content-Length", body.len().to_string()),
            ],
            parts: vec![body.as_bytes()],
        }
    }

    /// A complete body sent with the given `Content-Encoding`.
    pub fn encoded(content_type: &str, encoding: &str, body: &'static [u8]) -> Self {
        Self {
            status: "200 OK",
            headers: vec![
                ("Content-Type", content_type.to_string()),
                ("Content-Encoding", encoding.to_string()),
                ("Content-Length", body.len().to_string()),
            ],
            parts: vec![body],
        }
    }

    /// Body without a length, delimited by connection close.
    pub fn streamed(content_type: &str, parts: Vec<&'static str>) -> Self {
        Self {
            status: "200 OK",
            headers: vec![("Content-Type", content_type.to_string())],
            parts: parts.into_iter().map(str::as_bytes).collect(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }
}

/// Request heads seen by a mock origin, lowercased.
pub type SeenRequests = Arc<Mutex<Vec<String>>>;

/// Start a mock origin on an ephemeral port.
pub async fn start_origin(reply: OriginReply) -> (SocketAddr, SeenRequests) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen: SeenRequests = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let reply = reply.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let text = String::from_utf8_lossy(&head).to_ascii_lowercase();
                let body_len = text
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                let head_end = head.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
                let mut received = head.len() - head_end;
                while received < body_len {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => received += n,
                    }
                }
                log.lock().unwrap().push(text);

                let mut response = format!("HTTP/1.1 {}\r\nConnection: close\r\n", reply.status);
                for (name, value) in &reply.headers {
                    response.push_str(&format!("{}: {}\r\n", name, value));
                }
                response.push_str("\r\n");
                let _ = socket.write_all(response.as_bytes()).await;

                for part in &reply.parts {
                    let _ = socket.write_all(part).await;
                    let _ = socket.flush().await;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, seen)
}

/// Start an origin that writes `reply`, if any, and then stalls with the
/// connection open. Each time the edge closes an origin connection, a unit
/// is sent on the returned receiver.
pub async fn start_stalling_origin(
    reply: Option<OriginReply>,
) -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (released_tx, released_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let reply = reply.clone();
            let released = released_tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let mut head = Vec::new();
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }

                if let Some(reply) = reply {
                    let mut response = format!("HTTP/1.1 {}\r\n", reply.status);
                    for (name, value) in &reply.headers {
                        response.push_str(&format!("{}: {}\r\n", name, value));
                    }
                    response.push_str("\r\n");
                    let _ = socket.write_all(response.as_bytes()).await;
                    for part in &reply.parts {
                        let _ = socket.write_all(part).await;
                    }
                    let _ = socket.flush().await;
                }

                // Never send anything else; wait for the edge to hang up.
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
                let _ = released.send(());
            });
        }
    });

    (addr, released_rx)
}

/// An address with nothing listening on it.
pub async fn dead_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start the edge in front of `origin`. Returns its address and the
/// coordinator that stops it.
pub async fn start_edge(origin: SocketAddr) -> (SocketAddr, Shutdown) {
    let mut config = EdgeConfig::default();
    config.origin.address = origin.to_string();
    config.observability.metrics_enabled = false;
    start_edge_with(config).await
}

pub async fn start_edge_with(config: EdgeConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    (addr, shutdown)
}

/// A client that neither pools nor follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// Pull the nonce out of a `'nonce-…'` source in a CSP header.
pub fn nonce_from_policy(policy: &str) -> String {
    let start = policy.find("'nonce-").expect("policy has a nonce") + "'nonce-".len();
    let end = policy[start..].find('\'').unwrap() + start;
    policy[start..end].to_string()
}
