//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use coap_gateway::coap::{CoapEndpoint, CoapRequest, CoapResponse, MessageObserver};
use coap_gateway::config::GatewayConfig;
use coap_gateway::http::HttpServer;
use coap_gateway::lifecycle::{Gateway, Shutdown};
use coap_gateway::pool::{CoapEndpointPool, ResourcePool};
use coap_gateway::resolver::RequestHandler;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Start a simple mock backend that returns a fixed 200 response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, response.to_string()) }).await
}

/// Start a programmable mock backend with async support.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    201 => "201 Created",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });

    addr
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

/// How a [`MockEndpoint`] answers.
#[derive(Clone)]
pub enum Behavior {
    Respond(CoapResponse),
    Reject,
    Timeout,
}

/// A CoAP endpoint that answers immediately and records what it was sent.
pub struct MockEndpoint {
    behavior: Behavior,
    submissions: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<CoapRequest>>>,
}

impl CoapEndpoint for MockEndpoint {
    fn send_request(&self, request: CoapRequest, observer: Box<dyn MessageObserver>) {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(request);
        match &self.behavior {
            Behavior::Respond(response) => observer.on_response(response.clone()),
            Behavior::Reject => observer.on_reject(),
            Behavior::Timeout => {
                observer.on_retransmission();
                observer.on_timeout()
            }
        }
    }
}

/// Endpoint pool backed by mocks, plus the shared submission log.
pub struct MockPool {
    pub pool: Arc<CoapEndpointPool>,
    pub submissions: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<CoapRequest>>>,
}

impl MockPool {
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn last_sent(&self) -> Option<CoapRequest> {
        self.sent.lock().unwrap().last().cloned()
    }
}

pub fn mock_pool(capacity: usize, behavior: Behavior) -> MockPool {
    let submissions = Arc::new(AtomicUsize::new(0));
    let sent = Arc::new(Mutex::new(Vec::new()));
    let (s, l) = (submissions.clone(), sent.clone());
    let pool = ResourcePool::new("coap_endpoints", capacity, move || {
        Arc::new(MockEndpoint {
            behavior: behavior.clone(),
            submissions: s.clone(),
            sent: l.clone(),
        }) as Arc<dyn CoapEndpoint>
    });
    MockPool {
        pool,
        submissions,
        sent,
    }
}

/// Run the HTTP ingress of a gateway built around `pool` on an ephemeral port.
pub async fn start_http_gateway(
    config: GatewayConfig,
    pool: Arc<CoapEndpointPool>,
) -> (SocketAddr, Shutdown) {
    let gateway = Gateway::with_endpoint_pool(&config, pool).unwrap();
    let handler: Arc<dyn RequestHandler> = gateway.resolver.clone();
    let server = HttpServer::new(&config, gateway.table.clone(), handler);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
