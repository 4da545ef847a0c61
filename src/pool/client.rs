//! Pool of outbound HTTP clients.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};

use crate::config::TimeoutConfig;
use crate::pool::ResourcePool;

pub type HttpClient = Client<HttpConnector, Body>;
pub type HttpClientPool = ResourcePool<HttpClient>;

/// Build a client with the configured connect timeout and keep-alive.
pub fn build_client(timeouts: &TimeoutConfig) -> HttpClient {
    let keep_alive = Duration::from_millis(timeouts.keep_alive_ms);

    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_millis(timeouts.connect_ms)));
    connector.set_keepalive(Some(keep_alive));
    connector.set_nodelay(true);

    Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(keep_alive)
        .build(connector)
}

pub fn http_client_pool(capacity: usize, timeouts: &TimeoutConfig) -> Arc<HttpClientPool> {
    let timeouts = timeouts.clone();
    ResourcePool::new("http_clients", capacity, move || build_client(&timeouts))
}
