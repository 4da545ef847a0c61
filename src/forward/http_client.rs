//! Forwarding to HTTP origin servers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use tokio::time;

use crate::coap::message::CoapRequest;
use crate::coap::option;
use crate::config::TimeoutConfig;
use crate::forward::pending::{channel, Completer};
use crate::forward::{reject, ForwardingResource, GatewayError, PendingResponse};
use crate::mapping::MappingTable;
use crate::observability::metrics;
use crate::pool::HttpClientPool;
use crate::translate::coap::percent_decode;
use crate::translate::{coap_to_http_request, http_to_coap_response, COAP2HTTP_MARKER};

const VARIANT: &str = "http";

/// Forwards proxied requests to HTTP servers through pooled clients.
pub struct ProxyHttpClient {
    name: String,
    table: Arc<MappingTable>,
    pool: Arc<HttpClientPool>,
    request_timeout: Duration,
    body_timeout: Duration,
    max_body: usize,
}

impl ProxyHttpClient {
    pub fn new(
        name: impl Into<String>,
        table: Arc<MappingTable>,
        pool: Arc<HttpClientPool>,
        timeouts: &TimeoutConfig,
        max_body: usize,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            pool,
            request_timeout: Duration::from_millis(timeouts.request_ms),
            body_timeout: Duration::from_millis(timeouts.socket_ms),
            max_body,
        }
    }

    fn target(request: &CoapRequest) -> Result<String, GatewayError> {
        let raw = request
            .options
            .first(option::PROXY_URI)
            .ok_or(GatewayError::MissingProxyTarget)?;
        let uri = percent_decode(raw)?;
        Ok(match uri.find(COAP2HTTP_MARKER) {
            Some(pos) => uri[pos + COAP2HTTP_MARKER.len()..].to_string(),
            None => uri,
        })
    }
}

impl ForwardingResource for ProxyHttpClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, request: CoapRequest) -> PendingResponse {
        let target = match Self::target(&request) {
            Ok(t) => t,
            Err(e) => return reject(&self.name, &request, e),
        };
        let http_request = match coap_to_http_request(&self.table, &request, &target) {
            Ok(r) => r,
            Err(e) => return reject(&self.name, &request, e.into()),
        };

        tracing::debug!(resource = %self.name, uri = %target, "Forwarding to HTTP server");

        let (completer, pending) = channel();
        let client = self.pool.acquire();
        let table = self.table.clone();
        let request_timeout = self.request_timeout;
        let body_timeout = self.body_timeout;
        let max_body = self.max_body;
        let exchange_completer = completer.clone();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = async {
                let response = time::timeout(request_timeout, client.request(http_request))
                    .await
                    .map_err(|_| GatewayError::UpstreamTimeout)?
                    .map_err(|e| {
                        if e.is_connect() {
                            GatewayError::UpstreamUnreachable(e.to_string())
                        } else {
                            GatewayError::Internal(e.to_string())
                        }
                    })?;
                // The client is not needed while the body streams in.
                drop(client);

                let (parts, body) = response.into_parts();
                let body = time::timeout(body_timeout, axum::body::to_bytes(Body::new(body), max_body))
                    .await
                    .map_err(|_| GatewayError::UpstreamTimeout)?
                    .map_err(|e| GatewayError::Internal(e.to_string()))?;
                Ok::<_, GatewayError>(http_to_coap_response(
                    &table,
                    parts.status,
                    &parts.headers,
                    body,
                    &request,
                ))
            }
            .await;

            let response = match outcome {
                Ok(response) => {
                    tracing::debug!(uri = %target, response = %response, "HTTP response received");
                    response
                }
                Err(err) => {
                    tracing::warn!(uri = %target, error = %err, "HTTP request failed");
                    err.to_response()
                }
            };
            metrics::record_forward(VARIANT, response.code, started);
            exchange_completer.complete(response);
        });

        tokio::spawn(watch(task, completer));
        pending
    }
}

/// Resolve the pending response if the exchange task ends without doing so.
async fn watch(task: tokio::task::JoinHandle<()>, completer: Completer) {
    if let Err(e) = task.await {
        let err = if e.is_cancelled() {
            GatewayError::Cancelled
        } else {
            GatewayError::Internal("exchange task panicked".to_string())
        };
        if completer.complete(err.to_response()) {
            tracing::warn!(error = %err, "HTTP exchange ended without a response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_strips_marker_prefix() {
        let request = CoapRequest::get().with_proxy_uri("coap2http/http://example.org/robots.txt");
        assert_eq!(
            ProxyHttpClient::target(&request).unwrap(),
            "http://example.org/robots.txt"
        );

        let request = CoapRequest::get().with_proxy_uri("http%3A%2F%2Fexample.org%2F");
        assert_eq!(ProxyHttpClient::target(&request).unwrap(), "http://example.org/");
    }

    #[test]
    fn target_requires_proxy_uri() {
        assert_eq!(
            ProxyHttpClient::target(&CoapRequest::get()),
            Err(GatewayError::MissingProxyTarget)
        );
        let bad = CoapRequest::get().with_proxy_uri("http://x/%g1");
        assert!(matches!(
            ProxyHttpClient::target(&bad),
            Err(GatewayError::MalformedProxyTarget(_))
        ));
    }
}
