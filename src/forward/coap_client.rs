//! Forwarding to CoAP servers.

use std::sync::Arc;
use std::time::Instant;

use crate::coap::endpoint::{CoapEndpoint, MessageObserver};
use crate::coap::message::{CoapRequest, CoapResponse, Code};
use crate::forward::pending::{channel, Completer};
use crate::forward::{reject, ForwardingResource, GatewayError, PendingResponse};
use crate::observability::metrics;
use crate::pool::{CoapEndpointPool, Pooled};
use crate::translate::{coap_to_coap, copy_response};

const VARIANT: &str = "coap";

/// Forwards proxied requests to CoAP servers through pooled endpoints.
pub struct ProxyCoapClient {
    name: String,
    pool: Arc<CoapEndpointPool>,
}

impl ProxyCoapClient {
    pub fn new(name: impl Into<String>, pool: Arc<CoapEndpointPool>) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }
}

impl ForwardingResource for ProxyCoapClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, request: CoapRequest) -> PendingResponse {
        if !request.options.has_proxy_uri() {
            return reject(&self.name, &request, GatewayError::MissingProxyTarget);
        }

        let outgoing = match coap_to_coap(&request) {
            Ok(r) => r,
            Err(e) => return reject(&self.name, &request, e.into()),
        };

        let endpoint = self.pool.acquire();

        let valid = outgoing
            .destination
            .as_ref()
            .is_some_and(|d| !d.host.is_empty() && d.port != 0);
        if !valid {
            tracing::error!(
                resource = %self.name,
                request = %outgoing,
                "Translated request has no usable destination"
            );
            return PendingResponse::ready(CoapResponse::new(Code::INTERNAL_SERVER_ERROR));
        }

        tracing::debug!(resource = %self.name, request = %outgoing, "Forwarding to CoAP server");

        let (completer, pending) = channel();
        let handle: Arc<dyn CoapEndpoint> = Arc::clone(&endpoint);
        let observer = ForwardObserver {
            target: outgoing.to_string(),
            completer,
            started: Instant::now(),
            _endpoint: endpoint,
        };
        handle.send_request(outgoing, Box::new(observer));
        pending
    }
}

/// Collapses endpoint events into the pending response and holds the pooled
/// endpoint until a terminal event drops it.
struct ForwardObserver {
    target: String,
    completer: Completer,
    started: Instant,
    _endpoint: Pooled<Arc<dyn CoapEndpoint>>,
}

impl ForwardObserver {
    fn finish(self, response: CoapResponse) {
        metrics::record_forward(VARIANT, response.code, self.started);
        self.completer.complete(response);
    }

    fn fail(self, event: &str) {
        tracing::warn!(dest = %self.target, event, "CoAP request failed");
        self.finish(CoapResponse::new(Code::GATEWAY_TIMEOUT));
    }
}

impl MessageObserver for ForwardObserver {
    fn on_response(self: Box<Self>, response: CoapResponse) {
        tracing::debug!(dest = %self.target, response = %response, "CoAP response received");
        self.finish(copy_response(&response));
    }

    fn on_reject(self: Box<Self>) {
        self.fail("reject");
    }

    fn on_timeout(self: Box<Self>) {
        self.fail("timeout");
    }

    fn on_cancel(self: Box<Self>) {
        self.fail("cancel");
    }

    fn on_retransmission(&self) {
        tracing::debug!(dest = %self.target, "CoAP request retransmitted");
    }
}
