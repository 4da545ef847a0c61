//! Inbound request resolution.
//!
//! # Data Flow
//! ```text
//! Exchange
//!     → first Uri-Path segment names a registered resource? → Resource::handle
//!     → Proxy-Uri present?  → forwarder for its route, else the default forwarder
//!                             (a leading `coap2http/` routes as http)
//!     → otherwise           → 4.04
//! ```
//!
//! # Design Decisions
//! - Resources are registered explicitly at startup; the map is immutable after
//! - Forwarded exchanges are relayed on a spawned task so dispatch never waits

pub mod resource;

use std::collections::HashMap;
use std::sync::Arc;

use crate::coap::exchange::Exchange;
use crate::coap::message::{CoapRequest, CoapResponse, Code};
use crate::forward::{ForwardingResource, PendingResponse};
use crate::translate::COAP2HTTP_MARKER;

pub use resource::{ForwardingEntry, Resource, TargetResource};

/// Accepts translated requests and answers them asynchronously.
pub trait RequestHandler: Send + Sync {
    fn handle_request(&self, request: CoapRequest) -> PendingResponse;
}

/// Picks a local resource or a forwarder for each inbound exchange.
#[derive(Default)]
pub struct ProxyResolver {
    resources: HashMap<String, Arc<dyn Resource>>,
    schemes: HashMap<String, Arc<dyn ForwardingResource>>,
    default_forwarder: Option<Arc<dyn ForwardingResource>>,
}

impl ProxyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource under its name.
    pub fn register(mut self, resource: Arc<dyn Resource>) -> Self {
        tracing::debug!(resource = %resource.name(), "Resource registered");
        self.resources.insert(resource.name().to_string(), resource);
        self
    }

    /// Forward Proxy-Uri requests whose URI uses `scheme` to `forwarder`.
    pub fn forward_scheme(mut self, scheme: &str, forwarder: Arc<dyn ForwardingResource>) -> Self {
        self.schemes.insert(scheme.to_ascii_lowercase(), forwarder);
        self
    }

    /// Forwarder for Proxy-Uri requests no scheme route claims.
    pub fn forward_by_default(mut self, forwarder: Arc<dyn ForwardingResource>) -> Self {
        self.default_forwarder = Some(forwarder);
        self
    }

    pub fn resource(&self, name: &str) -> Option<&Arc<dyn Resource>> {
        self.resources.get(name)
    }

    /// Route one exchange; the response is written exactly once.
    pub fn dispatch(&self, exchange: Exchange) {
        let request = exchange.request();

        let local = request
            .options
            .uri_path()
            .first()
            .and_then(|segment| self.resources.get(segment))
            .cloned();
        if let Some(resource) = local {
            tracing::debug!(resource = %resource.name(), request = %request, "Dispatching to resource");
            resource.handle(exchange);
            return;
        }

        if let Some(proxy_uri) = request.options.proxy_uri() {
            let forwarder = route_of(proxy_uri)
                .and_then(|scheme| self.schemes.get(&scheme))
                .or(self.default_forwarder.as_ref())
                .cloned();
            match forwarder {
                Some(forwarder) => relay(forwarder.as_ref(), exchange),
                None => {
                    tracing::warn!(request = %request, "No forwarder configured");
                    exchange.respond(CoapResponse::new(Code::PROXYING_NOT_SUPPORTED));
                }
            }
            return;
        }

        tracing::debug!(request = %request, "No resource found");
        exchange.respond(CoapResponse::new(Code::NOT_FOUND));
    }
}

impl RequestHandler for ProxyResolver {
    fn handle_request(&self, request: CoapRequest) -> PendingResponse {
        let (exchange, rx) = Exchange::new(request);
        self.dispatch(exchange);
        PendingResponse::from(rx)
    }
}

/// Forward the exchange's request and answer it when the result arrives.
pub(crate) fn relay(forwarder: &dyn ForwardingResource, exchange: Exchange) {
    let pending = forwarder.forward(exchange.request().clone());
    tokio::spawn(async move {
        let response = pending.await;
        exchange.respond(response);
    });
}

/// Scheme route for a Proxy-Uri. A bare `coap2http/<uri>` addresses this
/// gateway's own cross-proxy and routes as http.
fn route_of(proxy_uri: &str) -> Option<String> {
    if proxy_uri.starts_with(COAP2HTTP_MARKER) {
        return Some("http".to_string());
    }
    scheme_of(proxy_uri)
}

/// Lowercase scheme of an absolute URI, if it has a plausible one.
fn scheme_of(uri: &str) -> Option<String> {
    let (scheme, _) = uri.split_once("://")?;
    let valid = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| scheme.to_ascii_lowercase())
}
