//! Forwarding resources.
//!
//! # Data Flow
//! ```text
//! CoapRequest (Proxy-Uri)
//!     → ForwardingResource::forward
//!         → translate → acquire pooled handle → submit
//!         → terminal event → translate back → Completer::complete
//!     → PendingResponse resolves; handle returns to the pool
//! ```
//!
//! # Design Decisions
//! - Requests without a Proxy-Uri are answered with 4.02 before any pool access
//! - Every failure resolves the pending response where it is detected
//! - Inbound cancellation is not propagated to the outbound leg

pub mod coap_client;
pub mod error;
pub mod http_client;
pub mod pending;

use crate::coap::message::CoapRequest;

pub use coap_client::ProxyCoapClient;
pub use error::GatewayError;
pub use http_client::ProxyHttpClient;
pub use pending::{channel, Completer, PendingResponse};

/// Turns an inbound request into an outbound call.
pub trait ForwardingResource: Send + Sync {
    fn name(&self) -> &str;

    /// Forward `request` to the target named by its Proxy-Uri.
    fn forward(&self, request: CoapRequest) -> PendingResponse;
}

/// Resolve immediately with the response for `err`, logging by severity.
pub(crate) fn reject(resource: &str, request: &CoapRequest, err: GatewayError) -> PendingResponse {
    if err.is_client_error() {
        tracing::warn!(resource = %resource, request = %request, error = %err, "Rejecting request");
    } else {
        tracing::error!(resource = %resource, request = %request, error = %err, "Forwarding failed");
    }
    PendingResponse::ready(err.to_response())
}
