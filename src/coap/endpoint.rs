//! Outbound CoAP transport interface.
//!
//! # Responsibilities
//! - Define what the gateway needs from a CoAP message layer
//! - Deliver lifecycle events for each submitted request
//!
//! # Design Decisions
//! - Terminal callbacks take `Box<Self>`: exactly one of them can run
//! - Retransmission is informational and may fire any number of times first
//! - `send_request` never blocks; events arrive on the transport's own tasks
//! - Observers are `Sync`: transports hold them by reference across awaits

use crate::coap::message::{CoapRequest, CoapResponse};

/// Receives the lifecycle events of one outbound request.
pub trait MessageObserver: Send + Sync + 'static {
    /// A response arrived.
    fn on_response(self: Box<Self>, response: CoapResponse);

    /// The peer answered with a reset, or the request could not be sent.
    fn on_reject(self: Box<Self>);

    /// Retransmissions were exhausted without a response.
    fn on_timeout(self: Box<Self>);

    /// The transport gave up on the request (e.g. it is shutting down).
    fn on_cancel(self: Box<Self>);

    /// The request was sent again.
    fn on_retransmission(&self) {}
}

/// A handle able to send CoAP requests.
///
/// Implementations are pooled by the gateway and used by one in-flight
/// request at a time, but must still be `Sync` so the pool can hand them
/// between tasks.
pub trait CoapEndpoint: Send + Sync {
    /// Submit `request` to its destination and report the outcome to `observer`.
    fn send_request(&self, request: CoapRequest, observer: Box<dyn MessageObserver>);
}
