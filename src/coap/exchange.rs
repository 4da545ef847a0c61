//! Inbound request/response exchange.

use std::net::SocketAddr;

use tokio::sync::oneshot;

use crate::coap::message::{CoapRequest, CoapResponse};

/// One inbound request awaiting its response.
///
/// `respond` consumes the exchange, so a response is written at most once.
/// Dropping an exchange without responding closes the receiver, which the
/// ingress turns into an internal error.
#[derive(Debug)]
pub struct Exchange {
    request: CoapRequest,
    source: Option<SocketAddr>,
    responder: oneshot::Sender<CoapResponse>,
}

impl Exchange {
    /// Create an exchange and the receiver its response will arrive on.
    pub fn new(request: CoapRequest) -> (Self, oneshot::Receiver<CoapResponse>) {
        let (responder, rx) = oneshot::channel();
        (
            Self {
                request,
                source: None,
                responder,
            },
            rx,
        )
    }

    pub fn with_source(mut self, source: SocketAddr) -> Self {
        self.source = Some(source);
        self
    }

    pub fn request(&self) -> &CoapRequest {
        &self.request
    }

    pub fn source(&self) -> Option<SocketAddr> {
        self.source
    }

    /// Complete the exchange.
    pub fn respond(self, response: CoapResponse) {
        if self.responder.send(response).is_err() {
            tracing::debug!(request = %self.request, "Exchange receiver gone, response dropped");
        }
    }
}
