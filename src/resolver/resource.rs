//! Locally served CoAP resources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::coap::exchange::Exchange;
use crate::coap::message::{CoapResponse, Code};
use crate::forward::ForwardingResource;
use crate::mapping::table::media;
use crate::resolver::relay;

/// A named resource answering exchanges addressed to it.
pub trait Resource: Send + Sync {
    fn name(&self) -> &str;

    /// Handle the exchange; it must eventually be responded to.
    fn handle(&self, exchange: Exchange);
}

/// Exposes a forwarding resource under its own name.
pub struct ForwardingEntry {
    forwarder: Arc<dyn ForwardingResource>,
}

impl ForwardingEntry {
    pub fn new(forwarder: Arc<dyn ForwardingResource>) -> Self {
        Self { forwarder }
    }
}

impl Resource for ForwardingEntry {
    fn name(&self) -> &str {
        self.forwarder.name()
    }

    fn handle(&self, exchange: Exchange) {
        relay(self.forwarder.as_ref(), exchange);
    }
}

/// Demo resource answering "Response N from resource <name>".
pub struct TargetResource {
    name: String,
    served: AtomicU64,
}

impl TargetResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            served: AtomicU64::new(0),
        }
    }
}

impl Resource for TargetResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, exchange: Exchange) {
        let n = self.served.fetch_add(1, Ordering::Relaxed) + 1;
        let response = CoapResponse::new(Code::CONTENT)
            .with_content_format(media::TEXT_PLAIN)
            .with_payload(format!("Response {} from resource {}", n, self.name));
        exchange.respond(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coap::message::CoapRequest;

    #[tokio::test]
    async fn target_counts_requests() {
        let resource = TargetResource::new("target");
        for expected in 1..=3 {
            let (exchange, rx) = Exchange::new(CoapRequest::get());
            resource.handle(exchange);
            let response = rx.await.unwrap();
            assert_eq!(
                response.payload_text(),
                format!("Response {} from resource target", expected)
            );
            assert_eq!(response.options.content_format(), Some(media::TEXT_PLAIN));
        }
    }
}
