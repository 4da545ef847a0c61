//! Pool of outbound CoAP endpoints.

use std::sync::Arc;

use crate::coap::endpoint::CoapEndpoint;
use crate::coap::udp::{TransmissionParams, UdpEndpoint};
use crate::pool::ResourcePool;

pub type CoapEndpointPool = ResourcePool<Arc<dyn CoapEndpoint>>;

/// Pool of UDP endpoints, each with its own socket.
pub fn coap_endpoint_pool(capacity: usize, params: TransmissionParams) -> Arc<CoapEndpointPool> {
    ResourcePool::new("coap_endpoints", capacity, move || {
        Arc::new(UdpEndpoint::new(params)) as Arc<dyn CoapEndpoint>
    })
}
