//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the mapping table (defaults plus optional overrides)
//! - Create the outbound pools
//! - Register forwarding and local resources with the resolver
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners are bound by the caller once assembly succeeds

use std::sync::Arc;

use thiserror::Error;

use crate::coap::udp::TransmissionParams;
use crate::config::GatewayConfig;
use crate::forward::{ForwardingResource, ProxyCoapClient, ProxyHttpClient};
use crate::mapping::{MappingError, MappingTable};
use crate::pool::{coap_endpoint_pool, http_client_pool, CoapEndpointPool, HttpClientPool};
use crate::resolver::{ForwardingEntry, ProxyResolver, TargetResource};

pub const COAP2COAP: &str = "coap2coap";
pub const COAP2HTTP: &str = "coap2http";
pub const TARGET: &str = "target";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("mapping: {0}")]
    Mapping(#[from] MappingError),
}

/// The assembled core, ready to be served.
pub struct Gateway {
    pub table: Arc<MappingTable>,
    pub coap_pool: Arc<CoapEndpointPool>,
    pub http_pool: Arc<HttpClientPool>,
    pub resolver: Arc<ProxyResolver>,
}

impl Gateway {
    /// Assemble the gateway with UDP endpoints.
    pub fn build(config: &GatewayConfig) -> Result<Self, StartupError> {
        let params = TransmissionParams {
            ack_timeout: std::time::Duration::from_millis(config.coap.ack_timeout_ms),
            max_retransmit: config.coap.max_retransmit,
        };
        let coap_pool = coap_endpoint_pool(config.pools.coap_endpoints, params);
        Self::with_endpoint_pool(config, coap_pool)
    }

    /// Assemble the gateway around an existing CoAP endpoint pool.
    pub fn with_endpoint_pool(
        config: &GatewayConfig,
        coap_pool: Arc<CoapEndpointPool>,
    ) -> Result<Self, StartupError> {
        let table = match &config.mapping.properties_file {
            Some(path) => MappingTable::load(path)?,
            None => MappingTable::builtin(),
        };
        let table = Arc::new(table);

        let http_pool = http_client_pool(config.pools.http_clients, &config.timeouts);

        let coap_forwarder: Arc<dyn ForwardingResource> =
            Arc::new(ProxyCoapClient::new(COAP2COAP, coap_pool.clone()));
        let http_forwarder: Arc<dyn ForwardingResource> = Arc::new(ProxyHttpClient::new(
            COAP2HTTP,
            table.clone(),
            http_pool.clone(),
            &config.timeouts,
            config.http.max_body_bytes,
        ));

        let resolver = ProxyResolver::new()
            .register(Arc::new(ForwardingEntry::new(coap_forwarder.clone())))
            .register(Arc::new(ForwardingEntry::new(http_forwarder.clone())))
            .register(Arc::new(TargetResource::new(TARGET)))
            .forward_scheme("http", http_forwarder)
            .forward_by_default(coap_forwarder);

        tracing::info!(
            coap_endpoints = coap_pool.capacity(),
            http_clients = http_pool.capacity(),
            "Gateway assembled"
        );

        Ok(Self {
            table,
            coap_pool,
            http_pool,
            resolver: Arc::new(resolver),
        })
    }
}
