//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Which ingress servers to run.
    pub mode: Mode,

    /// CoAP ingress and transmission settings.
    pub coap: CoapConfig,

    /// HTTP ingress settings.
    pub http: HttpConfig,

    /// Outbound handle pool sizes.
    pub pools: PoolConfig,

    /// Outbound HTTP timeouts.
    pub timeouts: TimeoutConfig,

    /// Optional overrides for the protocol mapping tables.
    pub mapping: MappingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// CoAP ingress only.
    Coap,
    /// HTTP ingress only.
    Http,
    /// Both ingress servers.
    #[default]
    Both,
}

impl Mode {
    pub fn runs_coap(self) -> bool {
        matches!(self, Mode::Coap | Mode::Both)
    }

    pub fn runs_http(self) -> bool {
        matches!(self, Mode::Http | Mode::Both)
    }
}

/// CoAP settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoapConfig {
    /// Bind address of the CoAP ingress (e.g., "0.0.0.0:5683").
    pub bind_address: String,

    /// Initial ACK timeout for outbound CON requests, in milliseconds.
    pub ack_timeout_ms: u64,

    /// Retransmissions before an outbound request times out.
    pub max_retransmit: u32,
}

impl Default for CoapConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5683".to_string(),
            ack_timeout_ms: 2000,
            max_retransmit: 4,
        }
    }
}

/// HTTP ingress settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request or response body accepted, in bytes.
    pub max_body_bytes: usize,

    /// Deadline for a whole ingress request, in milliseconds. Covers a CoAP
    /// exchange with every retransmission.
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
            request_timeout_ms: 95_000,
        }
    }
}

/// Pool capacities.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    pub coap_endpoints: usize,
    pub http_clients: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            coap_endpoints: 40,
            http_clients: 10,
        }
    }
}

/// Timeout configuration for outbound HTTP.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Deadline for reading the response body, in milliseconds.
    pub socket_ms: u64,

    /// Deadline for the response head, in milliseconds.
    pub request_ms: u64,

    /// Idle keep-alive for pooled connections, in milliseconds.
    pub keep_alive_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 1000,
            socket_ms: 500,
            request_ms: 5000,
            keep_alive_ms: 5000,
        }
    }
}

/// Mapping table overrides.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MappingConfig {
    /// Properties file overlaid on the built-in tables.
    pub properties_file: Option<PathBuf>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Prometheus listen address (e.g., "0.0.0.0:9090").
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "coap_gateway=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: GatewayConfig = toml::from_str("mode = \"http\"\n[pools]\nhttp_clients = 3\n").unwrap();
        assert_eq!(config.mode, Mode::Http);
        assert!(!config.mode.runs_coap());
        assert_eq!(config.pools.http_clients, 3);
        assert_eq!(config.pools.coap_endpoints, 40);
        assert_eq!(config.timeouts.connect_ms, 1000);
        assert_eq!(config.timeouts.keep_alive_ms, 5000);
        assert!(config.mapping.properties_file.is_none());
    }
}
