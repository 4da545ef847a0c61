//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let addresses = [
        ("coap.bind_address", &config.coap.bind_address, config.mode.runs_coap()),
        ("http.bind_address", &config.http.bind_address, config.mode.runs_http()),
        (
            "observability.metrics_address",
            &config.observability.metrics_address,
            config.observability.metrics_enabled,
        ),
    ];
    for (field, address, in_use) in addresses {
        if in_use && address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(field, format!("invalid address `{}`", address)));
        }
    }

    let positive = [
        ("coap.ack_timeout_ms", config.coap.ack_timeout_ms),
        ("timeouts.connect_ms", config.timeouts.connect_ms),
        ("timeouts.socket_ms", config.timeouts.socket_ms),
        ("timeouts.request_ms", config.timeouts.request_ms),
        ("timeouts.keep_alive_ms", config.timeouts.keep_alive_ms),
        ("http.max_body_bytes", config.http.max_body_bytes as u64),
        ("http.request_timeout_ms", config.http.request_timeout_ms),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if config.coap.max_retransmit > 20 {
        errors.push(ValidationError::new("coap.max_retransmit", "must be at most 20"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
