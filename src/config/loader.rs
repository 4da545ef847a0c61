//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let config = parse_config(
            r#"
            mode = "both"

            [coap]
            bind_address = "127.0.0.1:5683"
            ack_timeout_ms = 1500

            [http]
            bind_address = "127.0.0.1:8080"

            [pools]
            coap_endpoints = 8

            [timeouts]
            request_ms = 2000

            [mapping]
            properties_file = "mapping.properties"
            "#,
        )
        .unwrap();
        assert_eq!(config.coap.ack_timeout_ms, 1500);
        assert_eq!(config.pools.coap_endpoints, 8);
        assert_eq!(config.timeouts.request_ms, 2000);
        assert_eq!(
            config.mapping.properties_file.as_deref(),
            Some(Path::new("mapping.properties"))
        );
    }

    #[test]
    fn validation_errors_are_collected() {
        let err = parse_config("[timeouts]\nconnect_ms = 0\nsocket_ms = 0\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        assert!(matches!(parse_config("mode = "), Err(ConfigError::Parse(_))));
        assert!(matches!(parse_config("mode = \"udp\""), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/gateway.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
