use axum::http::StatusCode;
use thiserror::Error;

use crate::coap::message::{CoapResponse, Code};
use crate::translate::TranslationError;

/// Failure of a forwarded request, as seen by the client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("missing proxy target")]
    MissingProxyTarget,

    #[error("malformed proxy target: {0}")]
    MalformedProxyTarget(String),

    #[error("unsupported method {0}")]
    UnsupportedMethod(String),

    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),

    #[error("translation failed: {0}")]
    Translation(TranslationError),

    #[error("upstream timed out")]
    UpstreamTimeout,

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn coap_code(&self) -> Code {
        match self {
            GatewayError::MissingProxyTarget | GatewayError::MalformedProxyTarget(_) => {
                Code::BAD_OPTION
            }
            GatewayError::UnsupportedMethod(_) => Code::METHOD_NOT_ALLOWED,
            GatewayError::Translation(TranslationError::UnsupportedMediaType(_)) => {
                Code::UNSUPPORTED_CONTENT_FORMAT
            }
            GatewayError::UnsupportedScheme(_) | GatewayError::Translation(_) => Code::BAD_GATEWAY,
            GatewayError::UpstreamTimeout => Code::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnreachable(_) | GatewayError::Cancelled => {
                Code::SERVICE_UNAVAILABLE
            }
            GatewayError::Internal(_) => Code::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            GatewayError::MissingProxyTarget | GatewayError::MalformedProxyTarget(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::UnsupportedMethod(_) => StatusCode::NOT_IMPLEMENTED,
            GatewayError::Translation(TranslationError::UnsupportedMediaType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            GatewayError::UnsupportedScheme(_) | GatewayError::Translation(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnreachable(_) | GatewayError::Cancelled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for errors caused by the request itself.
    pub fn is_client_error(&self) -> bool {
        self.coap_code().class() == 4
    }

    /// The CoAP response reporting this error, with a diagnostic payload.
    pub fn to_response(&self) -> CoapResponse {
        CoapResponse::new(self.coap_code()).with_payload(self.to_string())
    }
}

impl From<TranslationError> for GatewayError {
    fn from(err: TranslationError) -> Self {
        match err {
            TranslationError::MissingProxyTarget => GatewayError::MissingProxyTarget,
            TranslationError::MalformedProxyTarget(s) => GatewayError::MalformedProxyTarget(s),
            TranslationError::UnsupportedMethod(m) => GatewayError::UnsupportedMethod(m),
            TranslationError::UnsupportedScheme(s) => GatewayError::UnsupportedScheme(s),
            other => GatewayError::Translation(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_per_variant() {
        let cases = [
            (GatewayError::MissingProxyTarget, Code::BAD_OPTION, StatusCode::BAD_REQUEST),
            (
                GatewayError::MalformedProxyTarget("x".into()),
                Code::BAD_OPTION,
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::UnsupportedMethod("PATCH".into()),
                Code::METHOD_NOT_ALLOWED,
                StatusCode::NOT_IMPLEMENTED,
            ),
            (
                GatewayError::UnsupportedScheme("https".into()),
                Code::BAD_GATEWAY,
                StatusCode::BAD_GATEWAY,
            ),
            (
                GatewayError::Translation(TranslationError::UnsupportedMediaType("a/b".into())),
                Code::UNSUPPORTED_CONTENT_FORMAT,
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (GatewayError::UpstreamTimeout, Code::GATEWAY_TIMEOUT, StatusCode::GATEWAY_TIMEOUT),
            (
                GatewayError::UpstreamUnreachable("refused".into()),
                Code::SERVICE_UNAVAILABLE,
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (GatewayError::Cancelled, Code::SERVICE_UNAVAILABLE, StatusCode::SERVICE_UNAVAILABLE),
            (
                GatewayError::Internal("bug".into()),
                Code::INTERNAL_SERVER_ERROR,
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.coap_code(), code, "{}", err);
            assert_eq!(err.http_status(), status, "{}", err);
        }
    }

    #[test]
    fn translation_errors_convert() {
        assert_eq!(
            GatewayError::from(TranslationError::MissingProxyTarget),
            GatewayError::MissingProxyTarget
        );
        let err = GatewayError::from(TranslationError::InvalidMessage("x".into()));
        assert_eq!(err.coap_code(), Code::BAD_GATEWAY);
        assert!(GatewayError::MissingProxyTarget.is_client_error());
        assert!(!GatewayError::UpstreamTimeout.is_client_error());
    }
}
