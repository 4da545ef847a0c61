use thiserror::Error;

/// Why a message could not be translated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("request carries no proxy target")]
    MissingProxyTarget,

    #[error("malformed proxy target: {0}")]
    MalformedProxyTarget(String),

    #[error("method {0} has no mapping")]
    UnsupportedMethod(String),

    #[error("media type {0} has no mapping")]
    UnsupportedMediaType(String),

    #[error("scheme {0} is not supported")]
    UnsupportedScheme(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
