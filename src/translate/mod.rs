//! Message translation between CoAP and HTTP.
//!
//! # Data Flow
//! ```text
//! CoAP request (Proxy-Uri) → coap.rs::coap_to_coap        → CoAP request (destination)
//! CoAP request             → http.rs::coap_to_http_request → HTTP request
//! HTTP response            → http.rs::http_to_coap_response → CoAP response
//! HTTP request (ingress)   → http.rs::http_to_coap_request → CoAP request
//! CoAP response            → http.rs::coap_to_http_response → HTTP response
//! ```
//!
//! All functions are pure apart from the receipt timestamp.

pub mod coap;
pub mod error;
pub mod http;

pub use coap::{coap_to_coap, copy_response, COAP2HTTP_MARKER};
pub use error::TranslationError;
pub use http::{
    coap_to_http_request, coap_to_http_response, http_to_coap_request, http_to_coap_response,
};
