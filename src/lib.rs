//! CoAP ↔ HTTP cross-protocol gateway library.

pub mod coap;
pub mod config;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod mapping;
pub mod observability;
pub mod pool;
pub mod resolver;
pub mod translate;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::{Gateway, Shutdown};
