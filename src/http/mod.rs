//! HTTP ingress subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, route by prefix)
//!     → request.rs (request ID)
//!     → translate: HTTP request → CoAP request
//!     → RequestHandler (ProxyResolver) → PendingResponse
//!     → translate: CoAP response → HTTP response
//!     → response.rs (local errors, info page)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::HttpServer;
