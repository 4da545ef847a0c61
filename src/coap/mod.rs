//! CoAP message model and minimal transport.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     UDP datagram → codec.rs → server.rs → Exchange → ProxyResolver
//!
//! Outbound:
//!     CoapRequest → CoapEndpoint (udp.rs) → codec.rs → UDP
//!     → MessageObserver event (response / reject / timeout / cancel)
//! ```

pub mod codec;
pub mod endpoint;
pub mod exchange;
pub mod message;
pub mod option;
pub mod server;
pub mod udp;

pub use endpoint::{CoapEndpoint, MessageObserver};
pub use exchange::Exchange;
pub use message::{CoapRequest, CoapResponse, Code, Destination, MessageType};
pub use option::OptionSet;
