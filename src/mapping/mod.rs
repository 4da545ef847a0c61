//! Protocol mapping tables.
//!
//! # Data Flow
//! ```text
//! built-in defaults (table.rs)
//!     → optional properties file (properties.rs) overlays entries
//!     → MappingTable (immutable)
//!     → shared via Arc with translators and forwarding resources
//! ```

pub mod properties;
pub mod table;

pub use properties::MappingError;
pub use table::MappingTable;
