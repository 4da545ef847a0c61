//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured filter
//! - Human-readable fmt output with targets

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `default_filter` applies when `RUST_LOG`
/// is unset or invalid.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
