//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber for the binary
//! - Resolve the filter from `RUST_LOG`, falling back to the configured level
//!
//! # Design Decisions
//! - Called once by `main`; library code never installs subscribers
//! - `try_init` so tests and embedders that already installed one are left alone

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directives when neither `RUST_LOG` nor a level is configured.
const DEFAULT_DIRECTIVES: &str = "handler_bridge=info,tower_http=info";

/// Build the filter used by [`init_logging`].
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if level.trim().is_empty() {
            EnvFilter::new(DEFAULT_DIRECTIVES)
        } else {
            EnvFilter::new(format!("handler_bridge={},tower_http={}", level, level))
        }
    })
}

/// Install the fmt subscriber. Returns false when one was already installed.
pub fn init_logging(level: &str) -> bool {
    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
