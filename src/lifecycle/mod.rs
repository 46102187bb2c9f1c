//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     BridgeConfig + ComponentRegistry
//!         → create context → register listeners/handlers/interceptors
//!         → run initializers → start() (init hooks, route table published)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → context.stop()
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then registrations, then listeners
//! - Any startup error is fatal; nothing is served from a half-started context
//! - Ordered shutdown: stop accept, drain, destroy components

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::bootstrap;
