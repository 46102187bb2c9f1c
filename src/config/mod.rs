//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → lifecycle::startup::bootstrap builds the context from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; registrations are frozen at start()
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::BridgeConfig;
pub use schema::ContextConfig;
pub use schema::ExecutorConfig;
pub use schema::HandlerDescriptor;
pub use schema::InterceptorDescriptor;
pub use schema::KeepAlive;
pub use schema::ListenerConfig;
pub use schema::TimeUnit;
