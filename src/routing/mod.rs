//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → strip context path (context/store.rs)
//!     → router.rs (scan handlers in registration order)
//!     → matcher.rs (evaluate each mapping pattern)
//!     → Return: MatchResult { handler, interceptors, servlet_path } or None
//!
//! Route compilation (at start()):
//!     pending registrations
//!     → classify patterns into Mapping values
//!     → freeze as immutable RouteTable, swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Routes frozen at startup, immutable at runtime
//! - No regex: prefix, extension, exact and default shapes only
//! - Deterministic: same input always matches same handler
//! - First registered handler wins

pub mod matcher;
pub mod router;

pub use matcher::{match_mapping, Mapping, DEFAULT_MAPPING};
pub use router::{MatchResult, RouteTable};
