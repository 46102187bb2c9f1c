//! Registration store and execution resources.
//!
//! # Data Flow
//! ```text
//! assembling (single-threaded):
//!     bootstrap / Initializer → BridgeContext::add_handler / add_interceptor
//!         → HandlerRegistration (mappings, init params, flags)
//!
//! start():
//!     pending registrations → init hooks → RouteTable (ArcSwap)
//!
//! per request (concurrent):
//!     find_match(path) → MatchResult → WorkerPool::submit (blocking handlers)
//!
//! stop():
//!     handler destroy (LIFO) → interceptor destroy → listeners → pool shutdown
//! ```
//!
//! # Design Decisions
//! - Registrations are frozen into an immutable snapshot at start; reads never lock
//! - The worker pool is the only resource shared mutably at request time

pub mod dispatcher;
pub mod executor;
pub mod factory;
pub mod registration;
pub mod store;

pub use dispatcher::RequestDispatcher;
pub use executor::{PoolError, WorkerPool};
pub use factory::ComponentRegistry;
pub use registration::{
    HandlerRegistration, InterceptorRegistration, RegisteredHandler, RegisteredInterceptor,
};
pub use store::BridgeContext;
