//! The blocking handler contract.
//!
//! # Data Flow
//! ```text
//! startup:
//!     Initializer::on_startup(context)      → registers handlers/interceptors
//!     ContextListener::context_initialized  → once, before any init hook
//!     Interceptor::init / Handler::init     → with a HandlerConfig view
//!
//! per request:
//!     Interceptor::intercept(req, resp, chain)  → chain.proceed(...)
//!     Handler::service(req, resp)               → writes through the response
//!         └─ req.start_async() → AsyncListener callbacks
//!
//! shutdown:
//!     Handler::destroy (LIFO) → Interceptor::destroy → ContextListener::context_destroyed
//! ```
//!
//! Implementations are plain synchronous Rust. Handlers not flagged as async-capable run
//! on the bridge's worker pool, so they may block freely.

pub mod handler;
pub mod interceptor;
pub mod listener;

pub use handler::{Handler, HandlerConfig};
pub use interceptor::Interceptor;
pub use listener::{AsyncEvent, AsyncListener, ContextListener, Initializer};
