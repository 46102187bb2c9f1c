//! Handler bridge library.
//!
//! Runs blocking, register-by-path handlers and interceptors on a non-blocking Axum host.
//! Handlers either finish on a worker pool thread or suspend through an async continuation
//! and complete the response from anywhere.

// Core subsystems
pub mod api;
pub mod config;
pub mod context;
pub mod http;
pub mod routing;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub mod samples;

pub use api::{AsyncEvent, AsyncListener, ContextListener, Handler, HandlerConfig, Initializer, Interceptor};
pub use config::schema::BridgeConfig;
pub use context::{BridgeContext, ComponentRegistry};
pub use error::{BridgeError, BridgeResult, HandlerError};
pub use http::{AsyncContinuation, HttpServer, InterceptorChain, RequestAdapter, ResponseAdapter};
pub use lifecycle::Shutdown;
