//! Error types shared across the bridge.
//!
//! # Taxonomy
//! - `HandlerError`: raised while servicing a request. Recovered locally by turning it
//!   into a 500 response carrying the message.
//! - `BridgeError`: configuration and startup failures. The only errors allowed to
//!   reach the application boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::context::executor::PoolError;

/// Errors raised by handlers, interceptors and the adapters they talk to.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Generic processing failure reported by user code.
    #[error("{0}")]
    Processing(String),

    /// I/O failure while reading the request or writing the response.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Operation not allowed in the current response/async state.
    #[error("{0}")]
    IllegalState(String),

    /// Header name or value that cannot be represented on the wire.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// User code panicked.
    #[error("{0}")]
    Panicked(String),

    /// Every handle to the response was dropped before it was completed.
    #[error("response abandoned before completion")]
    Abandoned,

    /// The worker pool refused the task.
    #[error(transparent)]
    Rejected(#[from] PoolError),
}

impl HandlerError {
    /// Shorthand for a processing error.
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing(message.into())
    }

    /// Build an error from a panic payload caught with `catch_unwind`.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self::Panicked(message)
    }

    /// Status code used when this error is rendered for the client.
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Rejected(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Run user code, turning a panic into `HandlerError::Panicked`.
pub(crate) fn guard<T>(f: impl FnOnce() -> Result<T, HandlerError>) -> Result<T, HandlerError> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload)))
}

/// Errors raised while configuring, starting or wiring the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No factory registered under the configured identifier.
    #[error("unknown {kind} class '{class_name}'")]
    UnknownClass { kind: &'static str, class_name: String },

    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A handler or interceptor init hook failed.
    #[error("failed to initialize '{name}': {source}")]
    Init {
        name: String,
        #[source]
        source: HandlerError,
    },

    /// A startup initializer failed.
    #[error("initializer '{name}' failed: {source}")]
    Initializer {
        name: String,
        #[source]
        source: HandlerError,
    },

    /// The worker pool could not be built.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// No registered handler serves the given path.
    #[error("no handler matches path '{0}'")]
    NoMatch(String),
}

/// Result type for startup and wiring operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
