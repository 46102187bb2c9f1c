//! Lifecycle and async listener contracts.

use std::sync::Arc;

use crate::context::BridgeContext;
use crate::error::HandlerError;
use crate::http::{AsyncContinuation, RequestAdapter, ResponseAdapter};

/// Event delivered to async listeners.
///
/// Carries the request/response pair the listener was registered with, which may differ
/// from the pair the continuation was started with.
#[derive(Clone)]
pub struct AsyncEvent {
    continuation: AsyncContinuation,
    request: RequestAdapter,
    response: ResponseAdapter,
    error: Option<Arc<HandlerError>>,
}

impl AsyncEvent {
    pub(crate) fn new(
        continuation: AsyncContinuation,
        request: RequestAdapter,
        response: ResponseAdapter,
        error: Option<Arc<HandlerError>>,
    ) -> Self {
        Self {
            continuation,
            request,
            response,
            error,
        }
    }

    pub fn continuation(&self) -> &AsyncContinuation {
        &self.continuation
    }

    pub fn request(&self) -> &RequestAdapter {
        &self.request
    }

    pub fn response(&self) -> &ResponseAdapter {
        &self.response
    }

    /// The failure that triggered `on_error`, if any.
    pub fn error(&self) -> Option<&HandlerError> {
        self.error.as_deref()
    }
}

/// Observer of an async continuation.
///
/// Errors returned from callbacks are logged and swallowed.
pub trait AsyncListener: Send + Sync + 'static {
    fn on_start_async(&self, _event: &AsyncEvent) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_complete(&self, _event: &AsyncEvent) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_error(&self, _event: &AsyncEvent) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Never fired by the bridge: continuation timeouts are stored, not enforced.
    fn on_timeout(&self, _event: &AsyncEvent) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Notified when the context starts and stops.
pub trait ContextListener: Send + Sync + 'static {
    fn context_initialized(&self, _context: &BridgeContext) -> Result<(), HandlerError> {
        Ok(())
    }

    fn context_destroyed(&self, _context: &BridgeContext) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Runs once before handlers initialize, typically to register handlers programmatically.
pub trait Initializer: Send + Sync + 'static {
    fn on_startup(&self, context: &BridgeContext) -> Result<(), HandlerError>;
}
