//! Interceptor contract.

use crate::api::HandlerConfig;
use crate::error::HandlerError;
use crate::http::chain::InterceptorChain;
use crate::http::{RequestAdapter, ResponseAdapter};

/// Runs before a handler, selected by URL pattern or handler name.
///
/// Calling `chain.proceed` hands control to the next interceptor (or the handler once
/// the chain is exhausted). Returning without proceeding short-circuits the request.
pub trait Interceptor: Send + Sync + 'static {
    fn init(&self, _config: &HandlerConfig<'_>) -> Result<(), HandlerError> {
        Ok(())
    }

    fn intercept(
        &self,
        request: &RequestAdapter,
        response: &ResponseAdapter,
        chain: &InterceptorChain<'_>,
    ) -> Result<(), HandlerError>;

    fn destroy(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}
