//! Interceptor chain execution.

use std::sync::Arc;

use crate::context::registration::{RegisteredHandler, RegisteredInterceptor};
use crate::error::{guard, HandlerError};
use crate::http::{RequestAdapter, ResponseAdapter};
use crate::routing::MatchResult;

/// Continuation handed to each interceptor: the interceptors still to run, then the handler.
pub struct InterceptorChain<'a> {
    remaining: &'a [Arc<RegisteredInterceptor>],
    handler: &'a RegisteredHandler,
}

impl<'a> InterceptorChain<'a> {
    pub(crate) fn new(remaining: &'a [Arc<RegisteredInterceptor>], handler: &'a RegisteredHandler) -> Self {
        Self { remaining, handler }
    }

    /// Run the next interceptor, or the handler once none are left.
    pub fn proceed(&self, request: &RequestAdapter, response: &ResponseAdapter) -> Result<(), HandlerError> {
        match self.remaining.split_first() {
            Some((next, rest)) => {
                let chain = InterceptorChain::new(rest, self.handler);
                next.instance().intercept(request, response, &chain)
            }
            None => self.handler.instance().service(request, response),
        }
    }

    /// Interceptors not yet run.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

/// Run a matched request: straight to the handler when no interceptor applies.
pub(crate) fn execute(
    matched: &MatchResult,
    request: &RequestAdapter,
    response: &ResponseAdapter,
) -> Result<(), HandlerError> {
    guard(|| {
        if matched.interceptors.is_empty() {
            matched.handler.instance().service(request, response)
        } else {
            InterceptorChain::new(&matched.interceptors, &matched.handler).proceed(request, response)
        }
    })
}
