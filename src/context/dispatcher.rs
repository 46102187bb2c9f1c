//! Request dispatcher.
//!
//! Hands an in-flight request to whichever handler serves another context-relative path.
//! The target runs on the worker pool; the caller returns immediately.

use std::sync::Arc;

use crate::context::BridgeContext;
use crate::error::{guard, BridgeError, BridgeResult};
use crate::http::{RequestAdapter, ResponseAdapter};

/// Dispatcher bound to one context-relative path.
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    context: Arc<BridgeContext>,
    path: String,
}

impl RequestDispatcher {
    pub(crate) fn new(context: Arc<BridgeContext>, path: String) -> Self {
        Self { context, path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Drop buffered output, then run the target handler.
    ///
    /// Suspend the request (`start_async`) before forwarding: the target completes the
    /// continuation, and its errors are routed to `on_error`.
    pub fn forward(&self, request: &RequestAdapter, response: &ResponseAdapter) -> BridgeResult<()> {
        if response.reset_buffer().is_err() {
            tracing::debug!(path = %self.path, "Forwarding a committed response");
        }
        self.run(request, response)
    }

    /// Run the target handler, keeping what was already written.
    pub fn include(&self, request: &RequestAdapter, response: &ResponseAdapter) -> BridgeResult<()> {
        self.run(request, response)
    }

    fn run(&self, request: &RequestAdapter, response: &ResponseAdapter) -> BridgeResult<()> {
        let matched = self
            .context
            .find_first_match(&self.path)
            .ok_or_else(|| BridgeError::NoMatch(self.path.clone()))?;
        let handler = matched.handler;
        let (request, response) = (request.clone(), response.clone());
        // Held until the target returns so it can still reach the continuation.
        let continuation = request.async_context();
        let path = self.path.clone();

        tracing::debug!(path = %path, handler = %handler.name(), "Dispatching request");
        self.context.pool().execute(move || {
            if let Err(e) = guard(|| handler.instance().service(&request, &response)) {
                match continuation {
                    Some(continuation) => continuation.on_error(e),
                    None => tracing::error!(
                        path = %path,
                        handler = %handler.name(),
                        error = %e,
                        "Dispatched handler failed"
                    ),
                }
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Handler;
    use crate::error::HandlerError;
    use crate::http::test_support::{Noop, TestBench};

    struct Target;

    impl Handler for Target {
        fn service(&self, request: &RequestAdapter, response: &ResponseAdapter) -> Result<(), HandlerError> {
            response.print("from target");
            if let Some(continuation) = request.async_context() {
                continuation.complete();
            }
            Ok(())
        }
    }

    fn bench() -> TestBench {
        let bench = TestBench::empty("");
        bench.context().add_handler("source", Noop).add_mapping(["/source"]);
        bench.context().add_handler("target", Target).add_mapping(["/target/*"]);
        bench.start()
    }

    #[tokio::test]
    async fn test_forward_discards_buffer_and_runs_target() {
        let bench = bench();
        let (request, response, completion) = bench.exchange("/source");
        response.print("discarded");
        let continuation = request.start_async();

        bench
            .context()
            .dispatcher("/target/x")
            .forward(&request, &response)
            .unwrap();
        drop((continuation, request, response));

        let result = completion.await.unwrap();
        assert_eq!(&result.body[..], b"from target");
    }

    #[tokio::test]
    async fn test_include_keeps_buffer() {
        let bench = bench();
        let (request, response, completion) = bench.exchange("/source");
        response.print("kept, ");
        let continuation = request.start_async();

        bench
            .context()
            .dispatcher("/target/y")
            .include(&request, &response)
            .unwrap();
        drop((continuation, request, response));

        let result = completion.await.unwrap();
        assert_eq!(&result.body[..], b"kept, from target");
    }

    #[tokio::test]
    async fn test_unknown_path_is_an_error() {
        let bench = bench();
        let (request, response, _completion) = bench.exchange("/source");
        let err = bench
            .context()
            .dispatcher("/nowhere")
            .include(&request, &response)
            .unwrap_err();
        assert!(matches!(err, BridgeError::NoMatch(ref path) if path == "/nowhere"));
    }

    struct FailingTarget;

    impl Handler for FailingTarget {
        fn service(&self, _: &RequestAdapter, _: &ResponseAdapter) -> Result<(), HandlerError> {
            Err(HandlerError::processing("target failed"))
        }
    }

    #[tokio::test]
    async fn test_target_error_reaches_released_continuation() {
        let bench = TestBench::empty("");
        bench.context().add_handler("source", Noop).add_mapping(["/source"]);
        bench.context().add_handler("failing", FailingTarget).add_mapping(["/failing"]);
        let bench = bench.start();
        let (request, response, completion) = bench.exchange("/source");

        let continuation = request.start_async();
        bench
            .context()
            .dispatcher("/failing")
            .forward(&request, &response)
            .unwrap();
        drop((continuation, request, response));

        let result = completion.await.unwrap();
        assert_eq!(result.status, axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
