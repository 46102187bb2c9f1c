//! HTTP bridging subsystem.
//!
//! # Data Flow
//! ```text
//! Host request
//!     → server.rs (middleware: match path, buffer body)
//!     → request.rs / response.rs (adapters over the buffered exchange)
//!     → chain.rs (interceptors, then the handler; pool or inline)
//!     → async_context.rs (optional suspension, dispatch, completion)
//!     → ResponseCompletion resolves → Axum response
//! ```

pub mod async_context;
pub mod chain;
pub mod request;
pub mod response;
pub mod server;

pub use async_context::{
    AsyncContinuation, AsyncState, ASYNC_CONTEXT_PATH, ASYNC_PATH_INFO, ASYNC_QUERY_STRING,
    ASYNC_REQUEST_URI, ASYNC_SERVLET_PATH, DEFAULT_ASYNC_TIMEOUT_MS,
};
pub use chain::InterceptorChain;
pub use request::{Attribute, HostAttributes, RequestAdapter, RequestInput, X_REQUEST_ID};
pub use response::{Cookie, HandlerResponse, ResponseAdapter, ResponseCompletion, ResponseOutput};
pub use server::HttpServer;

#[cfg(test)]
pub(crate) mod test_support {
    //! Builds adapters without a socket.

    use std::sync::Arc;

    use bytes::Bytes;

    use super::{request::absolute_url, RequestAdapter, ResponseAdapter, ResponseCompletion};
    use crate::api::Handler;
    use crate::config::{ContextConfig, ExecutorConfig};
    use crate::context::BridgeContext;
    use crate::error::HandlerError;

    pub(crate) struct Noop;

    impl Handler for Noop {
        fn service(&self, _: &RequestAdapter, _: &ResponseAdapter) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    pub(crate) struct TestBench {
        context: Arc<BridgeContext>,
    }

    impl TestBench {
        /// Unstarted context mounted at `context_path`.
        pub(crate) fn empty(context_path: &str) -> Self {
            let config = ContextConfig {
                path: context_path.to_string(),
                ..ContextConfig::default()
            };
            let executor = ExecutorConfig {
                core: 1,
                max: 4,
                ..ExecutorConfig::default()
            };
            Self {
                context: Arc::new(BridgeContext::new(&config, &executor).unwrap()),
            }
        }

        /// Started context with a no-op handler per `(name, pattern)`.
        pub(crate) fn new(context_path: &str, routes: &[(&str, &str)]) -> Self {
            let bench = Self::empty(context_path);
            for (name, pattern) in routes {
                bench.context.add_handler(*name, Noop).add_mapping([*pattern]);
            }
            bench.start()
        }

        pub(crate) fn start(self) -> Self {
            self.context.start().unwrap();
            self
        }

        pub(crate) fn context(&self) -> &Arc<BridgeContext> {
            &self.context
        }

        /// Request adapter for `http`, which must match a registered handler.
        pub(crate) fn request(&self, http: axum::http::Request<()>, body: &str) -> RequestAdapter {
            self.adapters(http, body).0
        }

        /// Request/response pair plus the completion the host would await.
        pub(crate) fn exchange(&self, path: &str) -> (RequestAdapter, ResponseAdapter, ResponseCompletion) {
            self.adapters(axum::http::Request::get(path).body(()).unwrap(), "")
        }

        fn adapters(
            &self,
            http: axum::http::Request<()>,
            body: &str,
        ) -> (RequestAdapter, ResponseAdapter, ResponseCompletion) {
            let (parts, ()) = http.into_parts();
            let matched = self
                .context
                .find_match(parts.uri.path())
                .unwrap_or_else(|| panic!("no handler for {}", parts.uri.path()));
            let (response, completion) =
                ResponseAdapter::channel(absolute_url(&parts), self.context.response_encoding());
            let request = RequestAdapter::new(
                &parts,
                Bytes::from(body.to_string()),
                &matched,
                self.context.clone(),
                response.clone(),
            );
            (request, response, completion)
        }
    }

    impl Drop for TestBench {
        fn drop(&mut self) {
            self.context.stop();
        }
    }

    pub(crate) fn request(bench: &TestBench, path: &str) -> RequestAdapter {
        bench.request(axum::http::Request::get(path).body(()).unwrap(), "")
    }
}
