//! Sample components wired by the binary.
//!
//! `setup` registers a small demo application: a blocking JSON handler, suspended
//! handlers that finish on another thread, a self-redispatching handler and a request
//! introspection endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::api::{ContextListener, Handler, HandlerConfig, Initializer, Interceptor};
use crate::context::{BridgeContext, ComponentRegistry};
use crate::error::HandlerError;
use crate::http::{InterceptorChain, RequestAdapter, ResponseAdapter};

const ANSWER: &str = "answer";

fn write_json(response: &ResponseAdapter, value: serde_json::Value) -> Result<(), HandlerError> {
    response.set_content_type("application/json")?;
    response.print(&value.to_string());
    Ok(())
}

/// Answers on the worker pool thread that called it.
pub struct SyncHandler;

impl Handler for SyncHandler {
    fn service(&self, _request: &RequestAdapter, response: &ResponseAdapter) -> Result<(), HandlerError> {
        write_json(response, json!({ "source": "sync" }))
    }
}

/// Suspends, then answers from a separate thread.
pub struct AsyncHandler;

impl Handler for AsyncHandler {
    fn service(&self, request: &RequestAdapter, _response: &ResponseAdapter) -> Result<(), HandlerError> {
        let continuation = request.start_async();
        let uri = request.request_uri();
        std::thread::spawn(move || {
            let text = if uri.contains("/star") { uri.as_str() } else { "ok" };
            match write_json(continuation.response(), json!({ "text": text })) {
                Ok(()) => continuation.complete(),
                Err(e) => continuation.on_error(e),
            }
        });
        Ok(())
    }
}

/// Computes an answer off-thread, then redispatches itself to render it.
pub struct AsyncDispatchHandler;

impl Handler for AsyncDispatchHandler {
    fn service(&self, request: &RequestAdapter, response: &ResponseAdapter) -> Result<(), HandlerError> {
        // Second pass: the dispatch completes the request once this returns.
        if let Some(answer) = request.attribute_as::<u64>(ANSWER) {
            return write_json(response, json!({ "answer": answer }));
        }

        let continuation = request.start_async();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            continuation.request().set_attribute(ANSWER, 42u64);
            continuation.dispatch();
        });
        Ok(())
    }
}

/// Prints how the bridge decomposed the request.
pub struct RequestInfoHandler {
    greeting: std::sync::OnceLock<String>,
}

impl RequestInfoHandler {
    pub fn new() -> Self {
        Self {
            greeting: std::sync::OnceLock::new(),
        }
    }
}

impl Default for RequestInfoHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for RequestInfoHandler {
    fn init(&self, config: &HandlerConfig<'_>) -> Result<(), HandlerError> {
        if let Some(greeting) = config.init_parameter("greeting") {
            let _ = self.greeting.set(greeting.to_string());
        }
        Ok(())
    }

    fn service(&self, request: &RequestAdapter, response: &ResponseAdapter) -> Result<(), HandlerError> {
        response.set_content_type("text/plain")?;
        let mut lines = vec![
            format!("uri={}", request.request_uri()),
            format!("url={}", request.request_url()),
            format!("context={}", request.context_path()),
            format!("servlet={}", request.servlet_path()),
            format!("pathinfo={}", request.path_info().unwrap_or_default()),
        ];
        if let Some(greeting) = self.greeting.get() {
            lines.push(format!("greeting={}", greeting));
        }
        response.print(&lines.join("\n"));
        Ok(())
    }
}

/// Stamps every response it sees.
pub struct PoweredByInterceptor;

impl Interceptor for PoweredByInterceptor {
    fn intercept(
        &self,
        request: &RequestAdapter,
        response: &ResponseAdapter,
        chain: &InterceptorChain<'_>,
    ) -> Result<(), HandlerError> {
        response.set_header("x-powered-by", "handler-bridge")?;
        chain.proceed(request, response)
    }
}

pub struct StartupLogListener;

impl ContextListener for StartupLogListener {
    fn context_initialized(&self, context: &BridgeContext) -> Result<(), HandlerError> {
        tracing::info!(context_path = %context.context_path(), "Sample application starting");
        Ok(())
    }

    fn context_destroyed(&self, context: &BridgeContext) -> Result<(), HandlerError> {
        tracing::info!(context_path = %context.context_path(), "Sample application stopped");
        Ok(())
    }
}

/// Registers the demo handlers.
pub struct SetupInitializer;

impl Initializer for SetupInitializer {
    fn on_startup(&self, context: &BridgeContext) -> Result<(), HandlerError> {
        let handlers: [(&str, Arc<dyn Handler>, &str); 4] = [
            ("async", Arc::new(AsyncHandler), "/async"),
            ("async2", Arc::new(AsyncHandler), "/star/async/*"),
            ("asyncdispatch", Arc::new(AsyncDispatchHandler), "/asyncdispatch"),
            ("request", Arc::new(RequestInfoHandler::new()), "/request"),
        ];
        for (name, handler, pattern) in handlers {
            context
                .add_handler_instance(name, handler)
                .add_mapping([pattern])
                .set_async_supported(true);
        }
        context.add_handler("sync", SyncHandler).add_mapping(["/sync"]);
        Ok(())
    }
}

/// Always refuses to start.
pub struct FailingInitializer;

impl Initializer for FailingInitializer {
    fn on_startup(&self, _context: &BridgeContext) -> Result<(), HandlerError> {
        Err(HandlerError::processing("refusing to start"))
    }
}

/// Registry of every sample component, keyed by the names used in configuration.
pub fn default_registry() -> ComponentRegistry {
    ComponentRegistry::new()
        .with_handler("sync", || SyncHandler)
        .with_handler("async", || AsyncHandler)
        .with_handler("async-dispatch", || AsyncDispatchHandler)
        .with_handler("request-info", RequestInfoHandler::new)
        .with_interceptor("powered-by", || PoweredByInterceptor)
        .with_initializer("setup", || SetupInitializer)
        .with_listener("startup-log", || StartupLogListener)
}
