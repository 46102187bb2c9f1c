//! HTTP server setup and request bridging.
//!
//! # Responsibilities
//! - Create the Axum router and wire up middleware (tracing, timeout, request ID)
//! - Resolve each request against the context's route table
//! - Buffer the body, build the adapters and run the interceptor chain
//! - Await the response adapter and convert it into an Axum response
//! - Stop the context after the listener drains
//!
//! # Design Decisions
//! - Unmatched requests fall through to the host router (404 by default)
//! - Blocking handlers run on the context's worker pool; async-capable handlers run inline
//! - Pool rejection renders as 503, handler failures as 500 with the error message

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::BridgeConfig;
use crate::context::BridgeContext;
use crate::error::HandlerError;
use crate::http::chain;
use crate::http::request::{absolute_url, RequestAdapter};
use crate::http::response::ResponseAdapter;
use crate::observability::metrics;
use crate::routing::MatchResult;

/// Generates a UUID v4 for requests arriving without `x-request-id`.
#[derive(Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// HTTP server hosting one bridge context.
pub struct HttpServer {
    router: Router,
    context: Arc<BridgeContext>,
}

impl HttpServer {
    /// Create a server serving `context`, which must already be started.
    pub fn new(config: &BridgeConfig, context: Arc<BridgeContext>) -> Self {
        let router = Self::build_router(config, context.clone());
        Self { router, context }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &BridgeConfig, context: Arc<BridgeContext>) -> Router {
        let mut router = Router::new()
            .fallback(|| async { StatusCode::NOT_FOUND })
            .layer(middleware::from_fn_with_state(context, bridge_middleware));
        if config.timeouts.request_secs > 0 {
            router = router.layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )));
        }
        router
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.context
    }

    /// Serve until `shutdown` fires, then stop the context.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            context_path = %self.context.context_path(),
            "HTTP server starting"
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        let context = self.context;
        if let Err(e) = tokio::task::spawn_blocking(move || context.stop()).await {
            tracing::error!(error = %e, "Context stop task failed");
        }
        Ok(())
    }
}

/// Hand matching requests to the bridge, everything else to the rest of the host router.
async fn bridge_middleware(
    State(context): State<Arc<BridgeContext>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(matched) = context.find_match(request.uri().path()) else {
        return next.run(request).await;
    };

    let limit = context.max_body_size();
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Request body rejected");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    invoke(context, matched, parts, body).await
}

async fn invoke(context: Arc<BridgeContext>, matched: MatchResult, parts: Parts, body: Bytes) -> Response {
    let start = Instant::now();
    let handler = matched.handler.name().to_string();
    let request_id = parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = %parts.uri.path(),
        handler = %handler,
        "Bridging request"
    );

    let (response, completion) =
        ResponseAdapter::channel(absolute_url(&parts), context.response_encoding());
    let request = RequestAdapter::new(&parts, body, &matched, context.clone(), response.clone());

    if matched.handler.is_async_supported() {
        do_execute(&matched, &request, &response);
    } else {
        let (task_request, task_response) = (request.clone(), response.clone());
        let submitted = context.submit(move || do_execute(&matched, &task_request, &task_response));
        if let Err(e) = submitted {
            response.fail(HandlerError::Rejected(e));
        }
    }
    // Only the handler's clones may keep the response alive from here on.
    drop(request);
    drop(response);

    let rendered = match completion.await {
        Ok(result) => result.into_response(),
        Err(e) => {
            tracing::error!(request_id = %request_id, handler = %handler, error = %e, "Request failed");
            e.into_response()
        }
    };
    metrics::record_request(&handler, rendered.status().as_u16(), start);
    rendered
}

/// Run the chain and settle the response unless the handler went async.
fn do_execute(matched: &MatchResult, request: &RequestAdapter, response: &ResponseAdapter) {
    match chain::execute(matched, request, response) {
        Ok(()) => {
            if !request.is_async_started() {
                response.on_complete();
            }
        }
        Err(e) => match request.async_context() {
            Some(continuation) if request.is_async_started() => continuation.on_error(e),
            _ => response.fail(e),
        },
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("context", &self.context)
            .finish()
    }
}
