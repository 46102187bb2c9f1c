//! Async continuation.
//!
//! # State Machine
//! ```text
//! Started ──complete()──────────────────────────→ Completed
//!    │                                               ↑
//!    ├──dispatch()──→ Dispatched ──service returns──┤
//!    │                    │                          │
//!    └──on_error()──→ Errored ──────────────────────┘
//! ```
//!
//! # Design Decisions
//! - `dispatch` re-invokes the handler on the calling thread, never on the pool
//! - The request's slot holds a weak reference: once every handle is dropped the continuation
//!   goes away, and an incomplete response resolves as abandoned
//! - The stored timeout is informational; nothing fires `on_timeout`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use percent_encoding::percent_decode_str;

use crate::api::{AsyncEvent, AsyncListener};
use crate::context::registration::RegisteredHandler;
use crate::error::{guard, HandlerError};
use crate::http::request::RequestAdapter;
use crate::http::response::ResponseAdapter;

/// Request attribute names holding the pre-dispatch request metadata.
pub const ASYNC_REQUEST_URI: &str = "bridge.async.request_uri";
pub const ASYNC_CONTEXT_PATH: &str = "bridge.async.context_path";
pub const ASYNC_SERVLET_PATH: &str = "bridge.async.servlet_path";
pub const ASYNC_PATH_INFO: &str = "bridge.async.path_info";
pub const ASYNC_QUERY_STRING: &str = "bridge.async.query_string";

/// Default continuation timeout in milliseconds.
pub const DEFAULT_ASYNC_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncState {
    Started,
    Dispatched,
    Errored,
    Completed,
}

#[derive(Clone)]
struct ListenerEntry {
    listener: Arc<dyn AsyncListener>,
    request: RequestAdapter,
    response: ResponseAdapter,
}

struct ContinuationInner {
    request: RequestAdapter,
    response: ResponseAdapter,
    root_request: RequestAdapter,
    root_response: ResponseAdapter,
    original: bool,
    handler: Arc<RegisteredHandler>,
    listeners: Mutex<Vec<ListenerEntry>>,
    state: Mutex<AsyncState>,
    timeout_ms: AtomicU64,
}

/// Handle a handler gets back from `start_async`. Clones share state.
#[derive(Clone)]
pub struct AsyncContinuation {
    inner: Arc<ContinuationInner>,
}

/// Non-owning reference kept in the request's slot.
#[derive(Clone, Default)]
pub(crate) struct WeakContinuation(Weak<ContinuationInner>);

impl WeakContinuation {
    pub(crate) fn upgrade(&self) -> Option<AsyncContinuation> {
        self.0.upgrade().map(|inner| AsyncContinuation { inner })
    }
}

impl AsyncContinuation {
    pub(crate) fn new(
        request: RequestAdapter,
        response: ResponseAdapter,
        root_request: RequestAdapter,
        root_response: ResponseAdapter,
        original: bool,
        handler: Arc<RegisteredHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(ContinuationInner {
                request,
                response,
                root_request,
                root_response,
                original,
                handler,
                listeners: Mutex::new(Vec::new()),
                state: Mutex::new(AsyncState::Started),
                timeout_ms: AtomicU64::new(DEFAULT_ASYNC_TIMEOUT_MS),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakContinuation {
        WeakContinuation(Arc::downgrade(&self.inner))
    }

    pub fn request(&self) -> &RequestAdapter {
        &self.inner.request
    }

    pub fn response(&self) -> &ResponseAdapter {
        &self.inner.response
    }

    /// False when started with an alternate request/response pair.
    pub fn has_original_request_and_response(&self) -> bool {
        self.inner.original
    }

    pub fn state(&self) -> AsyncState {
        *self.inner.state.lock().expect("async state mutex poisoned")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.inner.timeout_ms.load(Ordering::Relaxed))
    }

    /// Stored only; the bridge never enforces it.
    pub fn set_timeout(&self, timeout: Duration) {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.inner.timeout_ms.store(millis, Ordering::Relaxed);
    }

    /// Listen with the continuation's own request/response pair.
    pub fn add_listener(&self, listener: Arc<dyn AsyncListener>) {
        self.add_listener_with(
            listener,
            self.inner.request.clone(),
            self.inner.response.clone(),
        );
    }

    /// Listen with an explicit pair; events delivered to this listener carry it.
    pub fn add_listener_with(
        &self,
        listener: Arc<dyn AsyncListener>,
        request: RequestAdapter,
        response: ResponseAdapter,
    ) {
        self.inner
            .listeners
            .lock()
            .expect("listener mutex poisoned")
            .push(ListenerEntry {
                listener,
                request,
                response,
            });
    }

    /// Fire `on_start_async` to the current listeners, then forget them.
    pub(crate) fn fire_start_async(&self) {
        let entries = std::mem::take(&mut *self.inner.listeners.lock().expect("listener mutex poisoned"));
        self.notify(&entries, None, |l, e| l.on_start_async(e));
    }

    /// Mark the continuation started again after a re-entrant `start_async`.
    pub(crate) fn restart(&self) {
        let mut state = self.inner.state.lock().expect("async state mutex poisoned");
        if *state != AsyncState::Completed {
            *state = AsyncState::Started;
        }
    }

    /// Re-run the handler for the original request path.
    pub fn dispatch(&self) {
        self.dispatch_to(&self.dispatch_path());
    }

    /// Decoded request path relative to the context.
    pub(crate) fn dispatch_path(&self) -> String {
        let uri = self.inner.request.request_uri();
        let context_path = self.inner.request.context_path();
        let relative = uri.strip_prefix(context_path).unwrap_or(&uri);
        percent_decode_str(relative).decode_utf8_lossy().into_owned()
    }

    /// Re-run the original handler on the calling thread.
    ///
    /// `path` is recorded for diagnostics only: the same handler serves the redispatch.
    pub fn dispatch_to(&self, path: &str) {
        {
            let mut state = self.inner.state.lock().expect("async state mutex poisoned");
            if *state == AsyncState::Completed {
                tracing::debug!(path = %path, "Dispatch after completion ignored");
                return;
            }
            *state = AsyncState::Dispatched;
        }
        let request = &self.inner.request;
        request.stash_dispatch_attributes();

        tracing::debug!(handler = %self.inner.handler.name(), path = %path, "Async dispatch");
        let outcome = guard(|| {
            self.inner
                .handler
                .instance()
                .service(request, &self.inner.response)
        });
        match outcome {
            Err(e) => self.on_error(e),
            Ok(()) if self.state() == AsyncState::Dispatched => self.complete(),
            Ok(()) => {}
        }
    }

    /// Fire `on_complete` and resolve the response. Runs once.
    pub fn complete(&self) {
        {
            let mut state = self.inner.state.lock().expect("async state mutex poisoned");
            if *state == AsyncState::Completed {
                return;
            }
            *state = AsyncState::Completed;
        }
        let entries = std::mem::take(&mut *self.inner.listeners.lock().expect("listener mutex poisoned"));
        self.notify(&entries, None, |l, e| l.on_complete(e));
        self.inner.root_response.on_complete();
        self.inner.root_request.clear_async_context();
    }

    /// Fire `on_error`, force a 500 when nothing was committed, then complete.
    pub fn on_error(&self, error: HandlerError) {
        {
            let mut state = self.inner.state.lock().expect("async state mutex poisoned");
            if *state == AsyncState::Completed {
                tracing::debug!(error = %error, "Error after completion ignored");
                return;
            }
            *state = AsyncState::Errored;
        }
        tracing::error!(handler = %self.inner.handler.name(), error = %error, "Async request failed");
        let entries = self
            .inner
            .listeners
            .lock()
            .expect("listener mutex poisoned")
            .clone();
        self.notify(&entries, Some(Arc::new(error)), |l, e| l.on_error(e));
        if !self.inner.response.is_committed() {
            self.inner
                .response
                .set_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        }
        self.complete();
    }

    /// Run `task` on the context's worker pool, inline when the pool is unavailable.
    pub fn start<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let pool = self.inner.root_request.context().pool().clone();
        if let Err((e, task)) = pool.try_execute(task) {
            tracing::warn!(error = %e, "Worker pool unavailable, running async task inline");
            task();
        }
    }

    fn notify(
        &self,
        entries: &[ListenerEntry],
        error: Option<Arc<HandlerError>>,
        callback: impl Fn(&dyn AsyncListener, &AsyncEvent) -> Result<(), HandlerError>,
    ) {
        for entry in entries {
            let event = AsyncEvent::new(
                self.clone(),
                entry.request.clone(),
                entry.response.clone(),
                error.clone(),
            );
            if let Err(e) = guard(|| callback(entry.listener.as_ref(), &event)) {
                tracing::warn!(error = %e, "Async listener callback failed");
            }
        }
    }
}

impl std::fmt::Debug for AsyncContinuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncContinuation")
            .field("handler", &self.inner.handler.name())
            .field("state", &self.state())
            .field("timeout", &self.timeout())
            .finish()
    }
}
