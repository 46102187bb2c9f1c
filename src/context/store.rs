//! The registration store.
//!
//! # Responsibilities
//! - Collect handler, interceptor and listener registrations while assembling
//! - Initialize them once, in load-on-startup order, on `start()`
//! - Resolve request paths against the frozen route table
//! - Own the worker pool used for blocking handlers
//! - Destroy everything best-effort on `stop()`
//!
//! # Design Decisions
//! - Pending registrations sit behind a mutex; `start()` freezes them into a
//!   `RouteTable` swapped in through `ArcSwap`, so request-time reads never lock
//! - Init failures abort startup; destroy failures are logged and swallowed
//! - Handlers are destroyed in exact reverse of their init order
//! - Only components whose `init` succeeded are destroyed, so a failed start still tears
//!   down what it initialized

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;

use crate::api::{ContextListener, Handler, HandlerConfig, Interceptor};
use crate::config::{ContextConfig, ExecutorConfig};
use crate::context::dispatcher::RequestDispatcher;
use crate::context::executor::{PoolError, WorkerPool};
use crate::context::registration::{
    HandlerRegistration, InterceptorRegistration, RegisteredHandler, RegisteredInterceptor,
};
use crate::error::{guard, BridgeError, BridgeResult};
use crate::routing::{MatchResult, RouteTable};

#[derive(Default)]
struct Pending {
    handlers: Vec<RegisteredHandler>,
    interceptors: Vec<RegisteredInterceptor>,
}

/// Context owning every registration and the worker pool.
pub struct BridgeContext {
    context_path: String,
    request_encoding: String,
    response_encoding: String,
    max_body_size: usize,
    pending: Mutex<Pending>,
    listeners: Mutex<Vec<Arc<dyn ContextListener>>>,
    routes: ArcSwap<RouteTable>,
    init_order: Mutex<Vec<Arc<RegisteredHandler>>>,
    initialized_interceptors: Mutex<Vec<Arc<RegisteredInterceptor>>>,
    started: AtomicBool,
    stopped: AtomicBool,
    pool: Arc<WorkerPool>,
}

impl BridgeContext {
    /// Create an empty context and its worker pool.
    pub fn new(context: &ContextConfig, executor: &ExecutorConfig) -> BridgeResult<Self> {
        let pool = WorkerPool::new(&context.path, executor)?;
        Ok(Self {
            context_path: context.path.clone(),
            request_encoding: context.request_encoding.clone(),
            response_encoding: context.response_encoding.clone(),
            max_body_size: context.max_body_size,
            pending: Mutex::new(Pending::default()),
            listeners: Mutex::new(Vec::new()),
            routes: ArcSwap::from_pointee(RouteTable::default()),
            init_order: Mutex::new(Vec::new()),
            initialized_interceptors: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            pool: Arc::new(pool),
        })
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn request_encoding(&self) -> &str {
        &self.request_encoding
    }

    pub fn response_encoding(&self) -> &str {
        &self.response_encoding
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Register a handler. Duplicate names are accepted; name lookups see the last one.
    pub fn add_handler<H: Handler>(&self, name: impl Into<String>, handler: H) -> HandlerRegistration<'_> {
        self.add_handler_instance(name, Arc::new(handler))
    }

    pub fn add_handler_instance(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> HandlerRegistration<'_> {
        let name = name.into();
        let mut pending = self.pending.lock().expect("registration mutex poisoned");
        if self.is_started() {
            tracing::warn!(handler = %name, "Handler registered after start is ignored");
            return HandlerRegistration::detached(self);
        }
        tracing::debug!(handler = %name, "Handler registered");
        pending.handlers.push(RegisteredHandler::new(name, handler));
        HandlerRegistration::new(self, pending.handlers.len() - 1)
    }

    pub fn add_interceptor<I: Interceptor>(
        &self,
        name: impl Into<String>,
        interceptor: I,
    ) -> InterceptorRegistration<'_> {
        self.add_interceptor_instance(name, Arc::new(interceptor))
    }

    pub fn add_interceptor_instance(
        &self,
        name: impl Into<String>,
        interceptor: Arc<dyn Interceptor>,
    ) -> InterceptorRegistration<'_> {
        let name = name.into();
        let mut pending = self.pending.lock().expect("registration mutex poisoned");
        if self.is_started() {
            tracing::warn!(interceptor = %name, "Interceptor registered after start is ignored");
            return InterceptorRegistration::detached(self);
        }
        tracing::debug!(interceptor = %name, "Interceptor registered");
        pending
            .interceptors
            .push(RegisteredInterceptor::new(name, interceptor));
        InterceptorRegistration::new(self, pending.interceptors.len() - 1)
    }

    pub fn add_listener(&self, listener: Arc<dyn ContextListener>) {
        self.listeners
            .lock()
            .expect("listener mutex poisoned")
            .push(listener);
    }

    /// Handle of the last pending handler registered under `name`.
    pub fn handler_registration(&self, name: &str) -> Option<HandlerRegistration<'_>> {
        let pending = self.pending.lock().expect("registration mutex poisoned");
        pending
            .handlers
            .iter()
            .rposition(|h| h.name() == name)
            .map(|id| HandlerRegistration::new(self, id))
    }

    pub(crate) fn with_pending_handler<R>(
        &self,
        id: usize,
        f: impl FnOnce(&mut RegisteredHandler) -> R,
    ) -> Option<R> {
        let mut pending = self.pending.lock().expect("registration mutex poisoned");
        if self.is_started() {
            tracing::warn!("Handler registration changed after start is ignored");
            return None;
        }
        pending.handlers.get_mut(id).map(f)
    }

    pub(crate) fn with_pending_interceptor<R>(
        &self,
        id: usize,
        f: impl FnOnce(&mut RegisteredInterceptor) -> R,
    ) -> Option<R> {
        let mut pending = self.pending.lock().expect("registration mutex poisoned");
        if self.is_started() {
            tracing::warn!("Interceptor registration changed after start is ignored");
            return None;
        }
        pending.interceptors.get_mut(id).map(f)
    }

    /// Initialize listeners, interceptors and handlers, then publish the route table.
    ///
    /// Runs once; later calls return `Ok(())` without doing anything.
    pub fn start(&self) -> BridgeResult<()> {
        let pending = {
            let mut pending = self.pending.lock().expect("registration mutex poisoned");
            if self.started.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            std::mem::take(&mut *pending)
        };

        let handlers: Vec<Arc<RegisteredHandler>> =
            pending.handlers.into_iter().map(Arc::new).collect();
        let interceptors: Vec<Arc<RegisteredInterceptor>> =
            pending.interceptors.into_iter().map(Arc::new).collect();

        let listeners = self.listeners.lock().expect("listener mutex poisoned").clone();
        for (i, listener) in listeners.iter().enumerate() {
            guard(|| listener.context_initialized(self)).map_err(|source| BridgeError::Init {
                name: format!("context listener #{}", i),
                source,
            })?;
        }

        for interceptor in &interceptors {
            let config = HandlerConfig::new(interceptor.name(), interceptor.init_parameters(), self);
            guard(|| interceptor.instance().init(&config)).map_err(|source| BridgeError::Init {
                name: interceptor.name().to_string(),
                source,
            })?;
            self.initialized_interceptors
                .lock()
                .expect("init order mutex poisoned")
                .push(interceptor.clone());
        }

        let mut load_order = handlers.clone();
        load_order.sort_by_key(|h| h.load_on_startup());
        for handler in load_order {
            let config = HandlerConfig::new(handler.name(), handler.init_parameters(), self);
            guard(|| handler.instance().init(&config)).map_err(|source| BridgeError::Init {
                name: handler.name().to_string(),
                source,
            })?;
            tracing::debug!(
                handler = %handler.name(),
                load_on_startup = handler.load_on_startup(),
                "Handler initialized"
            );
            self.init_order
                .lock()
                .expect("init order mutex poisoned")
                .push(handler);
        }

        tracing::info!(
            context_path = %self.context_path,
            handlers = handlers.len(),
            interceptors = interceptors.len(),
            "Bridge context started"
        );
        self.routes
            .store(Arc::new(RouteTable::new(handlers, interceptors)));
        Ok(())
    }

    /// Destroy handlers (LIFO), interceptors (registration order), notify listeners and
    /// shut the worker pool down. Never fails; runs once.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.routes.store(Arc::new(RouteTable::default()));

        let initialized = std::mem::take(&mut *self.init_order.lock().expect("init order mutex poisoned"));
        for handler in initialized.iter().rev() {
            if let Err(e) = guard(|| handler.instance().destroy()) {
                tracing::warn!(handler = %handler.name(), error = %e, "Handler destroy failed");
            }
        }

        let interceptors = std::mem::take(
            &mut *self
                .initialized_interceptors
                .lock()
                .expect("init order mutex poisoned"),
        );
        for interceptor in &interceptors {
            if let Err(e) = guard(|| interceptor.instance().destroy()) {
                tracing::warn!(interceptor = %interceptor.name(), error = %e, "Interceptor destroy failed");
            }
        }

        let listeners = self.listeners.lock().expect("listener mutex poisoned").clone();
        for listener in &listeners {
            if let Err(e) = guard(|| listener.context_destroyed(self)) {
                tracing::warn!(error = %e, "Context listener destroy callback failed");
            }
        }

        self.pool.shutdown();
        tracing::info!(context_path = %self.context_path, "Bridge context stopped");
    }

    /// Resolve a full request path (including the context path).
    pub fn find_match(&self, path: &str) -> Option<MatchResult> {
        let relative = path.strip_prefix(self.context_path.as_str())?;
        if !relative.is_empty() && !relative.starts_with('/') {
            return None;
        }
        self.find_first_match(relative)
    }

    /// Resolve a context-relative path.
    pub fn find_first_match(&self, path: &str) -> Option<MatchResult> {
        self.routes.load().find(path)
    }

    /// Snapshot of the published route table.
    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.load_full()
    }

    /// Run blocking work on the worker pool.
    pub fn submit<F, T>(&self, task: F) -> Result<JoinHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.pool.submit(task)
    }

    /// Dispatcher forwarding to whatever handler serves `path` (context-relative).
    pub fn dispatcher(self: &Arc<Self>, path: impl Into<String>) -> RequestDispatcher {
        RequestDispatcher::new(self.clone(), path.into())
    }
}

impl std::fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("context_path", &self.context_path)
            .field("started", &self.is_started())
            .field("routes", &self.routes.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::http::{RequestAdapter, ResponseAdapter};

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recording {
        label: String,
        journal: Journal,
        fail_init: bool,
        fail_destroy: bool,
    }

    impl Recording {
        fn new(label: &str, journal: &Journal) -> Self {
            Self {
                label: label.to_string(),
                journal: journal.clone(),
                fail_init: false,
                fail_destroy: false,
            }
        }
    }

    impl Handler for Recording {
        fn init(&self, config: &HandlerConfig<'_>) -> Result<(), HandlerError> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("init {}", config.name()));
            if self.fail_init {
                return Err(HandlerError::processing("init refused"));
            }
            Ok(())
        }

        fn service(&self, _: &RequestAdapter, _: &ResponseAdapter) -> Result<(), HandlerError> {
            Ok(())
        }

        fn destroy(&self) -> Result<(), HandlerError> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("destroy {}", self.label));
            if self.fail_destroy {
                panic!("destroy exploded");
            }
            Ok(())
        }
    }

    struct RecordingInterceptor(String, Journal);

    impl Interceptor for RecordingInterceptor {
        fn init(&self, _: &HandlerConfig<'_>) -> Result<(), HandlerError> {
            self.1.lock().unwrap().push(format!("init {}", self.0));
            Ok(())
        }

        fn intercept(
            &self,
            request: &RequestAdapter,
            response: &ResponseAdapter,
            chain: &crate::http::chain::InterceptorChain<'_>,
        ) -> Result<(), HandlerError> {
            chain.proceed(request, response)
        }

        fn destroy(&self) -> Result<(), HandlerError> {
            self.1.lock().unwrap().push(format!("destroy {}", self.0));
            Ok(())
        }
    }

    pub(crate) fn context(path: &str) -> BridgeContext {
        let config = ContextConfig {
            path: path.to_string(),
            ..ContextConfig::default()
        };
        let executor = ExecutorConfig {
            core: 1,
            max: 4,
            ..ExecutorConfig::default()
        };
        BridgeContext::new(&config, &executor).unwrap()
    }

    #[tokio::test]
    async fn test_init_and_destroy_order() {
        let journal = Journal::default();
        let ctx = context("");
        for (label, priority) in [("ten", 10), ("zero", 0), ("five", 5)] {
            ctx.add_handler(label, Recording::new(label, &journal))
                .set_load_on_startup(priority);
        }
        ctx.add_interceptor("first", RecordingInterceptor("first".into(), journal.clone()));
        ctx.add_interceptor("second", RecordingInterceptor("second".into(), journal.clone()));

        ctx.start().unwrap();
        ctx.stop();

        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "init first",
                "init second",
                "init zero",
                "init five",
                "init ten",
                "destroy ten",
                "destroy five",
                "destroy zero",
                "destroy first",
                "destroy second",
            ]
        );
        assert!(ctx.pool().is_shutdown());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let journal = Journal::default();
        let ctx = context("");
        ctx.add_handler("only", Recording::new("only", &journal));
        ctx.start().unwrap();
        ctx.start().unwrap();
        assert_eq!(*journal.lock().unwrap(), vec!["init only"]);
    }

    #[tokio::test]
    async fn test_init_failure_aborts_start() {
        let journal = Journal::default();
        let ctx = context("");
        let mut failing = Recording::new("bad", &journal);
        failing.fail_init = true;
        ctx.add_handler("good", Recording::new("good", &journal))
            .set_load_on_startup(0);
        ctx.add_handler("bad", failing).set_load_on_startup(1);
        ctx.add_handler("never", Recording::new("never", &journal))
            .set_load_on_startup(2);

        let err = ctx.start().unwrap_err();
        assert!(matches!(err, BridgeError::Init { ref name, .. } if name == "bad"));
        assert_eq!(*journal.lock().unwrap(), vec!["init good", "init bad"]);
        assert!(ctx.find_match("/anything").is_none());
    }

    #[tokio::test]
    async fn test_failed_start_destroys_initialized_interceptors() {
        let journal = Journal::default();
        let ctx = context("");
        ctx.add_interceptor("audit", RecordingInterceptor("audit".into(), journal.clone()));
        let mut failing = Recording::new("bad", &journal);
        failing.fail_init = true;
        ctx.add_handler("bad", failing);

        assert!(ctx.start().is_err());
        ctx.stop();

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["init audit", "init bad", "destroy audit"]
        );
    }

    #[tokio::test]
    async fn test_destroy_failures_are_swallowed() {
        let journal = Journal::default();
        let ctx = context("");
        let mut exploding = Recording::new("exploding", &journal);
        exploding.fail_destroy = true;
        ctx.add_handler("a", Recording::new("a", &journal))
            .set_load_on_startup(0);
        ctx.add_handler("exploding", exploding).set_load_on_startup(1);
        ctx.start().unwrap();
        ctx.stop();
        ctx.stop();

        let journal = journal.lock().unwrap();
        assert_eq!(&journal[journal.len() - 2..], ["destroy exploding", "destroy a"]);
    }

    #[tokio::test]
    async fn test_find_match_first_registered_wins() {
        let journal = Journal::default();
        let ctx = context("/app");
        ctx.add_handler("api", Recording::new("api", &journal))
            .add_mapping(["/api/*"]);
        ctx.add_handler("json", Recording::new("json", &journal))
            .add_mapping(["*.json"]);
        ctx.add_handler("fallback", Recording::new("fallback", &journal))
            .add_mapping(["/"]);
        ctx.add_interceptor("audit", RecordingInterceptor("audit".into(), journal.clone()))
            .add_mapping_for_url_patterns(["/api/*"]);
        ctx.add_interceptor("by-name", RecordingInterceptor("by-name".into(), journal.clone()))
            .add_mapping_for_handler_names(["json"]);
        ctx.start().unwrap();

        let api = ctx.find_match("/app/api/users.json").unwrap();
        assert_eq!(api.handler.name(), "api");
        assert_eq!(api.servlet_path, "/api/");
        let names: Vec<&str> = api.interceptors.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["audit"]);

        let json = ctx.find_match("/app/x/y.json").unwrap();
        assert_eq!(json.handler.name(), "json");
        assert_eq!(json.servlet_path, "/x/y.json");
        let names: Vec<&str> = json.interceptors.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["by-name"]);

        let fallback = ctx.find_match("/app/other").unwrap();
        assert!(fallback.is_default());

        assert!(ctx.find_match("/elsewhere").is_none());
        assert!(ctx.find_match("/application").is_none());
    }

    #[tokio::test]
    async fn test_registration_frozen_after_start() {
        let journal = Journal::default();
        let ctx = context("");
        let registration = ctx.add_handler("h", Recording::new("h", &journal));
        registration.add_mapping(["/h"]);
        assert!(registration.set_init_parameter("k", "v"));
        assert!(!registration.set_init_parameter("k", "other"));
        ctx.start().unwrap();

        assert!(ctx.handler_registration("h").is_none());
        let table = ctx.routes();
        let handler = table.handler_named("h").unwrap();
        assert_eq!(handler.patterns(), ["/h".to_string()]);
        assert_eq!(handler.init_parameters().get("k").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn test_duplicate_names_last_wins_for_lookup() {
        let journal = Journal::default();
        let ctx = context("");
        ctx.add_handler("dup", Recording::new("first", &journal))
            .add_mapping(["/one"]);
        ctx.add_handler("dup", Recording::new("second", &journal))
            .add_mapping(["/two"]);
        assert_eq!(ctx.handler_registration("dup").unwrap().mappings(), vec!["/two"]);
        ctx.start().unwrap();

        assert_eq!(ctx.routes().handler_named("dup").unwrap().patterns(), ["/two".to_string()]);
        assert!(ctx.find_match("/one").is_some());
        assert!(ctx.find_match("/two").is_some());
    }

    #[tokio::test]
    async fn test_late_registrations_are_dropped() {
        let journal = Journal::default();
        let ctx = context("");
        ctx.add_handler("early", Recording::new("early", &journal))
            .add_mapping(["/early"]);
        ctx.start().unwrap();

        let late = ctx.add_handler("late", Recording::new("late", &journal));
        late.add_mapping(["/late"]);
        assert_eq!(late.name(), "");
        assert!(ctx.handler_registration("late").is_none());
        ctx.add_interceptor("late", RecordingInterceptor("late".into(), journal.clone()))
            .add_mapping_for_url_patterns(["/*"]);
        assert!(ctx.pending.lock().unwrap().handlers.is_empty());
        assert!(ctx.pending.lock().unwrap().interceptors.is_empty());

        assert!(ctx.find_match("/late").is_none());
        assert!(ctx.find_match("/early").unwrap().interceptors.is_empty());
        ctx.stop();
        assert_eq!(*journal.lock().unwrap(), vec!["init early", "destroy early"]);
    }
}
