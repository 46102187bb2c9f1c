//! Handler and interceptor registrations.
//!
//! # Responsibilities
//! - Hold a registered instance with its mappings, init parameters and flags
//! - Expose fluent handles used by initializers and the config bootstrap
//!
//! # Design Decisions
//! - Registrations are mutable only while the context is being assembled; `start()`
//!   freezes them into `Arc`s inside an immutable route table
//! - Mapping patterns keep insertion order with duplicates dropped, so lookups are
//!   deterministic even though the contract treats them as a set

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::api::{Handler, Interceptor};
use crate::context::BridgeContext;
use crate::routing::matcher::Mapping;

/// A handler plus everything registered alongside it.
pub struct RegisteredHandler {
    name: String,
    instance: Arc<dyn Handler>,
    patterns: Vec<String>,
    mappings: Vec<Mapping>,
    init_parameters: BTreeMap<String, String>,
    load_on_startup: i32,
    async_supported: bool,
}

impl RegisteredHandler {
    pub(crate) fn new(name: impl Into<String>, instance: Arc<dyn Handler>) -> Self {
        Self {
            name: name.into(),
            instance,
            patterns: Vec::new(),
            mappings: Vec::new(),
            init_parameters: BTreeMap::new(),
            load_on_startup: 0,
            async_supported: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> &Arc<dyn Handler> {
        &self.instance
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn init_parameters(&self) -> &BTreeMap<String, String> {
        &self.init_parameters
    }

    pub fn load_on_startup(&self) -> i32 {
        self.load_on_startup
    }

    pub fn is_async_supported(&self) -> bool {
        self.async_supported
    }

    /// First of this handler's mappings that serves `path`, with its base path.
    pub fn base_path(&self, path: &str) -> Option<String> {
        self.mappings.iter().find_map(|m| m.base_path(path))
    }

    fn add_patterns<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for pattern in patterns {
            let pattern = pattern.into();
            if !self.patterns.contains(&pattern) {
                self.mappings.push(Mapping::parse(&pattern));
                self.patterns.push(pattern);
            }
        }
    }
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("name", &self.name)
            .field("patterns", &self.patterns)
            .field("load_on_startup", &self.load_on_startup)
            .field("async_supported", &self.async_supported)
            .finish()
    }
}

/// An interceptor plus its URL-pattern and handler-name mappings.
pub struct RegisteredInterceptor {
    name: String,
    instance: Arc<dyn Interceptor>,
    patterns: Vec<String>,
    mappings: Vec<Mapping>,
    handler_names: Vec<String>,
    init_parameters: BTreeMap<String, String>,
    async_supported: bool,
}

impl RegisteredInterceptor {
    pub(crate) fn new(name: impl Into<String>, instance: Arc<dyn Interceptor>) -> Self {
        Self {
            name: name.into(),
            instance,
            patterns: Vec::new(),
            mappings: Vec::new(),
            handler_names: Vec::new(),
            init_parameters: BTreeMap::new(),
            async_supported: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> &Arc<dyn Interceptor> {
        &self.instance
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn handler_names(&self) -> &[String] {
        &self.handler_names
    }

    pub fn init_parameters(&self) -> &BTreeMap<String, String> {
        &self.init_parameters
    }

    pub fn is_async_supported(&self) -> bool {
        self.async_supported
    }

    /// True when this interceptor applies to `handler_name` or to `path`.
    pub fn applies_to(&self, handler_name: &str, path: &str) -> bool {
        self.handler_names.iter().any(|n| n == handler_name)
            || self.mappings.iter().any(|m| m.base_path(path).is_some())
    }
}

impl fmt::Debug for RegisteredInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredInterceptor")
            .field("name", &self.name)
            .field("patterns", &self.patterns)
            .field("handler_names", &self.handler_names)
            .field("async_supported", &self.async_supported)
            .finish()
    }
}

/// Handle returned by [`BridgeContext::add_handler`].
///
/// Mutations after `start()` are ignored with a warning.
#[derive(Clone, Copy)]
pub struct HandlerRegistration<'a> {
    context: &'a BridgeContext,
    id: usize,
}

impl<'a> HandlerRegistration<'a> {
    pub(crate) fn new(context: &'a BridgeContext, id: usize) -> Self {
        Self { context, id }
    }

    /// Handle that refers to no pending registration; every mutation is a no-op.
    pub(crate) fn detached(context: &'a BridgeContext) -> Self {
        Self::new(context, usize::MAX)
    }

    pub fn add_mapping<I, S>(&self, patterns: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context
            .with_pending_handler(self.id, |h| h.add_patterns(patterns));
        self
    }

    /// Sets an init parameter. Returns false when the key was already set.
    pub fn set_init_parameter(&self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let (key, value) = (key.into(), value.into());
        self.context
            .with_pending_handler(self.id, |h| {
                if h.init_parameters.contains_key(&key) {
                    false
                } else {
                    h.init_parameters.insert(key, value);
                    true
                }
            })
            .unwrap_or(false)
    }

    pub fn set_async_supported(&self, async_supported: bool) -> &Self {
        self.context
            .with_pending_handler(self.id, |h| h.async_supported = async_supported);
        self
    }

    pub fn set_load_on_startup(&self, priority: i32) -> &Self {
        self.context
            .with_pending_handler(self.id, |h| h.load_on_startup = priority);
        self
    }

    pub fn name(&self) -> String {
        self.context
            .with_pending_handler(self.id, |h| h.name.clone())
            .unwrap_or_default()
    }

    pub fn mappings(&self) -> Vec<String> {
        self.context
            .with_pending_handler(self.id, |h| h.patterns.clone())
            .unwrap_or_default()
    }
}

/// Handle returned by [`BridgeContext::add_interceptor`].
#[derive(Clone, Copy)]
pub struct InterceptorRegistration<'a> {
    context: &'a BridgeContext,
    id: usize,
}

impl<'a> InterceptorRegistration<'a> {
    pub(crate) fn new(context: &'a BridgeContext, id: usize) -> Self {
        Self { context, id }
    }

    /// Handle that refers to no pending registration; every mutation is a no-op.
    pub(crate) fn detached(context: &'a BridgeContext) -> Self {
        Self::new(context, usize::MAX)
    }

    pub fn add_mapping_for_url_patterns<I, S>(&self, patterns: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.with_pending_interceptor(self.id, |i| {
            for pattern in patterns {
                let pattern = pattern.into();
                if !i.patterns.contains(&pattern) {
                    i.mappings.push(Mapping::parse(&pattern));
                    i.patterns.push(pattern);
                }
            }
        });
        self
    }

    pub fn add_mapping_for_handler_names<I, S>(&self, names: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.with_pending_interceptor(self.id, |i| {
            for name in names {
                let name = name.into();
                if !i.handler_names.contains(&name) {
                    i.handler_names.push(name);
                }
            }
        });
        self
    }

    pub fn set_init_parameter(&self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let (key, value) = (key.into(), value.into());
        self.context
            .with_pending_interceptor(self.id, |i| {
                if i.init_parameters.contains_key(&key) {
                    false
                } else {
                    i.init_parameters.insert(key, value);
                    true
                }
            })
            .unwrap_or(false)
    }

    pub fn set_async_supported(&self, async_supported: bool) -> &Self {
        self.context
            .with_pending_interceptor(self.id, |i| i.async_supported = async_supported);
        self
    }

    pub fn name(&self) -> String {
        self.context
            .with_pending_interceptor(self.id, |i| i.name.clone())
            .unwrap_or_default()
    }
}
