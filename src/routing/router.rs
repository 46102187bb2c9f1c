//! Handler lookup.
//!
//! # Responsibilities
//! - Store frozen handler/interceptor registrations
//! - Look up the handler serving a context-relative path
//! - Collect the interceptors applying to that handler/path
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in registration order: first registered handler wins
//! - Explicit `None` rather than a silent default

use std::sync::Arc;

use crate::context::registration::{RegisteredHandler, RegisteredInterceptor};
use crate::routing::matcher::DEFAULT_MAPPING;

/// Result of resolving a request path.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Handler serving the request.
    pub handler: Arc<RegisteredHandler>,
    /// Interceptors to run before the handler, in registration order.
    pub interceptors: Vec<Arc<RegisteredInterceptor>>,
    /// Base path computed by the matching mapping.
    pub servlet_path: String,
}

impl MatchResult {
    /// True when the request was captured by the `/` mapping.
    pub fn is_default(&self) -> bool {
        self.servlet_path == DEFAULT_MAPPING
    }
}

/// Frozen registrations, in registration order.
#[derive(Debug, Default)]
pub struct RouteTable {
    handlers: Vec<Arc<RegisteredHandler>>,
    interceptors: Vec<Arc<RegisteredInterceptor>>,
}

impl RouteTable {
    pub fn new(
        handlers: Vec<Arc<RegisteredHandler>>,
        interceptors: Vec<Arc<RegisteredInterceptor>>,
    ) -> Self {
        Self {
            handlers,
            interceptors,
        }
    }

    pub fn handlers(&self) -> &[Arc<RegisteredHandler>] {
        &self.handlers
    }

    pub fn interceptors(&self) -> &[Arc<RegisteredInterceptor>] {
        &self.interceptors
    }

    /// Resolve a context-relative path.
    pub fn find(&self, path: &str) -> Option<MatchResult> {
        self.handlers.iter().find_map(|handler| {
            handler.base_path(path).map(|servlet_path| MatchResult {
                interceptors: self.matching_interceptors(handler.name(), path),
                handler: handler.clone(),
                servlet_path,
            })
        })
    }

    /// Last registered handler with this name.
    pub fn handler_named(&self, name: &str) -> Option<&Arc<RegisteredHandler>> {
        self.handlers.iter().rev().find(|h| h.name() == name)
    }

    fn matching_interceptors(&self, handler_name: &str, path: &str) -> Vec<Arc<RegisteredInterceptor>> {
        if self.interceptors.is_empty() {
            return Vec::new();
        }
        self.interceptors
            .iter()
            .filter(|i| i.applies_to(handler_name, path))
            .cloned()
            .collect()
    }
}
