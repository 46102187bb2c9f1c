//! Component registry.
//!
//! # Responsibilities
//! - Map configured class identifiers to factories
//! - Instantiate handlers, interceptors, context listeners and initializers at startup
//!
//! # Design Decisions
//! - Explicit factories keyed by string, resolved once at startup; no runtime type lookup
//! - An unknown identifier is a fatal configuration error

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::api::{ContextListener, Handler, Initializer, Interceptor};
use crate::error::{BridgeError, BridgeResult};

type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Factories for every component kind that configuration can name.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    handlers: HashMap<String, Factory<Arc<dyn Handler>>>,
    interceptors: HashMap<String, Factory<Arc<dyn Interceptor>>>,
    listeners: HashMap<String, Factory<Arc<dyn ContextListener>>>,
    initializers: HashMap<String, Factory<Arc<dyn Initializer>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler<H, F>(mut self, class_name: impl Into<String>, factory: F) -> Self
    where
        H: Handler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.handlers.insert(
            class_name.into(),
            Arc::new(move || Arc::new(factory()) as Arc<dyn Handler>),
        );
        self
    }

    pub fn with_interceptor<I, F>(mut self, class_name: impl Into<String>, factory: F) -> Self
    where
        I: Interceptor,
        F: Fn() -> I + Send + Sync + 'static,
    {
        self.interceptors.insert(
            class_name.into(),
            Arc::new(move || Arc::new(factory()) as Arc<dyn Interceptor>),
        );
        self
    }

    pub fn with_listener<L, F>(mut self, class_name: impl Into<String>, factory: F) -> Self
    where
        L: ContextListener,
        F: Fn() -> L + Send + Sync + 'static,
    {
        self.listeners.insert(
            class_name.into(),
            Arc::new(move || Arc::new(factory()) as Arc<dyn ContextListener>),
        );
        self
    }

    pub fn with_initializer<I, F>(mut self, class_name: impl Into<String>, factory: F) -> Self
    where
        I: Initializer,
        F: Fn() -> I + Send + Sync + 'static,
    {
        self.initializers.insert(
            class_name.into(),
            Arc::new(move || Arc::new(factory()) as Arc<dyn Initializer>),
        );
        self
    }

    pub fn instantiate_handler(&self, class_name: &str) -> BridgeResult<Arc<dyn Handler>> {
        instantiate(&self.handlers, "handler", class_name)
    }

    pub fn instantiate_interceptor(&self, class_name: &str) -> BridgeResult<Arc<dyn Interceptor>> {
        instantiate(&self.interceptors, "interceptor", class_name)
    }

    pub fn instantiate_listener(&self, class_name: &str) -> BridgeResult<Arc<dyn ContextListener>> {
        instantiate(&self.listeners, "listener", class_name)
    }

    pub fn instantiate_initializer(&self, class_name: &str) -> BridgeResult<Arc<dyn Initializer>> {
        instantiate(&self.initializers, "initializer", class_name)
    }
}

fn instantiate<T>(
    factories: &HashMap<String, Factory<T>>,
    kind: &'static str,
    class_name: &str,
) -> BridgeResult<T> {
    factories
        .get(class_name)
        .map(|factory| factory())
        .ok_or_else(|| BridgeError::UnknownClass {
            kind,
            class_name: class_name.to_string(),
        })
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handlers: Vec<&String> = self.handlers.keys().collect();
        handlers.sort();
        let mut interceptors: Vec<&String> = self.interceptors.keys().collect();
        interceptors.sort();
        f.debug_struct("ComponentRegistry")
            .field("handlers", &handlers)
            .field("interceptors", &interceptors)
            .field("listeners", &self.listeners.len())
            .field("initializers", &self.initializers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::http::{RequestAdapter, ResponseAdapter};

    struct Hello;

    impl Handler for Hello {
        fn service(&self, _: &RequestAdapter, response: &ResponseAdapter) -> Result<(), HandlerError> {
            response.print("hello");
            Ok(())
        }
    }

    #[test]
    fn test_instantiate_known_and_unknown() {
        let registry = ComponentRegistry::new().with_handler("hello", || Hello);
        assert!(registry.instantiate_handler("hello").is_ok());

        let err = registry.instantiate_handler("missing").err().unwrap();
        assert_eq!(err.to_string(), "unknown handler class 'missing'");
        assert!(matches!(
            registry.instantiate_interceptor("hello"),
            Err(BridgeError::UnknownClass { kind: "interceptor", .. })
        ));
    }

    #[test]
    fn test_each_instantiation_is_fresh() {
        let registry = ComponentRegistry::new().with_handler("hello", || Hello);
        let a = registry.instantiate_handler("hello").unwrap();
        let b = registry.instantiate_handler("hello").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
