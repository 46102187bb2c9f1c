//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the context and its worker pool from validated configuration
//! - Instantiate configured components through the registry
//! - Run startup initializers, then start the context
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - A failed start still destroys what was initialized and stops the pool
//! - Initializers run after configured registrations, so they can amend them

use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::context::{BridgeContext, ComponentRegistry};
use crate::error::{guard, BridgeError, BridgeResult};

/// Assemble and start a context from configuration.
pub fn bootstrap(config: &BridgeConfig, registry: &ComponentRegistry) -> BridgeResult<Arc<BridgeContext>> {
    let context = Arc::new(BridgeContext::new(&config.context, &config.executor)?);

    if let Err(e) = assemble(&context, config, registry) {
        context.stop();
        return Err(e);
    }
    if let Err(e) = context.start() {
        tracing::error!(error = %e, "Context failed to start");
        context.stop();
        return Err(e);
    }
    Ok(context)
}

fn assemble(context: &BridgeContext, config: &BridgeConfig, registry: &ComponentRegistry) -> BridgeResult<()> {
    for class_name in &config.listeners {
        context.add_listener(registry.instantiate_listener(class_name)?);
    }

    for descriptor in &config.handlers {
        let instance = registry.instantiate_handler(&descriptor.class_name)?;
        let name = descriptor.registration_name();
        let registration = context.add_handler_instance(name, instance);
        registration
            .add_mapping(descriptor.mappings.iter().cloned())
            .set_async_supported(descriptor.async_supported)
            .set_load_on_startup(descriptor.load_on_startup);
        for (key, value) in &descriptor.init_parameters {
            registration.set_init_parameter(key.clone(), value.clone());
        }
        if !descriptor.async_supported {
            tracing::info!(handler = %name, "Handler is not async-capable, it runs on the worker pool");
        }
    }

    for descriptor in &config.interceptors {
        let instance = registry.instantiate_interceptor(&descriptor.class_name)?;
        let name = descriptor.registration_name();
        let registration = context.add_interceptor_instance(name, instance);
        registration
            .add_mapping_for_url_patterns(descriptor.mappings.iter().cloned())
            .add_mapping_for_handler_names(descriptor.handler_names.iter().cloned())
            .set_async_supported(descriptor.async_supported);
        for (key, value) in &descriptor.init_parameters {
            registration.set_init_parameter(key.clone(), value.clone());
        }
        if !descriptor.async_supported {
            tracing::info!(interceptor = %name, "Interceptor is not async-capable");
        }
    }

    for class_name in &config.initializers {
        let initializer = registry.instantiate_initializer(class_name)?;
        guard(|| initializer.on_startup(context)).map_err(|source| BridgeError::Initializer {
            name: class_name.clone(),
            source,
        })?;
        tracing::debug!(initializer = %class_name, "Initializer ran");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, HandlerDescriptor};
    use crate::samples;

    #[tokio::test]
    async fn test_bootstrap_sample_config() {
        let config = parse_config(
            r#"
initializers = ["setup"]
listeners = ["startup-log"]

[[handlers]]
class_name = "request-info"
name = "info"
mappings = ["/info/*"]
init_parameters = { greeting = "hi" }

[[interceptors]]
class_name = "powered-by"
mappings = ["/*"]
"#,
        )
        .unwrap();
        let context = bootstrap(&config, &samples::default_registry()).unwrap();

        let info = context.find_match("/info/a").unwrap();
        assert_eq!(info.handler.name(), "info");
        assert_eq!(info.interceptors.len(), 1);
        assert!(!info.handler.is_async_supported());
        // registered by the setup initializer
        assert!(context.find_match("/sync").is_some());
        assert!(context.find_match("/asyncdispatch").is_some());
        context.stop();
    }

    #[tokio::test]
    async fn test_unknown_class_is_fatal() {
        let mut config = BridgeConfig::default();
        config.handlers.push(HandlerDescriptor {
            class_name: "nope".into(),
            name: None,
            mappings: vec!["/x".into()],
            async_supported: false,
            load_on_startup: 0,
            init_parameters: Default::default(),
        });
        let err = bootstrap(&config, &samples::default_registry()).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownClass { kind: "handler", .. }));
    }

    #[tokio::test]
    async fn test_failing_initializer_is_fatal() {
        let mut config = BridgeConfig::default();
        config.initializers.push("failing".into());
        let registry = samples::default_registry()
            .with_initializer("failing", || samples::FailingInitializer);
        let err = bootstrap(&config, &registry).unwrap_err();
        assert!(matches!(err, BridgeError::Initializer { ref name, .. } if name == "failing"));
    }
}
