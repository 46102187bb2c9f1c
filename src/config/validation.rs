//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (interceptors name existing handlers)
//! - Validate value ranges (pool sizes, context path shape)
//! - Detect conflicting registrations
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::BridgeConfig;
use crate::routing::matcher::is_valid_pattern;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let path = &config.context.path;
    if !path.is_empty() && (!path.starts_with('/') || path.ends_with('/')) {
        errors.push(ValidationError::new(
            "context.path",
            format!("'{}' must be empty or start with '/' without a trailing '/'", path),
        ));
    }

    if config.executor.max == 0 {
        errors.push(ValidationError::new("executor.max", "must be at least 1"));
    }
    if config.executor.core > config.executor.max {
        errors.push(ValidationError::new(
            "executor.core",
            format!(
                "core ({}) must not exceed max ({})",
                config.executor.core, config.executor.max
            ),
        ));
    }

    let mut handler_names = HashSet::new();
    for (i, handler) in config.handlers.iter().enumerate() {
        let field = format!("handlers[{}]", i);
        if handler.class_name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.class_name", field), "must not be empty"));
        }
        check_patterns(&field, &handler.mappings, &mut errors);
        if !handler_names.insert(handler.registration_name()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate handler name '{}'", handler.registration_name()),
            ));
        }
    }

    let mut interceptor_names = HashSet::new();
    for (i, interceptor) in config.interceptors.iter().enumerate() {
        let field = format!("interceptors[{}]", i);
        if interceptor.class_name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.class_name", field), "must not be empty"));
        }
        check_patterns(&field, &interceptor.mappings, &mut errors);
        for name in &interceptor.handler_names {
            if !handler_names.contains(name.as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.handler_names", field),
                    format!("unknown handler '{}'", name),
                ));
            }
        }
        if !interceptor_names.insert(interceptor.registration_name()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate interceptor name '{}'", interceptor.registration_name()),
            ));
        }
    }

    for (field, names) in [("initializers", &config.initializers), ("listeners", &config.listeners)] {
        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                errors.push(ValidationError::new(format!("{}[{}]", field, i), "must not be empty"));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_patterns(field: &str, patterns: &[String], errors: &mut Vec<ValidationError>) {
    for pattern in patterns {
        if !is_valid_pattern(pattern) {
            errors.push(ValidationError::new(
                format!("{}.mappings", field),
                format!("unsupported pattern '{}'", pattern),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HandlerDescriptor, InterceptorDescriptor};

    fn handler(class_name: &str, mappings: &[&str]) -> HandlerDescriptor {
        HandlerDescriptor {
            class_name: class_name.to_string(),
            name: None,
            mappings: mappings.iter().map(|m| m.to_string()).collect(),
            async_supported: false,
            load_on_startup: 0,
            init_parameters: Default::default(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&BridgeConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = BridgeConfig::default();
        config.context.path = "app/".into();
        config.executor.core = 8;
        config.executor.max = 4;
        config.handlers.push(handler("sync", &["/sync", "*.", "/a/*/b"]));
        config.handlers.push(handler("sync", &["/other"]));
        config.interceptors.push(InterceptorDescriptor {
            class_name: "".into(),
            name: Some("audit".into()),
            mappings: vec![],
            handler_names: vec!["missing".into()],
            async_supported: false,
            init_parameters: Default::default(),
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "context.path",
                "executor.core",
                "handlers[0].mappings",
                "handlers[0].mappings",
                "handlers[1].name",
                "interceptors[0].class_name",
                "interceptors[0].handler_names",
            ]
        );
    }

    #[test]
    fn test_valid_context_paths() {
        for path in ["", "/app", "/a/b"] {
            let mut config = BridgeConfig::default();
            config.context.path = path.into();
            assert!(validate_config(&config).is_ok(), "{} should be valid", path);
        }
    }
}
