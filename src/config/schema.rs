//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host listener configuration.
    pub listener: ListenerConfig,

    /// Context-wide settings (mount path, encodings, body limit).
    pub context: ContextConfig,

    /// Worker pool sizing.
    pub executor: ExecutorConfig,

    /// Startup initializer identifiers, run once before handlers initialize.
    pub initializers: Vec<String>,

    /// Context listener identifiers.
    pub listeners: Vec<String>,

    /// Handler descriptors.
    pub handlers: Vec<HandlerDescriptor>,

    /// Interceptor descriptors.
    pub interceptors: Vec<InterceptorDescriptor>,

    /// Host-level timeouts.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Settings shared by every request served through the context.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Fixed prefix stripped before matching ("" or "/app").
    pub path: String,

    /// Request encoding used when neither the request nor its Content-Type names one.
    pub request_encoding: String,

    /// Response encoding used when the handler does not set one.
    pub response_encoding: String,

    /// Maximum buffered request body in bytes.
    pub max_body_size: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            request_encoding: "ISO-8859-1".to_string(),
            response_encoding: "ISO-8859-1".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Async worker threads of the pool runtime.
    pub core: usize,

    /// Maximum threads running blocking handler work.
    pub max: usize,

    /// Tasks allowed to wait once `max` are running.
    pub queue_capacity: usize,

    /// Idle time before a blocking thread is reaped.
    pub keep_alive: KeepAlive,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            core: 2,
            max: 512,
            queue_capacity: 10_000,
            keep_alive: KeepAlive::default(),
        }
    }
}

/// Keep-alive expressed as value + unit.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeepAlive {
    pub value: u64,
    pub unit: TimeUnit,
}

impl KeepAlive {
    pub fn to_duration(&self) -> Duration {
        self.unit.to_duration(self.value)
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            value: 60,
            unit: TimeUnit::Seconds,
        }
    }
}

/// Time unit for keep-alive values.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn to_duration(self, value: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(value),
            TimeUnit::Microseconds => Duration::from_micros(value),
            TimeUnit::Milliseconds => Duration::from_millis(value),
            TimeUnit::Seconds => Duration::from_secs(value),
            TimeUnit::Minutes => Duration::from_secs(value.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(value.saturating_mul(3_600)),
            TimeUnit::Days => Duration::from_secs(value.saturating_mul(86_400)),
        }
    }
}

/// A handler to instantiate and register at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandlerDescriptor {
    /// Component registry identifier.
    pub class_name: String,

    /// Registration name (defaults to `class_name`).
    #[serde(default)]
    pub name: Option<String>,

    /// Mapping patterns.
    #[serde(default)]
    pub mappings: Vec<String>,

    /// Run inline on the host thread instead of the worker pool.
    #[serde(default)]
    pub async_supported: bool,

    /// Startup priority (lower loads first, destroyed last).
    #[serde(default)]
    pub load_on_startup: i32,

    /// Parameters exposed to the init hook.
    #[serde(default)]
    pub init_parameters: BTreeMap<String, String>,
}

impl HandlerDescriptor {
    pub fn registration_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.class_name)
    }
}

/// An interceptor to instantiate and register at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterceptorDescriptor {
    /// Component registry identifier.
    pub class_name: String,

    /// Registration name (defaults to `class_name`).
    #[serde(default)]
    pub name: Option<String>,

    /// URL patterns.
    #[serde(default)]
    pub mappings: Vec<String>,

    /// Handler names the interceptor applies to regardless of path.
    #[serde(default)]
    pub handler_names: Vec<String>,

    #[serde(default)]
    pub async_supported: bool,

    #[serde(default)]
    pub init_parameters: BTreeMap<String, String>,
}

impl InterceptorDescriptor {
    pub fn registration_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.class_name)
    }
}

/// Host-level timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time the host allows a request, in seconds (0 disables).
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
