//! Handler contract.

use std::collections::BTreeMap;

use crate::context::BridgeContext;
use crate::error::HandlerError;
use crate::http::{RequestAdapter, ResponseAdapter};

/// A unit registered against path mappings that produces responses.
pub trait Handler: Send + Sync + 'static {
    /// Called once during context startup, in load-on-startup order.
    fn init(&self, _config: &HandlerConfig<'_>) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Service one request.
    fn service(
        &self,
        request: &RequestAdapter,
        response: &ResponseAdapter,
    ) -> Result<(), HandlerError>;

    /// Called once at context shutdown. Failures are logged, never propagated.
    fn destroy(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// View handed to `init` hooks: registration name, init parameters and the owning context.
#[derive(Clone, Copy)]
pub struct HandlerConfig<'a> {
    name: &'a str,
    init_parameters: &'a BTreeMap<String, String>,
    context: &'a BridgeContext,
}

impl<'a> HandlerConfig<'a> {
    pub(crate) fn new(
        name: &'a str,
        init_parameters: &'a BTreeMap<String, String>,
        context: &'a BridgeContext,
    ) -> Self {
        Self {
            name,
            init_parameters,
            context,
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn init_parameter(&self, key: &str) -> Option<&'a str> {
        self.init_parameters.get(key).map(String::as_str)
    }

    pub fn init_parameter_names(&self) -> impl Iterator<Item = &'a str> {
        self.init_parameters.keys().map(String::as_str)
    }

    pub fn context(&self) -> &'a BridgeContext {
        self.context
    }
}
