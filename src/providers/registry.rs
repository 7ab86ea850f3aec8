//! Tool registry - the ordered set of tools a provider serves
//!
//! Each entry pairs a `ToolDescriptor` with the handler that executes it.
//! Arguments are checked against the descriptor before the handler runs.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::domain::ToolDescriptor;
use crate::error::{GatewayError, Result};
use crate::ipc::{ErrorCode, RpcError};

/// Structured failure reported by a tool
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolFault {
    /// Arguments did not match the tool's parameters
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran and failed; `kind` is e.g. `DatabaseError`, `SecurityError`, `NotFoundError`
    #[error("{message}")]
    Failed {
        kind: String,
        message: String,
        details: Value,
    },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolFault {
    pub fn failed(kind: impl Into<String>, message: impl Into<String>, details: Value) -> Self {
        Self::Failed {
            kind: kind.into(),
            message: message.into(),
            details,
        }
    }

    /// Wire form of the fault
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::InvalidArguments(msg) => RpcError::with_data(
                ErrorCode::INVALID_PARAMS,
                self.to_string(),
                json!({"type": "InvalidArguments", "details": msg}),
            ),
            Self::Failed { kind, message, details } => RpcError::with_data(
                ErrorCode::TOOL_FAILED,
                message.clone(),
                json!({"type": kind, "details": details}),
            ),
            Self::UnknownTool(name) => RpcError::unknown_tool(name.clone()),
        }
    }
}

/// Executes one tool. Runs on the blocking pool.
pub trait ToolHandler: Send + Sync {
    fn call(&self, arguments: &Map<String, Value>) -> std::result::Result<Value, ToolFault>;
}

impl<F> ToolHandler for F
where
    F: Fn(&Map<String, Value>) -> std::result::Result<Value, ToolFault> + Send + Sync,
{
    fn call(&self, arguments: &Map<String, Value>) -> std::result::Result<Value, ToolFault> {
        self(arguments)
    }
}

/// Produces the content of a read-only resource such as `memo://insights`
pub type ResourceReader = Arc<dyn Fn() -> std::result::Result<Value, ToolFault> + Send + Sync>;

pub struct ToolRegistry {
    provider_id: String,
    tools: Vec<(ToolDescriptor, Arc<dyn ToolHandler>)>,
    resources: Vec<(String, ResourceReader)>,
}

impl ToolRegistry {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            tools: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Register a tool. Names must be unique within the registry.
    pub fn register<F>(&mut self, descriptor: ToolDescriptor, handler: F) -> Result<()>
    where
        F: Fn(&Map<String, Value>) -> std::result::Result<Value, ToolFault> + Send + Sync + 'static,
    {
        if self.find(&descriptor.name).is_some() {
            return Err(GatewayError::Configuration(format!(
                "Tool '{}' registered twice on provider '{}'",
                descriptor.name, self.provider_id
            )));
        }
        let descriptor = descriptor.for_provider(self.provider_id.clone());
        self.tools.push((descriptor, Arc::new(handler)));
        Ok(())
    }

    pub fn register_resource<F>(&mut self, uri: impl Into<String>, reader: F)
    where
        F: Fn() -> std::result::Result<Value, ToolFault> + Send + Sync + 'static,
    {
        self.resources.push((uri.into(), Arc::new(reader)));
    }

    /// Descriptors in registration order
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|(d, _)| d.clone()).collect()
    }

    pub fn resource_uris(&self) -> Vec<&str> {
        self.resources.iter().map(|(uri, _)| uri.as_str()).collect()
    }

    fn find(&self, name: &str) -> Option<&(ToolDescriptor, Arc<dyn ToolHandler>)> {
        self.tools.iter().find(|(d, _)| d.name == name)
    }

    /// Validate arguments and run the tool
    pub fn invoke(&self, name: &str, arguments: &Map<String, Value>) -> std::result::Result<Value, ToolFault> {
        let (descriptor, handler) = self.find(name).ok_or_else(|| ToolFault::UnknownTool(name.to_string()))?;
        validate_arguments(descriptor, arguments)?;

        log::info!("Executing tool '{}'", name);
        let result = handler.call(arguments);
        if let Err(fault) = &result {
            log::warn!("Tool '{}' failed: {}", name, fault);
        }
        result
    }

    pub fn read_resource(&self, uri: &str) -> std::result::Result<Value, ToolFault> {
        let (_, reader) = self
            .resources
            .iter()
            .find(|(u, _)| u == uri)
            .ok_or_else(|| {
                ToolFault::failed("NotFoundError", format!("Unknown resource: {}", uri), json!({"uri": uri}))
            })?;
        log::info!("Reading resource {}", uri);
        reader()
    }
}

/// Check required parameters, JSON types and allowed values
pub fn validate_arguments(
    descriptor: &ToolDescriptor,
    arguments: &Map<String, Value>,
) -> std::result::Result<(), ToolFault> {
    for param in &descriptor.parameters {
        let value = match arguments.get(&param.name) {
            None | Some(Value::Null) if param.required => {
                return Err(ToolFault::InvalidArguments(format!(
                    "missing required argument '{}'",
                    param.name
                )));
            }
            None | Some(Value::Null) => continue,
            Some(value) => value,
        };

        if !param.param_type.accepts(value) {
            return Err(ToolFault::InvalidArguments(format!(
                "argument '{}' must be of type {}",
                param.name,
                param.param_type.schema_name()
            )));
        }

        if !param.allowed.is_empty() {
            let accepted = value.as_str().is_some_and(|s| param.allowed.iter().any(|a| a == s));
            if !accepted {
                return Err(ToolFault::InvalidArguments(format!(
                    "argument '{}' must be one of: {}",
                    param.name,
                    param.allowed.join(", ")
                )));
            }
        }
    }

    for name in arguments.keys() {
        if descriptor.param(name).is_none() {
            log::debug!("Ignoring unexpected argument '{}' for tool '{}'", name, descriptor.name);
        }
    }
    Ok(())
}

/// Fetch a string argument that validation has already checked
pub fn str_arg<'a>(arguments: &'a Map<String, Value>, name: &str) -> std::result::Result<&'a str, ToolFault> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolFault::InvalidArguments(format!("missing required argument '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParamSpec, ParamType};

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new("test");
        registry
            .register(
                ToolDescriptor::new("echo", "Echo text")
                    .with_param(ParamSpec::required("text", ParamType::String, "Text"))
                    .with_param(ParamSpec::optional("mode", ParamType::String, "Mode").with_allowed(&["loud", "quiet"]))
                    .with_param(ParamSpec::optional("times", ParamType::Integer, "Repeat")),
                |args| Ok(json!(str_arg(args, "text")?)),
            )
            .unwrap();
        registry
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_invoke_success_and_stamping() {
        let registry = echo_registry();
        assert_eq!(registry.invoke("echo", &args(json!({"text": "hi"}))).unwrap(), json!("hi"));
        assert_eq!(registry.descriptors()[0].provider_id, "test");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = echo_registry();
        let err = registry
            .register(ToolDescriptor::new("echo", ""), |_| Ok(Value::Null))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[test]
    fn test_unknown_tool() {
        let err = echo_registry().invoke("nope", &Map::new()).unwrap_err();
        assert_eq!(err, ToolFault::UnknownTool("nope".into()));
        assert_eq!(err.to_rpc_error().code, ErrorCode::UNKNOWN_TOOL);
    }

    #[test]
    fn test_missing_required() {
        let err = echo_registry().invoke("echo", &args(json!({"text": null}))).unwrap_err();
        assert!(matches!(err, ToolFault::InvalidArguments(ref m) if m.contains("'text'")));
    }

    #[test]
    fn test_wrong_type() {
        let err = echo_registry()
            .invoke("echo", &args(json!({"text": "hi", "times": "three"})))
            .unwrap_err();
        assert!(err.to_string().contains("must be of type integer"));
    }

    #[test]
    fn test_allowed_values() {
        let registry = echo_registry();
        assert!(registry.invoke("echo", &args(json!({"text": "a", "mode": "loud"}))).is_ok());
        let err = registry
            .invoke("echo", &args(json!({"text": "a", "mode": "shouty"})))
            .unwrap_err();
        assert!(err.to_string().contains("one of: loud, quiet"));
    }

    #[test]
    fn test_extra_arguments_ignored() {
        assert!(echo_registry().invoke("echo", &args(json!({"text": "a", "extra": 1}))).is_ok());
    }

    #[test]
    fn test_failed_fault_wire_form() {
        let fault = ToolFault::failed("DatabaseError", "Failed to execute read query: boom", json!({"query": "SELEC"}));
        let err = fault.to_rpc_error();
        assert_eq!(err.code, ErrorCode::TOOL_FAILED);
        assert_eq!(err.message, "Failed to execute read query: boom");
        let data = err.data.unwrap();
        assert_eq!(data["type"], "DatabaseError");
        assert_eq!(data["details"]["query"], "SELEC");
    }

    #[test]
    fn test_resources() {
        let mut registry = echo_registry();
        registry.register_resource("memo://test", || Ok(json!("memo")));
        assert_eq!(registry.resource_uris(), vec!["memo://test"]);
        assert_eq!(registry.read_resource("memo://test").unwrap(), json!("memo"));
        assert!(registry.read_resource("memo://other").is_err());
    }
}
