//! Tool descriptors and provider endpoints

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// JSON type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    /// JSON Schema type name
    pub fn schema_name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }

    /// Check whether a JSON value has this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }
}

/// One entry of a tool's ordered parameter list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    /// Closed set of accepted string values, empty when unconstrained
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            description: description.into(),
            allowed: Vec::new(),
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// Restrict the parameter to a fixed set of string values
    pub fn with_allowed(mut self, values: &[&str]) -> Self {
        self.allowed = values.iter().map(|v| v.to_string()).collect();
        self
    }
}

/// A tool as advertised by a provider. Identity is `(provider_id, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
    /// Stamped by the gateway from its own configuration, not trusted from the wire
    #[serde(default)]
    pub provider_id: String,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            provider_id: String::new(),
        }
    }

    /// Append a parameter, keeping declaration order
    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn for_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// JSON Schema object describing the parameters
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".to_string(), json!(param.param_type.schema_name()));
            if !param.description.is_empty() {
                prop.insert("description".to_string(), json!(param.description));
            }
            if !param.allowed.is_empty() {
                prop.insert("enum".to_string(), json!(param.allowed));
            }
            properties.insert(param.name.clone(), Value::Object(prop));

            if param.required {
                required.push(param.name.clone());
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }

    /// Function-calling entry in the shape Ollama and OpenAI-compatible APIs expect
    pub fn to_model_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema()
            }
        })
    }
}

/// A configured tool provider. Lives for the whole process.
#[derive(Debug)]
pub struct ProviderEndpoint {
    pub provider_id: String,
    /// host:port of the provider's RPC listener
    pub address: String,
    healthy: AtomicBool,
}

impl ProviderEndpoint {
    pub fn new(provider_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            address: address.into(),
            healthy: AtomicBool::new(false),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Record a health observation, returning the previous value
    pub fn observe(&self, healthy: bool) -> bool {
        let previous = self.healthy.swap(healthy, Ordering::SeqCst);
        if previous != healthy {
            if healthy {
                log::info!("Provider '{}' at {} is reachable", self.provider_id, self.address);
            } else {
                log::warn!("Provider '{}' at {} is unreachable", self.provider_id, self.address);
            }
        }
        previous
    }
}
