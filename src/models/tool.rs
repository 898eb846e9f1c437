//! Tool descriptors and the request/result pair crossing the agent boundary.

use crate::error::{ErrorKind, GatewayError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

/// JSON type accepted for a tool argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    String,
    Integer,
    Boolean,
}

impl ArgumentType {
    /// JSON Schema type keyword.
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    /// Whether a JSON value has this type. Floats never satisfy `Integer`.
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// Declared argument of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ArgumentType,
    pub required: bool,
    pub description: String,
}

impl ArgumentSpec {
    pub fn required(
        name: impl Into<String>,
        kind: ArgumentType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(
        name: impl Into<String>,
        kind: ArgumentType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Immutable description of a registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// Ordered argument schema.
    pub arguments: Vec<ArgumentSpec>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_argument(mut self, argument: ArgumentSpec) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentSpec> {
        self.arguments.iter().find(|a| a.name == name)
    }

    /// JSON Schema object describing the arguments.
    pub fn input_schema(&self) -> Map<String, JsonValue> {
        let properties: Map<String, JsonValue> = self
            .arguments
            .iter()
            .map(|a| {
                (
                    a.name.clone(),
                    json!({ "type": a.kind.json_type(), "description": a.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .arguments
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name.as_str())
            .collect();

        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), JsonValue::Object(properties));
        schema.insert("required".into(), json!(required));
        schema.insert("additionalProperties".into(), json!(false));
        schema
    }
}

/// A tool invocation from the agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, JsonValue>,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Map<String, JsonValue>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Build a request from a JSON object literal; anything else yields no arguments.
    pub fn from_json(name: impl Into<String>, arguments: JsonValue) -> Self {
        let arguments = match arguments {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(name, arguments)
    }
}

/// Wire shape of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorEnvelope {
    pub error_kind: ErrorKind,
    pub message: String,
}

/// Outcome of a dispatched tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallResult {
    Success { payload: JsonValue },
    Failure { kind: ErrorKind, message: String },
}

impl ToolCallResult {
    pub fn success(payload: JsonValue) -> Self {
        Self::Success { payload }
    }

    pub fn failure(err: &GatewayError) -> Self {
        Self::Failure {
            kind: err.kind(),
            message: err.envelope_message(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn payload(&self) -> Option<&JsonValue> {
        match self {
            Self::Success { payload } => Some(payload),
            Self::Failure { .. } => None,
        }
    }

    /// The JSON returned to the agent: the payload, or `{error_kind, message}`.
    pub fn to_envelope(&self) -> JsonValue {
        match self {
            Self::Success { payload } => payload.clone(),
            Self::Failure { kind, message } => json!(ErrorEnvelope {
                error_kind: *kind,
                message: message.clone(),
            }),
        }
    }
}
