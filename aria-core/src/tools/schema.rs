//! Tool parameter schemas.
//!
//! Schemas are explicit descriptors declared at registration, converted to
//! the JSON-Schema object the session config carries. Parameters whose names
//! collide with `SpecialToolParameters` fields are filtered out so runtime
//! capabilities never leak into the model-facing schema; a tool declares the
//! specials it needs via `special()` instead.

use serde_json::{json, Map, Value};
use tracing::warn;

use super::SpecialToolParameters;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

#[derive(Debug, Clone)]
struct ParamSpec {
    name: String,
    param_type: ParamType,
    required: bool,
    description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ToolSchema {
    params: Vec<ParamSpec>,
    special_params: Vec<&'static str>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// A parameter the model must supply.
    pub fn required(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.param(name, param_type, true, description)
    }

    /// A parameter with a default — present in properties, absent from
    /// `required` (the Optional[T] case collapses to T here).
    pub fn optional(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.param(name, param_type, false, description)
    }

    fn param(mut self, name: &str, param_type: ParamType, required: bool, description: &str) -> Self {
        if SpecialToolParameters::is_special_name(name) {
            warn!("Parameter '{name}' shadows a special tool parameter; use special() instead");
            return self;
        }
        self.params.push(ParamSpec {
            name: name.to_string(),
            param_type,
            required,
            description: (!description.is_empty()).then(|| description.to_string()),
        });
        self
    }

    /// Declare a runtime-injected capability this tool needs. The executor
    /// fails the call if the value is unavailable; the schema never shows it.
    pub fn special(mut self, name: &'static str) -> Self {
        if !SpecialToolParameters::is_special_name(name) {
            warn!("Unknown special tool parameter '{name}'");
            return self;
        }
        if !self.special_params.contains(&name) {
            self.special_params.push(name);
        }
        self
    }

    pub fn special_params(&self) -> &[&'static str] {
        &self.special_params
    }

    /// The JSON-Schema object sent in the session config.
    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.params {
            let mut prop = Map::new();
            prop.insert("type".to_string(), json!(param.param_type.as_str()));
            if let Some(description) = &param.description {
                prop.insert("description".to_string(), json!(description));
            }
            properties.insert(param.name.clone(), Value::Object(prop));
            if param.required {
                required.push(json!(param.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}
