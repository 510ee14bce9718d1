//! Declared parameter schemas and argument validation.
//!
//! A [`ParamSchema`] is both the JSON Schema handed to the model and the
//! validator applied to whatever arguments the model sends back.

use serde_json::{json, Map, Value};
use tracing::debug;

use super::ToolError;

/// Type of a declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
    /// Inclusive bounds for integers; out-of-range values are clamped.
    pub range: Option<(i64, i64)>,
}

/// Ordered set of declared parameters for a tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    params: Vec<Param>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required parameter.
    pub fn required(mut self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
            default: None,
            range: None,
        });
        self
    }

    /// Declare an optional parameter with a default value.
    pub fn optional(mut self, name: &str, kind: ParamKind, description: &str, default: Value) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: false,
            default: Some(default),
            range: None,
        });
        self
    }

    /// Clamp an integer parameter into `min..=max`.
    pub fn clamp(mut self, name: &str, min: i64, max: i64) -> Self {
        if let Some(param) = self.params.iter_mut().find(|p| p.name == name) {
            param.range = Some((min, max));
        }
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Render as a JSON Schema object for function calling.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.params {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(param.kind.json_type()));
            prop.insert("description".into(), json!(param.description));
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            if let Some((min, max)) = param.range {
                prop.insert("minimum".into(), json!(min));
                prop.insert("maximum".into(), json!(max));
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
        })
    }

    /// Validate raw arguments, applying defaults and clamps.
    ///
    /// Integers sent as numeric strings are accepted, since smaller models
    /// often quote them. Undeclared keys are dropped.
    pub fn validate(&self, tool: &str, raw: &Value) -> Result<Arguments, ToolError> {
        let empty = Map::new();
        let given = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(ToolError::invalid(
                    tool,
                    format!("arguments must be an object, got {}", type_name(other)),
                ))
            }
        };

        for key in given.keys() {
            if !self.params.iter().any(|p| &p.name == key) {
                debug!(tool, key = %key, "Dropping undeclared tool argument");
            }
        }

        let mut values = Map::new();
        for param in &self.params {
            let value = match given.get(&param.name) {
                Some(Value::Null) | None => match (&param.default, param.required) {
                    (_, true) => {
                        return Err(ToolError::invalid(
                            tool,
                            format!("missing required parameter '{}'", param.name),
                        ))
                    }
                    (Some(default), false) => default.clone(),
                    (None, false) => continue,
                },
                Some(value) => coerce(tool, param, value)?,
            };
            values.insert(param.name.clone(), value);
        }

        Ok(Arguments { values })
    }
}

fn coerce(tool: &str, param: &Param, value: &Value) -> Result<Value, ToolError> {
    let mismatch = || {
        ToolError::invalid(
            tool,
            format!(
                "parameter '{}' must be {}, got {}",
                param.name,
                param.kind.json_type(),
                type_name(value)
            ),
        )
    };

    match param.kind {
        ParamKind::String => {
            let s = value.as_str().ok_or_else(mismatch)?;
            if param.required && s.trim().is_empty() {
                return Err(ToolError::invalid(
                    tool,
                    format!("parameter '{}' must not be empty", param.name),
                ));
            }
            Ok(json!(s))
        }
        ParamKind::Integer => {
            let n = match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .ok_or_else(mismatch)?;
            let n = match param.range {
                Some((min, max)) => n.clamp(min, max),
                None => n,
            };
            Ok(json!(n))
        }
        ParamKind::Boolean => match value {
            Value::Bool(b) => Ok(json!(b)),
            Value::String(s) if s == "true" || s == "false" => Ok(json!(s == "true")),
            _ => Err(mismatch()),
        },
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Arguments that passed schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Arguments {
    values: Map<String, Value>,
}

impl Arguments {
    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}
