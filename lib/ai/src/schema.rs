//! Typed tool advertisements.
//!
//! A [`ToolSchema`] describes one callable tool to the completion service:
//! name, description, and a typed parameter list. The typed form keeps the
//! advertisement cost walk exact and exports to the provider JSON shape via
//! [`ToolSchema::to_wire_json`].

use crate::estimate::{PARAMETER_OVERHEAD_TOKENS, TOOL_OVERHEAD_TOKENS, TokenEstimator};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// The JSON type tag of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// A string value.
    String,
    /// An integer value.
    Integer,
    /// A floating-point value.
    Number,
    /// A boolean value.
    Boolean,
    /// A nested object.
    Object,
    /// An array value.
    Array,
}

impl ParameterKind {
    /// Returns the wire-format type tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// One parameter within a tool advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name.
    pub name: String,
    /// JSON type tag.
    pub kind: ParameterKind,
    /// Human-readable description shown to the model.
    pub description: String,
    /// Allowed values for enumerated parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    /// Whether the model must supply this parameter.
    #[serde(default)]
    pub required: bool,
}

impl ToolParameter {
    /// Creates a new parameter.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: ParameterKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            enum_values: Vec::new(),
            required: false,
        }
    }

    /// Restricts the parameter to an enumerated set of values.
    #[must_use]
    pub fn with_enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the parameter as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Definition of one callable tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Typed parameter list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ToolParameter>,
}

impl ToolSchema {
    /// Creates a new tool schema.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Exports the advertisement in the provider JSON shape.
    #[must_use]
    pub fn to_wire_json(&self) -> JsonValue {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for parameter in &self.parameters {
            let mut property = serde_json::Map::new();
            property.insert("type".to_string(), json!(parameter.kind.as_str()));
            property.insert("description".to_string(), json!(parameter.description));
            if !parameter.enum_values.is_empty() {
                property.insert("enum".to_string(), json!(parameter.enum_values));
            }
            properties.insert(parameter.name.clone(), JsonValue::Object(property));
            if parameter.required {
                required.push(parameter.name.clone());
            }
        }

        json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        })
    }

    /// Computes the token cost of advertising this tool.
    ///
    /// Per tool: a fixed overhead plus the name and description costs; per
    /// parameter: a fixed overhead plus the name, type tag, description,
    /// and each enumerated value.
    #[must_use]
    pub fn advertisement_cost(&self, estimator: &dyn TokenEstimator) -> u32 {
        let mut total = TOOL_OVERHEAD_TOKENS
            + estimator.estimate(&self.name)
            + estimator.estimate(&self.description);

        for parameter in &self.parameters {
            total += PARAMETER_OVERHEAD_TOKENS
                + estimator.estimate(&parameter.name)
                + estimator.estimate(parameter.kind.as_str())
                + estimator.estimate(&parameter.description);
            for value in &parameter.enum_values {
                total += estimator.estimate(value);
            }
        }

        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::CharEstimator;

    fn scene_tool() -> ToolSchema {
        ToolSchema::new("generate_scene", "Render an image of the current scene")
            .with_parameter(
                ToolParameter::new("prompt", ParameterKind::String, "Scene description").required(),
            )
            .with_parameter(
                ToolParameter::new("style", ParameterKind::String, "Art style")
                    .with_enum_values(["painterly", "sketch"]),
            )
    }

    #[test]
    fn schema_builder() {
        let tool = scene_tool();
        assert_eq!(tool.name, "generate_scene");
        assert_eq!(tool.parameters.len(), 2);
        assert!(tool.parameters[0].required);
        assert_eq!(tool.parameters[1].enum_values.len(), 2);
    }

    #[test]
    fn wire_json_shape() {
        let wire = scene_tool().to_wire_json();
        assert_eq!(wire["name"], "generate_scene");
        assert_eq!(wire["parameters"]["type"], "object");
        assert_eq!(
            wire["parameters"]["properties"]["prompt"]["type"],
            "string"
        );
        assert_eq!(wire["parameters"]["properties"]["style"]["enum"][1], "sketch");
        assert_eq!(wire["parameters"]["required"][0], "prompt");
    }

    #[test]
    fn wire_json_omits_empty_enum() {
        let wire = scene_tool().to_wire_json();
        assert!(wire["parameters"]["properties"]["prompt"].get("enum").is_none());
    }

    #[test]
    fn advertisement_cost_walk() {
        // tool: 6 overhead + "generate_scene" (14 chars -> 4)
        //   + "Render an image of the current scene" (36 chars -> 9)
        // prompt: 3 overhead + "prompt" (2) + "string" (2)
        //   + "Scene description" (17 chars -> 5)
        // style: 3 overhead + "style" (2) + "string" (2) + "Art style" (3)
        //   + "painterly" (3) + "sketch" (2)
        let tool = scene_tool();
        assert_eq!(
            tool.advertisement_cost(&CharEstimator),
            (6 + 4 + 9) + (3 + 2 + 2 + 5) + (3 + 2 + 2 + 3 + 3 + 2)
        );
    }

    #[test]
    fn schema_serde_roundtrip() {
        let tool = scene_tool();
        let encoded = serde_json::to_string(&tool).expect("serialize");
        let parsed: ToolSchema = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(tool, parsed);
    }
}
