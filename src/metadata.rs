use crate::message::Message;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A JSON Schema document, kept as an untyped JSON value
pub type JsonSchema = Value;

/// Frontmatter keys that map onto `PromptMetadata` fields; everything else goes to `ext`
pub const RESERVED_METADATA_KEYS: &[&str] = &[
    "config",
    "description",
    "ext",
    "input",
    "metadata",
    "model",
    "name",
    "output",
    "raw",
    "toolDefs",
    "tools",
    "variant",
    "version",
];

/// A tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<JsonSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<JsonSchema>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
            output_schema: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptInputConfig {
    /// Default values for template variables
    #[serde(
        default,
        rename = "default",
        alias = "defaultValues",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_values: Option<Map<String, Value>>,
    /// Picoschema or JSON Schema; always JSON Schema once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptOutputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// Typed view over a prompt's frontmatter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMetadata {
    #[serde(
        default,
        deserialize_with = "scalar_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub variant: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "scalar_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PromptInputConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PromptOutputConfig>,
    /// Tool names; after resolution, only the names that stayed unresolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_defs: Option<Vec<ToolDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// The frontmatter exactly as decoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Map<String, Value>>,
}

impl PromptMetadata {
    /// Layer `overrides` on top of `self`
    ///
    /// Scalar fields of `overrides` win when set. `config`, `ext`, `metadata`
    /// and `input.default` are merged key by key with `overrides` winning.
    pub fn merged_with(mut self, overrides: &PromptMetadata) -> Self {
        macro_rules! take_some {
            ($($field:ident),*) => {
                $(if overrides.$field.is_some() {
                    self.$field = overrides.$field.clone();
                })*
            };
        }
        take_some!(name, variant, version, description, model, tools, tool_defs, raw);

        self.config = merge_maps(self.config, overrides.config.as_ref());
        self.ext = merge_maps(self.ext, overrides.ext.as_ref());
        self.metadata = merge_maps(self.metadata, overrides.metadata.as_ref());

        if let Some(extra) = &overrides.input {
            let mut input = self.input.unwrap_or_default();
            input.default_values =
                merge_maps(input.default_values, extra.default_values.as_ref());
            if extra.schema.is_some() {
                input.schema = extra.schema.clone();
            }
            self.input = Some(input);
        }

        if let Some(extra) = &overrides.output {
            let mut output = self.output.unwrap_or_default();
            if extra.format.is_some() {
                output.format = extra.format.clone();
            }
            if extra.schema.is_some() {
                output.schema = extra.schema.clone();
            }
            self.output = Some(output);
        }

        self
    }

    /// Input defaults declared in `input.default`
    pub fn input_defaults(&self) -> Option<&Map<String, Value>> {
        self.input.as_ref().and_then(|i| i.default_values.as_ref())
    }
}

/// Keep numeric or boolean scalars such as `version: 2` as their text
fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string, got {other}"
        ))),
    }
}

/// Shallow merge where keys from `top` replace keys in `base`
pub(crate) fn merge_maps(
    base: Option<Map<String, Value>>,
    top: Option<&Map<String, Value>>,
) -> Option<Map<String, Value>> {
    match (base, top) {
        (base, None) => base,
        (None, Some(top)) => Some(top.clone()),
        (Some(mut base), Some(top)) => {
            for (key, value) in top {
                base.insert(key.clone(), value.clone());
            }
            Some(base)
        }
    }
}

/// A parsed prompt document (metadata + template body)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedPrompt {
    #[serde(flatten)]
    pub metadata: PromptMetadata,
    pub template: String,
}

/// Final output of a render: resolved metadata plus the assembled messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    #[serde(flatten)]
    pub metadata: PromptMetadata,
    pub messages: Vec<Message>,
}

impl RenderedPrompt {
    /// The resolved metadata flattened into a plain map
    pub fn config(&self) -> Map<String, Value> {
        match serde_json::to_value(&self.metadata) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
