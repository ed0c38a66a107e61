//! Picoschema: compact YAML schema shorthand expanded into JSON Schema.
//!
//! ```yaml
//! name: string, Full name
//! age?: integer
//! tags(array): string
//! status(enum): [ACTIVE, DISABLED]
//! address(object):
//!   street: string
//! (*): any
//! ```

use crate::error::{DotpromptError, Result};
use crate::metadata::JsonSchema;
use crate::parse::json_type_name;
use crate::resolver::SchemaResolver;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value, json};

/// Type names that expand directly instead of going to the schema resolver
pub const SCALAR_TYPES: &[&str] = &["any", "boolean", "integer", "null", "number", "string"];

const WILDCARD_PROPERTY_NAME: &str = "(*)";

/// Expand `schema` into JSON Schema, resolving named types through `resolver`
pub async fn picoschema_to_json_schema(
    schema: &Value,
    resolver: Option<&dyn SchemaResolver>,
) -> Result<Option<JsonSchema>> {
    PicoschemaParser::new(resolver).parse(schema).await
}

/// True for maps that are already JSON Schema and pass through untouched
pub fn is_json_schema(schema: &Value) -> bool {
    matches!(schema, Value::Object(map) if map.contains_key("type") || map.contains_key("properties"))
}

pub struct PicoschemaParser<'a> {
    resolver: Option<&'a dyn SchemaResolver>,
}

impl<'a> PicoschemaParser<'a> {
    pub fn new(resolver: Option<&'a dyn SchemaResolver>) -> Self {
        Self { resolver }
    }

    pub async fn parse(&self, schema: &Value) -> Result<Option<JsonSchema>> {
        match schema {
            Value::Null => Ok(None),
            Value::Object(map) if is_json_schema(schema) => {
                let mut out = map.clone();
                if !out.contains_key("type") {
                    out.insert("type".to_string(), Value::from("object"));
                }
                Ok(Some(Value::Object(out)))
            }
            other => self.parse_pico(other).await.map(Some),
        }
    }

    fn parse_pico<'s>(&'s self, value: &'s Value) -> BoxFuture<'s, Result<JsonSchema>> {
        async move {
            match value {
                Value::String(type_string) => self.parse_type_string(type_string).await,
                Value::Object(fields) => self.parse_object(fields).await,
                other => Err(DotpromptError::picoschema(format!(
                    "only objects and strings are allowed, got {}",
                    json_type_name(other)
                ))),
            }
        }
        .boxed()
    }

    async fn parse_type_string(&self, type_string: &str) -> Result<JsonSchema> {
        let (type_name, description) = extract_description(type_string);

        let mut schema = if SCALAR_TYPES.contains(&type_name) {
            let mut map = Map::new();
            if type_name != "any" {
                map.insert("type".to_string(), Value::from(type_name));
            }
            Value::Object(map)
        } else {
            self.must_resolve_schema(type_name).await?
        };

        if let (Some(description), Value::Object(map)) = (description, &mut schema) {
            map.insert("description".to_string(), Value::from(description));
        }
        Ok(schema)
    }

    async fn parse_object(&self, fields: &Map<String, Value>) -> Result<JsonSchema> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        let mut additional_properties = Value::Bool(false);

        for (key, value) in fields {
            if key == WILDCARD_PROPERTY_NAME {
                additional_properties = self.parse_pico(value).await?;
                continue;
            }

            let (name, type_info) = match key.split_once('(') {
                Some((name, rest)) => (name, Some(rest.strip_suffix(')').unwrap_or(rest))),
                None => (key.as_str(), None),
            };
            let (name, optional) = match name.strip_suffix('?') {
                Some(name) => (name, true),
                None => (name, false),
            };
            if !optional {
                required.push(Value::from(name));
            }

            let mut property = match type_info {
                None => self.parse_pico(value).await?,
                Some(type_info) => self.parse_parenthetical(key, type_info, value).await?,
            };
            if optional {
                make_nullable(&mut property);
            }
            properties.insert(name.to_string(), property);
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::from("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        schema.insert("additionalProperties".to_string(), additional_properties);
        Ok(Value::Object(schema))
    }

    async fn parse_parenthetical(
        &self,
        key: &str,
        type_info: &str,
        value: &Value,
    ) -> Result<JsonSchema> {
        let (kind, description) = extract_description(type_info);

        let mut property = match kind {
            "array" => json!({ "type": "array", "items": self.parse_pico(value).await? }),
            "object" => self.parse_pico(value).await?,
            "enum" => match value {
                Value::Array(items) => json!({ "enum": items }),
                other => {
                    return Err(DotpromptError::picoschema(format!(
                        "enum values for '{key}' must be a list, got {}",
                        json_type_name(other)
                    )));
                }
            },
            other => {
                return Err(DotpromptError::picoschema(format!(
                    "parenthetical types must be 'object', 'array' or 'enum', got '{other}'"
                )));
            }
        };

        if let (Some(description), Value::Object(map)) = (description, &mut property) {
            map.insert("description".to_string(), Value::from(description));
        }
        Ok(property)
    }

    async fn must_resolve_schema(&self, name: &str) -> Result<JsonSchema> {
        let Some(resolver) = self.resolver else {
            return Err(DotpromptError::picoschema(format!(
                "unsupported scalar type '{name}'"
            )));
        };

        match resolver.resolve_schema(name).await {
            Ok(Some(schema)) => Ok(schema),
            Ok(None) => Err(DotpromptError::picoschema(format!(
                "could not find schema with name '{name}'"
            ))),
            Err(e) => Err(DotpromptError::picoschema(format!(
                "schema resolver failed for '{name}': {e:#}"
            ))),
        }
    }
}

/// Split `"type, description"` at the first comma
fn extract_description(input: &str) -> (&str, Option<&str>) {
    match input.split_once(',') {
        Some((type_name, description)) => {
            let description = description.trim();
            (type_name.trim(), (!description.is_empty()).then_some(description))
        }
        None => (input.trim(), None),
    }
}

/// Widen a property so that `null` is also accepted
fn make_nullable(property: &mut Value) {
    let Value::Object(map) = property else {
        return;
    };

    if let Some(Value::Array(values)) = map.get_mut("enum") {
        if !values.contains(&Value::Null) {
            values.push(Value::Null);
        }
        return;
    }

    let widened = match map.get("type") {
        Some(Value::String(type_name)) if type_name != "null" => Some(json!([type_name, "null"])),
        Some(Value::Array(types)) if !types.iter().any(|t| t == "null") => {
            let mut types = types.clone();
            types.push(Value::from("null"));
            Some(Value::Array(types))
        }
        _ => None,
    };
    if let Some(widened) = widened {
        map.insert("type".to_string(), widened);
    }
}
