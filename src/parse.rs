//! Frontmatter splitting and metadata extraction for `.prompt` documents.
//!
//! A document is an optional YAML block fenced by `---` lines followed by the
//! template body:
//!
//! ```text
//! ---
//! model: gemini-pro
//! input:
//!   schema:
//!     name: string
//! ---
//! Hello {{name}}!
//! ```

use crate::error::{DotpromptError, Result};
use crate::metadata::{ParsedPrompt, PromptMetadata, RESERVED_METADATA_KEYS, merge_maps};
use serde_json::{Map, Value};

const FRONTMATTER_DELIMITER: &str = "---";

/// Split a document into its template body and decoded frontmatter
///
/// Sources that do not open with a `---` line are all template. The YAML
/// block must decode to a mapping; nested YAML nodes come back as plain
/// JSON values.
pub fn split_frontmatter(source: &str) -> Result<(String, Map<String, Value>)> {
    let Some(body) = strip_opening_delimiter(source) else {
        return Ok((source.to_string(), Map::new()));
    };

    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if is_delimiter(line) {
            let yaml = &body[..offset];
            let template = &body[offset + line.len()..];
            return Ok((template.to_string(), decode_yaml(yaml)?));
        }
        offset += line.len();
    }

    Err(DotpromptError::parse(
        "frontmatter opened with '---' but never closed",
    ))
}

/// Parse a document into its template and typed metadata
pub fn parse_document(source: &str) -> Result<ParsedPrompt> {
    let (template, config) = split_frontmatter(source)?;
    let metadata = metadata_from_config(config)?;
    Ok(ParsedPrompt { metadata, template })
}

/// Build typed metadata from a raw frontmatter mapping
///
/// Reserved keys populate the typed fields. Any other key is an extension
/// field and is nested into `ext` by its last dot, so `myext.temperature: 1`
/// becomes `ext["myext"]["temperature"]`.
pub fn metadata_from_config(config: Map<String, Value>) -> Result<PromptMetadata> {
    if config.is_empty() {
        return Ok(PromptMetadata::default());
    }

    let mut reserved = Map::new();
    let mut ext = Map::new();
    for (key, value) in &config {
        if RESERVED_METADATA_KEYS.contains(&key.as_str()) {
            reserved.insert(key.clone(), value.clone());
        } else {
            insert_namespaced(&mut ext, key, value.clone());
        }
    }

    let mut metadata: PromptMetadata = serde_json::from_value(Value::Object(reserved))
        .map_err(|e| DotpromptError::parse(format!("invalid frontmatter: {e}")))?;

    if !ext.is_empty() {
        metadata.ext = merge_maps(metadata.ext, Some(&ext));
    }
    metadata.raw = Some(config);

    Ok(metadata)
}

fn strip_opening_delimiter(source: &str) -> Option<&str> {
    let (first_line, rest) = match source.split_once('\n') {
        Some((line, rest)) => (line, rest),
        None => (source, ""),
    };
    if !is_delimiter(first_line) {
        return None;
    }
    Some(rest)
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == FRONTMATTER_DELIMITER
}

fn decode_yaml(yaml: &str) -> Result<Map<String, Value>> {
    if yaml.trim().is_empty() {
        return Ok(Map::new());
    }

    let decoded: serde_yaml::Value = serde_yaml::from_str(yaml)
        .map_err(|e| DotpromptError::parse(format!("invalid YAML frontmatter: {e}")))?;

    match yaml_to_json(decoded) {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(DotpromptError::parse(format!(
            "frontmatter must be a mapping, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Convert a YAML node into a plain JSON value, stringifying non-string keys
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(seq) => Value::Array(seq.into_iter().map(yaml_to_json).collect()),
        Yaml::Mapping(mapping) => Value::Object(
            mapping
                .into_iter()
                .map(|(k, v)| (yaml_key(k), yaml_to_json(v)))
                .collect(),
        ),
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => s,
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        Yaml::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn insert_namespaced(ext: &mut Map<String, Value>, key: &str, value: Value) {
    let Some((parent, child)) = key.rsplit_once('.') else {
        ext.insert(key.to_string(), value);
        return;
    };

    let entry = ext
        .entry(parent.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(namespace) = entry {
        namespace.insert(child.to_string(), value);
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
