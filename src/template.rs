use crate::error::Result;
use crate::message::DataArgument;
use crate::metadata::PromptMetadata;
use handlebars::Handlebars;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::{Map, Value, json};
use std::borrow::Cow;

/// Key under the render root that holds the `@` variables
pub(crate) const CONTEXT_KEY: &str = "__dotprompt_ctx";

/// Data variables Handlebars provides itself; these are never redirected
const ENGINE_DATA_VARIABLES: &[&str] = &[
    "root",
    "index",
    "key",
    "first",
    "last",
    "level",
    "partial-block",
];

lazy_static! {
    /// A `{{ ... }}` tag, including triple-stash and block openers
    static ref MUSTACHE_TAG: Regex = Regex::new(r"\{\{[^}]*\}\}")
        .expect("Failed to compile mustache tag pattern");

    /// Quoted string literals (kept as-is) or an `@name` data reference
    static ref DATA_REFERENCE: Regex =
        Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|@([A-Za-z_][A-Za-z0-9_-]*)"#)
            .expect("Failed to compile data reference pattern");
}

/// Point `@name` references at the render context
///
/// Handlebars only knows its own data variables, so `{{@state.step}}` becomes
/// `{{@root.__dotprompt_ctx.state.step}}`. String literals inside tags and
/// the engine's own variables (`@index`, `@root`, ...) are left alone.
pub fn rewrite_data_variables(template: &str) -> Cow<'_, str> {
    if !template.contains('@') {
        return Cow::Borrowed(template);
    }

    MUSTACHE_TAG.replace_all(template, |tag: &Captures<'_>| {
        DATA_REFERENCE
            .replace_all(&tag[0], |reference: &Captures<'_>| match reference.get(1) {
                Some(name) if !ENGINE_DATA_VARIABLES.contains(&name.as_str()) => {
                    format!("@root.{CONTEXT_KEY}.{}", name.as_str())
                }
                _ => reference[0].to_string(),
            })
            .into_owned()
    })
}

/// Build the root data object a template renders against
///
/// Input defaults come first and caller input overrides them. The `@`
/// variables live under [`CONTEXT_KEY`]: `@metadata` describes the prompt
/// and the caller's context keys sit beside it.
pub fn build_context(metadata: &PromptMetadata, data: &DataArgument) -> Result<Value> {
    let mut root = apply_defaults(metadata, data.input.as_ref());

    let mut context = Map::new();
    context.insert(
        "metadata".to_string(),
        json!({
            "prompt": serde_json::to_value(metadata)?,
            "docs": serde_json::to_value(&data.docs)?,
            "messages": serde_json::to_value(&data.messages)?,
        }),
    );
    if let Some(extra) = &data.context {
        for (key, value) in extra {
            context.insert(key.clone(), value.clone());
        }
    }
    root.insert(CONTEXT_KEY.to_string(), Value::Object(context));

    Ok(Value::Object(root))
}

/// Layer caller input over the prompt's `input.default` values
fn apply_defaults(
    metadata: &PromptMetadata,
    input: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let mut values = metadata.input_defaults().cloned().unwrap_or_default();
    if let Some(input) = input {
        for (key, value) in input {
            values.insert(key.clone(), value.clone());
        }
    }
    values
}

/// Render a template body against prepared root data
pub fn render_template(registry: &Handlebars<'_>, template: &str, data: &Value) -> Result<String> {
    let source = rewrite_data_variables(template);
    Ok(registry.render_template(&source, data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, Role};
    use crate::metadata::PromptInputConfig;

    #[test]
    fn data_references_are_redirected() {
        assert_eq!(
            rewrite_data_variables("{{@state.step}} and {{#if @auth}}x{{/if}}"),
            "{{@root.__dotprompt_ctx.state.step}} and {{#if @root.__dotprompt_ctx.auth}}x{{/if}}"
        );
    }

    #[test]
    fn engine_variables_and_literals_are_untouched() {
        let template =
            r#"{{#each items}}{{@index}}{{@key}}{{/each}}{{@root.name}}{{media url="me@example.com"}} mail@me"#;
        assert_eq!(rewrite_data_variables(template), template);
    }

    #[test]
    fn defaults_are_overridden_by_input() {
        let metadata = PromptMetadata {
            input: Some(PromptInputConfig {
                default_values: Some(json!({"name": "Anon", "tone": "dry"}).as_object().cloned().unwrap()),
                schema: None,
            }),
            ..Default::default()
        };
        let data = DataArgument::with_input(json!({"name": "Ada"}));

        let root = build_context(&metadata, &data).unwrap();
        assert_eq!(root["name"], "Ada");
        assert_eq!(root["tone"], "dry");
    }

    #[test]
    fn context_variables_render_through_at_syntax() {
        let metadata = PromptMetadata {
            model: Some("m-1".into()),
            ..Default::default()
        };
        let data = DataArgument {
            context: Some(json!({"state": {"step": 3}}).as_object().cloned().unwrap()),
            messages: Some(vec![Message::text(Role::User, "hi")]),
            ..Default::default()
        };
        let root = build_context(&metadata, &data).unwrap();
        assert!(root.get("state").is_none());

        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        let out = render_template(
            &registry,
            "{{@state.step}}/{{@metadata.prompt.model}}/{{#each @metadata.messages}}{{role}}{{/each}}",
            &root,
        )
        .unwrap();
        assert_eq!(out, "3/m-1/user");
    }
}
