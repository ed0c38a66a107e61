//! Built-in Handlebars helpers.
//!
//! `role`, `history`, `section` and `media` write markers instead of visible
//! text (see [`crate::marker`]). `json` serializes a value. `ifEquals` and
//! `unlessEquals` are block helpers comparing two values by type and value.

use crate::marker::{Marker, infer_content_type, role_marker};
use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderErrorReason,
    Renderable,
};
use serde::Serialize;
use serde_json::Value;

/// Names of the helpers registered on every engine
pub const BUILTIN_HELPERS: &[&str] = &[
    "role",
    "history",
    "section",
    "media",
    "json",
    "ifEquals",
    "unlessEquals",
];

pub fn register_builtin_helpers(registry: &mut Handlebars<'_>) {
    registry.register_helper("role", Box::new(role_helper));
    registry.register_helper("history", Box::new(history_helper));
    registry.register_helper("section", Box::new(section_helper));
    registry.register_helper("media", Box::new(media_helper));
    registry.register_helper("json", Box::new(json_helper));
    registry.register_helper("ifEquals", Box::new(if_equals_helper));
    registry.register_helper("unlessEquals", Box::new(unless_equals_helper));
}

fn string_param<'a>(h: &'a Helper<'_>, index: usize, helper: &'static str) -> Result<&'a str, RenderErrorReason> {
    let param = h
        .param(index)
        .ok_or(RenderErrorReason::ParamNotFoundForIndex(helper, index))?;
    param
        .value()
        .as_str()
        .ok_or_else(|| RenderErrorReason::Other(format!("{helper}: parameter {index} must be a string")))
}

/// `{{role "system"}}` or `{{#role "system"}}...{{/role}}`
fn role_helper<'reg, 'rc>(
    h: &Helper<'rc>,
    r: &'reg Handlebars<'reg>,
    ctx: &'rc Context,
    rc: &mut RenderContext<'reg, 'rc>,
    out: &mut dyn Output,
) -> HelperResult {
    let name = string_param(h, 0, "role")?;
    out.write(&role_marker(name))?;
    if let Some(template) = h.template() {
        template.render(r, ctx, rc, out)?;
    }
    Ok(())
}

fn history_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&Marker::History.encode())?;
    Ok(())
}

fn section_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let name = string_param(h, 0, "section")?;
    out.write(&Marker::Section(name.to_string()).encode())?;
    Ok(())
}

/// `{{media url="..." contentType="..."}}`; positional arguments work too
fn media_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let url = h
        .hash_get("url")
        .or_else(|| h.param(0))
        .and_then(|v| v.value().as_str())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| RenderErrorReason::Other("media: a url is required".to_string()))?;

    let content_type = h
        .hash_get("contentType")
        .or_else(|| h.param(1))
        .and_then(|v| v.value().as_str())
        .filter(|ct| !ct.is_empty())
        .map(str::to_string)
        .or_else(|| infer_content_type(url));

    let marker = Marker::Media {
        url: url.to_string(),
        content_type,
    };
    out.write(&marker.encode())?;
    Ok(())
}

/// `{{json value indent=2}}`; with no value, serializes the current context
fn json_helper<'reg, 'rc>(
    h: &Helper<'rc>,
    _: &'reg Handlebars<'reg>,
    ctx: &'rc Context,
    rc: &mut RenderContext<'reg, 'rc>,
    out: &mut dyn Output,
) -> HelperResult {
    let indent = h.hash_get("indent").map_or(0, |v| indent_width(v.value()));

    let serialized = match h.param(0) {
        Some(param) => to_json(param.value(), indent),
        None => {
            let current = rc.evaluate(ctx, "this")?;
            to_json(current.as_json(), indent)
        }
    }
    .map_err(|e| RenderErrorReason::Other(format!("json: {e}")))?;

    out.write(&serialized)?;
    Ok(())
}

fn indent_width(value: &Value) -> usize {
    match value {
        Value::Number(n) => n.as_u64().map_or(0, |n| n as usize),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn to_json(value: &Value, indent: usize) -> Result<String, serde_json::Error> {
    if indent == 0 {
        return serde_json::to_string(value);
    }
    let pad = " ".repeat(indent);
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Type-sensitive equality; numbers compare by value so `5 == 5.0`
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

/// `None` when fewer than two values were supplied
fn compare_params(h: &Helper<'_>) -> Option<bool> {
    let a = h.param(0)?;
    let b = h.param(1)?;
    Some(values_equal(a.value(), b.value()))
}

fn if_equals_helper<'reg, 'rc>(
    h: &Helper<'rc>,
    r: &'reg Handlebars<'reg>,
    ctx: &'rc Context,
    rc: &mut RenderContext<'reg, 'rc>,
    out: &mut dyn Output,
) -> HelperResult {
    let branch = match compare_params(h) {
        Some(true) => h.template(),
        _ => h.inverse(),
    };
    match branch {
        Some(template) => template.render(r, ctx, rc, out),
        None => Ok(()),
    }
}

fn unless_equals_helper<'reg, 'rc>(
    h: &Helper<'rc>,
    r: &'reg Handlebars<'reg>,
    ctx: &'rc Context,
    rc: &mut RenderContext<'reg, 'rc>,
    out: &mut dyn Output,
) -> HelperResult {
    let branch = match compare_params(h) {
        Some(false) => h.template(),
        _ => h.inverse(),
    };
    match branch {
        Some(template) => template.render(r, ctx, rc, out),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Handlebars<'static> {
        let mut hb = Handlebars::new();
        hb.register_escape_fn(handlebars::no_escape);
        register_builtin_helpers(&mut hb);
        hb
    }

    fn render(template: &str, data: Value) -> String {
        registry().render_template(template, &data).unwrap()
    }

    #[test]
    fn role_block_emits_marker_then_body() {
        assert_eq!(
            render(r#"{{#role "system"}}Be brief.{{/role}}{{role "user"}}Hi"#, json!({})),
            "<<<dotprompt:role:system>>>Be brief.<<<dotprompt:role:user>>>Hi"
        );
    }

    #[test]
    fn history_and_section_emit_markers() {
        assert_eq!(
            render(r#"{{history}}|{{section "examples"}}"#, json!({})),
            "<<<dotprompt:history>>>|<<<dotprompt:section examples>>>"
        );
    }

    #[test]
    fn media_infers_content_type_from_url() {
        assert_eq!(
            render(r#"{{media url="https://example.com/img.png"}}"#, json!({})),
            "<<<dotprompt:media:https://example.com/img.png|image/png>>>"
        );
        assert_eq!(
            render(r#"{{media url=photo contentType="image/heic"}}"#, json!({"photo": "gs://b/p"})),
            "<<<dotprompt:media:gs://b/p|image/heic>>>"
        );
    }

    #[test]
    fn media_without_url_fails() {
        assert!(registry().render_template("{{media}}", &json!({})).is_err());
    }

    #[test]
    fn json_is_compact_unless_indented() {
        let data = json!({"item": {"a": 1, "b": [true]}});
        assert_eq!(render("{{json item}}", data.clone()), r#"{"a":1,"b":[true]}"#);
        assert_eq!(
            render("{{json item indent=2}}", data),
            "{\n  \"a\": 1,\n  \"b\": [\n    true\n  ]\n}"
        );
        assert_eq!(render("{{#with item}}{{json}}{{/with}}", json!({"item": {"x": "y"}})), r#"{"x":"y"}"#);
    }

    #[test]
    fn if_equals_is_type_sensitive() {
        let template = "{{#ifEquals a b}}same{{else}}different{{/ifEquals}}";
        assert_eq!(render(template, json!({"a": 5, "b": "5"})), "different");
        assert_eq!(render(template, json!({"a": 5, "b": 5})), "same");
        assert_eq!(render(template, json!({"a": 5, "b": 5.0})), "same");
        assert_eq!(render(template, json!({"a": null, "b": null})), "same");
        assert_eq!(render(template, json!({"a": [1, 2], "b": [1, 2]})), "same");
        assert_eq!(render(template, json!({"a": true, "b": "true"})), "different");
    }

    #[test]
    fn unless_equals_inverts_the_branches() {
        let template = "{{#unlessEquals a b}}different{{else}}same{{/unlessEquals}}";
        assert_eq!(render(template, json!({"a": "x", "b": "y"})), "different");
        assert_eq!(render(template, json!({"a": "x", "b": "x"})), "same");
    }

    #[test]
    fn too_few_values_take_the_inverse_branch() {
        let data = json!({"a": 1});
        assert_eq!(render("{{#ifEquals a}}yes{{else}}no{{/ifEquals}}", data.clone()), "no");
        assert_eq!(render("{{#unlessEquals a}}yes{{else}}no{{/unlessEquals}}", data), "no");
    }
}
