use crate::error::{DotpromptError, Result};
use crate::metadata::ParsedPrompt;
use crate::parse::parse_document;
use handlebars::Template;

/// Maximum prompt source size in bytes (1MB)
pub const MAX_SOURCE_SIZE: usize = 1_000_000;

/// Check that a template body compiles
pub fn validate_template_syntax(template: &str) -> Result<()> {
    Template::compile(template)?;
    Ok(())
}

/// Validate a complete `.prompt` source (size, frontmatter, template syntax)
pub fn validate_prompt_source(source: &str) -> Result<ParsedPrompt> {
    // Size first, before any parsing work
    if source.len() > MAX_SOURCE_SIZE {
        return Err(DotpromptError::parse(format!(
            "prompt source too large ({} bytes). Maximum size is {MAX_SOURCE_SIZE} bytes.",
            source.len()
        )));
    }

    let parsed = parse_document(source)?;
    validate_template_syntax(&parsed.template)?;
    Ok(parsed)
}

/// Validate a prompt or partial name
///
/// Names are `/`-separated segments of alphanumerics, hyphens and
/// underscores. Absolute paths, backslashes and `..` are rejected.
pub fn validate_prompt_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DotpromptError::InvalidName("name cannot be empty".to_string()));
    }

    // No path traversal
    if name.starts_with('/') || name.contains('\\') || name.contains("..") {
        return Err(DotpromptError::InvalidName(format!(
            "'{name}': absolute paths, backslashes and '..' are not allowed"
        )));
    }

    for segment in name.split('/') {
        if segment.is_empty() || !segment.chars().all(is_name_char) {
            return Err(DotpromptError::InvalidName(format!(
                "'{name}': only alphanumeric characters, hyphens, underscores and '/' separators allowed"
            )));
        }
    }

    Ok(())
}

/// Validate a variant name; variants are a single segment
pub fn validate_variant(variant: &str) -> Result<()> {
    if variant.is_empty() || !variant.chars().all(is_name_char) {
        return Err(DotpromptError::InvalidName(format!(
            "variant '{variant}': only alphanumeric characters, hyphens and underscores allowed"
        )));
    }
    Ok(())
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}
