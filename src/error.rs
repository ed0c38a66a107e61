use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, DotpromptError>;

/// Errors raised while parsing, compiling or rendering a prompt
#[derive(Debug, Error)]
pub enum DotpromptError {
    /// Malformed frontmatter or a frontmatter block that is not a mapping
    #[error("failed to parse prompt: {0}")]
    Parse(String),

    /// Picoschema that cannot be expanded into JSON Schema
    #[error("picoschema: {0}")]
    Picoschema(String),

    /// Template body rejected by the template engine
    #[error("template compilation failed: {0}")]
    Compile(#[from] handlebars::TemplateError),

    /// Failure raised by the template engine while rendering
    #[error("template rendering failed: {0}")]
    Render(#[from] handlebars::RenderError),

    /// A referenced partial could not be loaded (strict mode only)
    #[error("could not resolve partial '{0}'")]
    PartialResolution(String),

    /// A referenced tool could not be resolved (strict mode only)
    #[error("could not resolve tool '{0}'")]
    ToolResolution(String),

    /// Reserved for downstream schema validators
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// Failure reported by a prompt store
    #[error("prompt store: {0}")]
    Store(#[source] anyhow::Error),

    #[error("invalid prompt name: {0}")]
    InvalidName(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl DotpromptError {
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub(crate) fn picoschema(msg: impl Into<String>) -> Self {
        Self::Picoschema(msg.into())
    }
}
