//! Executable prompt templates.
//!
//! A `.prompt` file is YAML frontmatter (model, config, input/output schema,
//! tools) followed by a Handlebars body. [`Dotprompt`] parses the file,
//! resolves tools, schemas and partials, renders the body and splits the
//! output into role-tagged [`Message`]s.
//!
//! ```no_run
//! use dotprompt::{DataArgument, Dotprompt, DotpromptOptions};
//! use serde_json::json;
//!
//! # async fn run() -> dotprompt::Result<()> {
//! let engine = Dotprompt::new(DotpromptOptions::default())?;
//! let rendered = engine
//!     .render(
//!         "---\nmodel: gemini-pro\n---\nHello {{name}}!",
//!         &DataArgument::with_input(json!({"name": "World"})),
//!         None,
//!     )
//!     .await?;
//! assert_eq!(rendered.messages.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod dir_store;
pub mod dotprompt;
pub mod error;
pub mod helpers;
pub mod marker;
pub mod message;
pub mod messages;
pub mod metadata;
pub mod parse;
pub mod picoschema;
pub mod resolver;
pub mod store;
pub mod template;
pub mod validation;

// Re-export commonly used types
pub use dir_store::DirStore;
pub use dotprompt::{Dotprompt, DotpromptOptions, EngineSettings, PromptFunction, identify_partials};
pub use error::{DotpromptError, Result};
pub use message::{DataArgument, Document, Message, Part, Role};
pub use messages::to_messages;
pub use metadata::{
    JsonSchema, ParsedPrompt, PromptInputConfig, PromptMetadata, PromptOutputConfig,
    RenderedPrompt, ToolDefinition,
};
pub use parse::parse_document;
pub use picoschema::picoschema_to_json_schema;
pub use resolver::{FnResolver, PartialResolver, SchemaResolver, ToolResolver};
pub use store::{ListOptions, LoadOptions, Page, PromptData, PromptRef, PromptStore, PromptStoreWritable};
