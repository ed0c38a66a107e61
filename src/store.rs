//! Storage interfaces for prompt and partial sources.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifies a stored prompt or partial
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PromptRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PromptRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: None,
            version: None,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }
}

/// A stored prompt or partial together with its source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptData {
    #[serde(flatten)]
    pub reference: PromptRef,
    pub source: String,
}

impl PromptData {
    pub fn new(reference: PromptRef, source: impl Into<String>) -> Self {
        Self {
            reference,
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Opaque cursor returned by a previous page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl LoadOptions {
    pub fn variant(variant: impl Into<String>) -> Self {
        Self {
            variant: Some(variant.into()),
        }
    }
}

/// One page of a listing; `cursor` is set when more entries follow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Read access to stored prompts and partials
///
/// `load` and `load_partial` answer `Ok(None)` for names the store does not hold.
#[async_trait]
pub trait PromptStore: Send + Sync {
    async fn list(&self, options: ListOptions) -> anyhow::Result<Page<PromptRef>>;

    async fn list_partials(&self, options: ListOptions) -> anyhow::Result<Page<PromptRef>>;

    async fn load(&self, name: &str, options: LoadOptions) -> anyhow::Result<Option<PromptData>>;

    async fn load_partial(
        &self,
        name: &str,
        options: LoadOptions,
    ) -> anyhow::Result<Option<PromptData>>;
}

/// A store that can also be written to
#[async_trait]
pub trait PromptStoreWritable: PromptStore {
    async fn save(&self, prompt: PromptData) -> anyhow::Result<()>;

    async fn delete(&self, name: &str, options: LoadOptions) -> anyhow::Result<()>;

    async fn save_partial(&self, partial: PromptData) -> anyhow::Result<()>;

    async fn delete_partial(&self, name: &str, options: LoadOptions) -> anyhow::Result<()>;
}
