//! Caller-supplied lookups for names a prompt references but does not define.
//!
//! Each resolver answers `Ok(None)` when it does not know a name. Errors are
//! reserved for lookups that actually failed (I/O, remote registry down); the
//! engine logs them and, outside strict mode, treats the name as unresolved.

use crate::metadata::{JsonSchema, ToolDefinition};
use async_trait::async_trait;
use std::future::Future;

/// Resolves a tool name to its definition
#[async_trait]
pub trait ToolResolver: Send + Sync {
    async fn resolve_tool(&self, name: &str) -> anyhow::Result<Option<ToolDefinition>>;
}

/// Resolves a named schema referenced from Picoschema
#[async_trait]
pub trait SchemaResolver: Send + Sync {
    async fn resolve_schema(&self, name: &str) -> anyhow::Result<Option<JsonSchema>>;
}

/// Resolves a partial name to its template source
#[async_trait]
pub trait PartialResolver: Send + Sync {
    async fn resolve_partial(&self, name: &str) -> anyhow::Result<Option<String>>;
}

/// Adapts an async closure into any of the resolver traits
///
/// Synchronous lookups can return `std::future::ready(..)`:
///
/// ```
/// use dotprompt::{FnResolver, ToolDefinition};
///
/// let tools = FnResolver(|name: String| {
///     std::future::ready((name == "search").then(|| ToolDefinition::new(name)))
/// });
/// ```
pub struct FnResolver<F>(pub F);

#[async_trait]
impl<F, Fut> ToolResolver for FnResolver<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Option<ToolDefinition>> + Send,
{
    async fn resolve_tool(&self, name: &str) -> anyhow::Result<Option<ToolDefinition>> {
        Ok((self.0)(name.to_string()).await)
    }
}

#[async_trait]
impl<F, Fut> SchemaResolver for FnResolver<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Option<JsonSchema>> + Send,
{
    async fn resolve_schema(&self, name: &str) -> anyhow::Result<Option<JsonSchema>> {
        Ok((self.0)(name.to_string()).await)
    }
}

#[async_trait]
impl<F, Fut> PartialResolver for FnResolver<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Option<String>> + Send,
{
    async fn resolve_partial(&self, name: &str) -> anyhow::Result<Option<String>> {
        Ok((self.0)(name.to_string()).await)
    }
}
