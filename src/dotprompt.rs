//! The prompt engine: registries, metadata resolution and rendering.

use crate::error::{DotpromptError, Result};
use crate::helpers::{BUILTIN_HELPERS, register_builtin_helpers};
use crate::message::DataArgument;
use crate::messages::to_messages;
use crate::metadata::{
    JsonSchema, ParsedPrompt, PromptMetadata, RenderedPrompt, ToolDefinition, merge_maps,
};
use crate::parse::parse_document;
use crate::picoschema::picoschema_to_json_schema;
use crate::resolver::{PartialResolver, SchemaResolver, ToolResolver};
use crate::store::{LoadOptions, PromptStore};
use crate::template::{build_context, render_template, rewrite_data_variables};
use crate::validation::validate_template_syntax;
use async_trait::async_trait;
use futures::future::join_all;
use handlebars::{Handlebars, HelperDef};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

lazy_static! {
    /// `{{> name}}`, `{{~> name}}` and partial blocks `{{#> name}}`
    static ref PARTIAL_REFERENCE: Regex = Regex::new(r"\{\{~?#?>\s*([a-zA-Z0-9_/-]+)")
        .expect("Failed to compile partial reference pattern");
}

/// Names of the partials `template` references, in first-seen order
pub fn identify_partials(template: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    PARTIAL_REFERENCE
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Serializable engine settings, e.g. loaded from a YAML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Per-model config defaults, overridden by a prompt's own `config`
    #[serde(default)]
    pub model_configs: HashMap<String, Map<String, Value>>,
    #[serde(default)]
    pub strict: bool,
}

impl EngineSettings {
    /// Parse settings from YAML (or JSON, which YAML accepts)
    pub fn from_yaml(source: &str) -> Result<Self> {
        serde_yaml::from_str(source)
            .map_err(|e| DotpromptError::parse(format!("invalid engine settings: {e}")))
    }
}

/// Construction options for [`Dotprompt`]
#[derive(Default)]
pub struct DotpromptOptions {
    pub default_model: Option<String>,
    pub model_configs: HashMap<String, Map<String, Value>>,
    pub helpers: HashMap<String, Box<dyn HelperDef + Send + Sync>>,
    pub partials: HashMap<String, String>,
    pub tools: HashMap<String, ToolDefinition>,
    pub schemas: HashMap<String, JsonSchema>,
    pub tool_resolver: Option<Arc<dyn ToolResolver>>,
    pub schema_resolver: Option<Arc<dyn SchemaResolver>>,
    pub partial_resolver: Option<Arc<dyn PartialResolver>>,
    pub store: Option<Arc<dyn PromptStore>>,
    /// Fail on unresolved tools and partials instead of carrying on
    pub strict: bool,
}

impl DotpromptOptions {
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        if settings.default_model.is_some() {
            self.default_model = settings.default_model;
        }
        self.model_configs.extend(settings.model_configs);
        self.strict = settings.strict;
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_model_config(mut self, model: impl Into<String>, config: Map<String, Value>) -> Self {
        self.model_configs.insert(model.into(), config);
        self
    }

    pub fn with_helper(
        mut self,
        name: impl Into<String>,
        helper: impl HelperDef + Send + Sync + 'static,
    ) -> Self {
        self.helpers.insert(name.into(), Box::new(helper));
        self
    }

    pub fn with_partial(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.partials.insert(name.into(), source.into());
        self
    }

    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.insert(tool.name.clone(), tool);
        self
    }

    pub fn with_schema(mut self, name: impl Into<String>, schema: JsonSchema) -> Self {
        self.schemas.insert(name.into(), schema);
        self
    }

    pub fn with_tool_resolver(mut self, resolver: impl ToolResolver + 'static) -> Self {
        self.tool_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_schema_resolver(mut self, resolver: impl SchemaResolver + 'static) -> Self {
        self.schema_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_partial_resolver(mut self, resolver: impl PartialResolver + 'static) -> Self {
        self.partial_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PromptStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Compiles `.prompt` sources into messages
///
/// One engine is meant to be shared (`Arc<Dotprompt>`) across concurrent
/// renders. The helper, partial, tool and schema registries are behind
/// locks and every render reads a snapshot of them.
pub struct Dotprompt {
    handlebars: RwLock<Handlebars<'static>>,
    tools: RwLock<HashMap<String, ToolDefinition>>,
    schemas: RwLock<HashMap<String, JsonSchema>>,
    default_model: Option<String>,
    model_configs: HashMap<String, Map<String, Value>>,
    tool_resolver: Option<Arc<dyn ToolResolver>>,
    schema_resolver: Option<Arc<dyn SchemaResolver>>,
    partial_resolver: Option<Arc<dyn PartialResolver>>,
    store: Option<Arc<dyn PromptStore>>,
    strict: bool,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Dotprompt {
    pub fn new(options: DotpromptOptions) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        register_builtin_helpers(&mut registry);

        for (name, helper) in options.helpers {
            registry.register_helper(&name, helper);
        }
        for (name, source) in &options.partials {
            registry.register_partial(name, rewrite_data_variables(source))?;
        }

        Ok(Self {
            handlebars: RwLock::new(registry),
            tools: RwLock::new(options.tools),
            schemas: RwLock::new(options.schemas),
            default_model: options.default_model,
            model_configs: options.model_configs,
            tool_resolver: options.tool_resolver,
            schema_resolver: options.schema_resolver,
            partial_resolver: options.partial_resolver,
            store: options.store,
            strict: options.strict,
        })
    }

    pub fn define_helper(&self, name: &str, helper: impl HelperDef + Send + Sync + 'static) {
        if BUILTIN_HELPERS.contains(&name) {
            warn!("Helper '{name}' replaces a built-in helper");
        }
        write(&self.handlebars).register_helper(name, Box::new(helper));
        debug!("Registered helper '{name}'");
    }

    pub fn define_partial(&self, name: &str, source: &str) -> Result<()> {
        write(&self.handlebars).register_partial(name, rewrite_data_variables(source))?;
        debug!("Registered partial '{name}'");
        Ok(())
    }

    pub fn has_partial(&self, name: &str) -> bool {
        read(&self.handlebars).has_template(name)
    }

    pub fn define_tool(&self, tool: ToolDefinition) {
        write(&self.tools).insert(tool.name.clone(), tool);
    }

    pub fn define_schema(&self, name: &str, schema: JsonSchema) {
        write(&self.schemas).insert(name.to_string(), schema);
    }

    /// Split a source into metadata and template without resolving anything
    pub fn parse(&self, source: &str) -> Result<ParsedPrompt> {
        parse_document(source)
    }

    /// Parse and check a source, resolve its partials, and return a reusable renderer
    pub async fn compile(&self, source: &str) -> Result<PromptFunction<'_>> {
        let prompt = parse_document(source)?;
        validate_template_syntax(&prompt.template)?;
        self.resolve_partials(&prompt.template).await?;
        Ok(PromptFunction {
            engine: self,
            prompt,
        })
    }

    /// Load a prompt from the configured store and compile it
    pub async fn load(&self, name: &str, options: LoadOptions) -> Result<PromptFunction<'_>> {
        let Some(store) = &self.store else {
            return Err(DotpromptError::Store(anyhow::anyhow!(
                "no prompt store configured to load '{name}'"
            )));
        };
        let prompt = store
            .load(name, options)
            .await
            .map_err(DotpromptError::Store)?
            .ok_or_else(|| DotpromptError::Store(anyhow::anyhow!("prompt '{name}' not found")))?;
        debug!("Loaded prompt '{name}' from store");
        self.compile(&prompt.source).await
    }

    /// Compile and render in one step
    pub async fn render(
        &self,
        source: &str,
        data: &DataArgument,
        options: Option<&PromptMetadata>,
    ) -> Result<RenderedPrompt> {
        self.compile(source).await?.render(data, options).await
    }

    /// The fully resolved metadata a render of `source` would use
    pub async fn render_metadata(
        &self,
        source: &str,
        options: Option<&PromptMetadata>,
    ) -> Result<PromptMetadata> {
        let prompt = parse_document(source)?;
        self.resolve_metadata(prompt.metadata, options).await
    }

    /// Merge overrides and model defaults, then resolve tools and schemas
    pub async fn resolve_metadata(
        &self,
        base: PromptMetadata,
        options: Option<&PromptMetadata>,
    ) -> Result<PromptMetadata> {
        let mut metadata = match options {
            Some(overrides) => base.merged_with(overrides),
            None => base,
        };

        if metadata.model.is_none() {
            metadata.model = self.default_model.clone();
        }
        let model_config = metadata
            .model
            .as_ref()
            .and_then(|model| self.model_configs.get(model))
            .cloned();
        metadata.config = merge_maps(model_config, metadata.config.as_ref());

        if let Some(names) = metadata.tools.take() {
            let (resolved, unresolved) = self.resolve_tools(&names).await;
            let mut tool_defs = metadata.tool_defs.take().unwrap_or_default();
            for tool in resolved {
                if !tool_defs.iter().any(|t| t.name == tool.name) {
                    tool_defs.push(tool);
                }
            }
            let unresolved: Vec<String> = unresolved
                .into_iter()
                .filter(|name| !tool_defs.iter().any(|t| &t.name == name))
                .collect();
            if let (true, Some(name)) = (self.strict, unresolved.first()) {
                return Err(DotpromptError::ToolResolution(name.clone()));
            }
            metadata.tool_defs = (!tool_defs.is_empty()).then_some(tool_defs);
            metadata.tools = (!unresolved.is_empty()).then_some(unresolved);
        }

        if let Some(input) = metadata.input.as_mut() {
            input.schema = self.resolve_schema(input.schema.take()).await?;
        }
        if let Some(output) = metadata.output.as_mut() {
            output.schema = self.resolve_schema(output.schema.take()).await?;
        }

        Ok(metadata)
    }

    /// Look tool names up in the registry, then the resolver
    ///
    /// Lookups run concurrently over a registry snapshot; results come back in
    /// the order the names were declared.
    async fn resolve_tools(&self, names: &[String]) -> (Vec<ToolDefinition>, Vec<String>) {
        let registry = read(&self.tools).clone();

        let mut seen = HashSet::new();
        let unique: Vec<&String> = names.iter().filter(|n| seen.insert(n.as_str())).collect();

        let lookups = unique.into_iter().map(|name| {
            let registry = &registry;
            async move {
                if let Some(tool) = registry.get(name) {
                    return (name, Some(tool.clone()));
                }
                let Some(resolver) = &self.tool_resolver else {
                    return (name, None);
                };
                match resolver.resolve_tool(name).await {
                    Ok(found) => (name, found),
                    Err(e) => {
                        warn!("Tool resolver failed for '{name}': {e:#}");
                        (name, None)
                    }
                }
            }
        });

        let mut resolved = Vec::new();
        let mut unresolved = Vec::new();
        for (name, found) in join_all(lookups).await {
            match found {
                Some(tool) => resolved.push(tool),
                None => unresolved.push(name.clone()),
            }
        }
        (resolved, unresolved)
    }

    async fn resolve_schema(&self, schema: Option<Value>) -> Result<Option<JsonSchema>> {
        let Some(schema) = schema else {
            return Ok(None);
        };

        let registered = read(&self.schemas).clone();
        if registered.is_empty() && self.schema_resolver.is_none() {
            return picoschema_to_json_schema(&schema, None).await;
        }

        let lookup = SchemaLookup {
            registered,
            resolver: self.schema_resolver.as_deref(),
        };
        picoschema_to_json_schema(&schema, Some(&lookup as &dyn SchemaResolver)).await
    }

    /// Load every partial `template` needs, following partials of partials
    ///
    /// Names already registered are skipped. A name nobody can supply stays
    /// unregistered, so rendering fails only if the template reaches it;
    /// strict engines fail here instead.
    pub async fn resolve_partials(&self, template: &str) -> Result<()> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<String> = identify_partials(template).into();

        while let Some(name) = queue.pop_front() {
            if !visited.insert(name.clone()) || self.has_partial(&name) {
                continue;
            }

            match self.load_partial_source(&name).await {
                Some(source) => {
                    self.define_partial(&name, &source)?;
                    queue.extend(identify_partials(&source));
                }
                None if self.strict => return Err(DotpromptError::PartialResolution(name)),
                None => debug!("Partial '{name}' could not be resolved"),
            }
        }
        Ok(())
    }

    async fn load_partial_source(&self, name: &str) -> Option<String> {
        if let Some(resolver) = &self.partial_resolver {
            match resolver.resolve_partial(name).await {
                Ok(Some(source)) => return Some(source),
                Ok(None) => {}
                Err(e) => warn!("Partial resolver failed for '{name}': {e:#}"),
            }
        }

        if let Some(store) = &self.store {
            match store.load_partial(name, LoadOptions::default()).await {
                Ok(Some(partial)) => return Some(partial.source),
                Ok(None) => {}
                Err(e) => warn!("Failed to load partial '{name}' from store: {e:#}"),
            }
        }
        None
    }
}

/// Registered schemas first, then the caller's resolver
struct SchemaLookup<'a> {
    registered: HashMap<String, JsonSchema>,
    resolver: Option<&'a dyn SchemaResolver>,
}

#[async_trait]
impl SchemaResolver for SchemaLookup<'_> {
    async fn resolve_schema(&self, name: &str) -> anyhow::Result<Option<JsonSchema>> {
        if let Some(schema) = self.registered.get(name) {
            return Ok(Some(schema.clone()));
        }
        match self.resolver {
            Some(resolver) => resolver.resolve_schema(name).await,
            None => Ok(None),
        }
    }
}

/// A compiled prompt bound to the engine that compiled it
pub struct PromptFunction<'a> {
    engine: &'a Dotprompt,
    prompt: ParsedPrompt,
}

impl PromptFunction<'_> {
    pub fn prompt(&self) -> &ParsedPrompt {
        &self.prompt
    }

    pub async fn render_metadata(&self, options: Option<&PromptMetadata>) -> Result<PromptMetadata> {
        self.engine
            .resolve_metadata(self.prompt.metadata.clone(), options)
            .await
    }

    pub async fn render(
        &self,
        data: &DataArgument,
        options: Option<&PromptMetadata>,
    ) -> Result<RenderedPrompt> {
        let metadata = self.render_metadata(options).await?;
        let root = build_context(&metadata, data)?;

        let rendered = {
            let handlebars = read(&self.engine.handlebars);
            render_template(&handlebars, &self.prompt.template, &root)?
        };
        debug!("Rendered {} bytes of template output", rendered.len());

        let messages = to_messages(&rendered, data.messages.as_deref());
        Ok(RenderedPrompt { metadata, messages })
    }
}
