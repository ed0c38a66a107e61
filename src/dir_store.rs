use crate::store::{
    ListOptions, LoadOptions, Page, PromptData, PromptRef, PromptStore, PromptStoreWritable,
};
use crate::validation::{validate_prompt_name, validate_prompt_source, validate_variant};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const PROMPT_EXTENSION: &str = "prompt";
const PARTIAL_PREFIX: char = '_';

/// Prompt store backed by a directory of `.prompt` files
///
/// ```text
/// root/
///   greeting.prompt           -> prompt "greeting"
///   greeting.formal.prompt    -> prompt "greeting", variant "formal"
///   _footer.prompt            -> partial "footer"
///   support/triage.prompt     -> prompt "support/triage"
/// ```
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl Default for DirStore {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}

impl DirStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.dotprompt/prompts`, or a relative `.dotprompt/prompts` without a home directory
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".dotprompt").join("prompts"))
            .unwrap_or_else(|| PathBuf::from(".dotprompt/prompts"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create prompts directory: {}", self.root.display()))
    }

    fn prompt_path(&self, name: &str, variant: Option<&str>) -> Result<PathBuf> {
        validate_prompt_name(name)?;
        let file_name = match variant {
            Some(variant) => {
                validate_variant(variant)?;
                format!("{name}.{variant}.{PROMPT_EXTENSION}")
            }
            None => format!("{name}.{PROMPT_EXTENSION}"),
        };
        Ok(self.root.join(file_name))
    }

    fn partial_path(&self, name: &str, variant: Option<&str>) -> Result<PathBuf> {
        validate_prompt_name(name)?;
        let (dir, base) = match name.rsplit_once('/') {
            Some((dir, base)) => (Some(dir), base),
            None => (None, name),
        };
        let file_name = match variant {
            Some(variant) => {
                validate_variant(variant)?;
                format!("{PARTIAL_PREFIX}{base}.{variant}.{PROMPT_EXTENSION}")
            }
            None => format!("{PARTIAL_PREFIX}{base}.{PROMPT_EXTENSION}"),
        };
        Ok(match dir {
            Some(dir) => self.root.join(dir).join(file_name),
            None => self.root.join(file_name),
        })
    }

    /// Every `.prompt` file under the root, split into prompts and partials
    async fn scan(&self) -> Result<(Vec<PromptRef>, Vec<PromptRef>)> {
        let mut prompts = Vec::new();
        let mut partials = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound && dir == self.root => break,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to read prompts directory: {}", dir.display())
                    });
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
                    continue;
                };
                if file_name.starts_with('.') {
                    continue;
                }

                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Some(stem) = file_name.strip_suffix(".prompt") else {
                    continue;
                };
                let Ok(relative_dir) = dir.strip_prefix(&self.root) else {
                    continue;
                };
                match parse_stem(relative_dir, stem) {
                    Some((true, reference)) => partials.push(reference),
                    Some((false, reference)) => prompts.push(reference),
                    None => warn!("Skipping prompt file with invalid name: {}", path.display()),
                }
            }
        }

        prompts.sort();
        partials.sort();
        Ok((prompts, partials))
    }

    async fn read_source(&self, path: &Path, reference: PromptRef) -> Result<Option<PromptData>> {
        match fs::read_to_string(path).await {
            Ok(source) => Ok(Some(PromptData::new(reference, source))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read prompt: {}", path.display())),
        }
    }

    async fn write_source(&self, path: &Path, source: &str) -> Result<()> {
        validate_prompt_source(source)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(path, source)
            .await
            .with_context(|| format!("Failed to write prompt: {}", path.display()))?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn remove(&self, path: &Path, name: &str) -> Result<()> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            anyhow::bail!("Prompt '{name}' not found");
        }
        fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to delete prompt: {name}"))
    }
}

/// Split `name[.variant]` (with a leading `_` for partials) into a reference
fn parse_stem(relative_dir: &Path, stem: &str) -> Option<(bool, PromptRef)> {
    let (is_partial, stem) = match stem.strip_prefix(PARTIAL_PREFIX) {
        Some(rest) => (true, rest),
        None => (false, stem),
    };
    let (base, variant) = match stem.split_once('.') {
        Some((base, variant)) => (base, Some(variant)),
        None => (stem, None),
    };

    let mut segments: Vec<&str> = relative_dir
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    segments.push(base);
    let name = segments.join("/");

    validate_prompt_name(&name).ok()?;
    if let Some(variant) = variant {
        validate_variant(variant).ok()?;
    }

    let mut reference = PromptRef::new(name);
    reference.variant = variant.map(str::to_string);
    Some((is_partial, reference))
}

/// Offset-cursor pagination over a sorted listing
fn paginate(items: Vec<PromptRef>, options: &ListOptions) -> Result<Page<PromptRef>> {
    let start = match &options.cursor {
        Some(cursor) => cursor
            .parse::<usize>()
            .with_context(|| format!("Invalid list cursor: '{cursor}'"))?,
        None => 0,
    };
    let end = match options.limit {
        Some(limit) => start.saturating_add(limit).min(items.len()),
        None => items.len(),
    };
    let cursor = (end < items.len()).then(|| end.to_string());
    let items = items.into_iter().skip(start).take(end.saturating_sub(start)).collect();
    Ok(Page { items, cursor })
}

#[async_trait]
impl PromptStore for DirStore {
    async fn list(&self, options: ListOptions) -> Result<Page<PromptRef>> {
        let (prompts, _) = self.scan().await?;
        paginate(prompts, &options)
    }

    async fn list_partials(&self, options: ListOptions) -> Result<Page<PromptRef>> {
        let (_, partials) = self.scan().await?;
        paginate(partials, &options)
    }

    async fn load(&self, name: &str, options: LoadOptions) -> Result<Option<PromptData>> {
        let variant = options.variant.as_deref();
        let path = self.prompt_path(name, variant)?;
        let mut reference = PromptRef::new(name);
        reference.variant = options.variant.clone();
        self.read_source(&path, reference).await
    }

    async fn load_partial(&self, name: &str, options: LoadOptions) -> Result<Option<PromptData>> {
        let variant = options.variant.as_deref();
        let path = self.partial_path(name, variant)?;
        let mut reference = PromptRef::new(name);
        reference.variant = options.variant.clone();
        self.read_source(&path, reference).await
    }
}

#[async_trait]
impl PromptStoreWritable for DirStore {
    async fn save(&self, prompt: PromptData) -> Result<()> {
        let path = self.prompt_path(&prompt.reference.name, prompt.reference.variant.as_deref())?;
        self.write_source(&path, &prompt.source).await
    }

    async fn delete(&self, name: &str, options: LoadOptions) -> Result<()> {
        let path = self.prompt_path(name, options.variant.as_deref())?;
        self.remove(&path, name).await
    }

    async fn save_partial(&self, partial: PromptData) -> Result<()> {
        let path =
            self.partial_path(&partial.reference.name, partial.reference.variant.as_deref())?;
        self.write_source(&path, &partial.source).await
    }

    async fn delete_partial(&self, name: &str, options: LoadOptions) -> Result<()> {
        let path = self.partial_path(name, options.variant.as_deref())?;
        self.remove(&path, name).await
    }
}
