//! Project configuration: `main.toml` and the optional `preview.toml` in the
//! config directory.

use crate::assembler::AssembleOptions;
use crate::cache::{BuildOptions, DEFAULT_INDEXER_CONCURRENCY};
use crate::docs::{Autodocs, DocsOptions};
use crate::generator::GeneratorOptions;
use crate::naming::import_path_for;
use crate::specifier::{lexical_normalize, StoriesSpecifier, DEFAULT_FILES_PATTERN};
use crate::{Result, StoryIndexError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MAIN_CONFIG_FILE: &str = "main.toml";
pub const PREVIEW_CONFIG_FILE: &str = "preview.toml";

/// One `stories` item: a single glob, or an explicit specifier table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoriesEntry {
    Glob(String),
    Specifier {
        directory: String,
        #[serde(default = "default_files")]
        files: String,
        #[serde(default)]
        title_prefix: Option<String>,
    },
}

fn default_files() -> String {
    DEFAULT_FILES_PATTERN.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub strict_story_names: bool,
    pub indexer_concurrency: usize,
    pub debounce_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            strict_story_names: false,
            indexer_concurrency: DEFAULT_INDEXER_CONCURRENCY,
            debounce_ms: 100,
            max_wait_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainConfig {
    pub stories: Vec<StoriesEntry>,
    #[serde(default)]
    pub docs: DocsOptions,
    #[serde(default)]
    pub index: IndexSettings,
}

/// `[docs]` keys the preview config may override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsOverride {
    pub autodocs: Option<Autodocs>,
    pub default_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Project tags applied to every entry.
    pub tags: Vec<String>,
    pub docs: DocsOverride,
}

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    config_dir: PathBuf,
    working_dir: PathBuf,
    pub main: MainConfig,
    pub preview: PreviewConfig,
}

impl ProjectConfig {
    /// Loads `<config_dir>/main.toml` and, when present, `preview.toml`.
    /// A relative `config_dir` is taken relative to `working_dir`.
    pub fn load(config_dir: &Path, working_dir: &Path) -> Result<Self> {
        let config_dir = lexical_normalize(&working_dir.join(config_dir));
        let main_path = config_dir.join(MAIN_CONFIG_FILE);
        let text = std::fs::read_to_string(&main_path).map_err(|e| {
            StoryIndexError::Config(format!("cannot read {}: {e}", main_path.display()))
        })?;
        let main: MainConfig = toml::from_str(&text)?;
        if main.stories.is_empty() {
            return Err(StoryIndexError::Config(format!(
                "{} lists no stories",
                main_path.display()
            )));
        }

        let mut config = Self {
            config_dir,
            working_dir: working_dir.to_path_buf(),
            main,
            preview: PreviewConfig::default(),
        };
        config.reload_preview()?;
        Ok(config)
    }

    /// Re-reads `preview.toml`; a missing file means no project tags and no
    /// docs overrides.
    pub fn reload_preview(&mut self) -> Result<()> {
        let path = self.preview_path();
        self.preview = if path.is_file() {
            toml::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            PreviewConfig::default()
        };
        log::debug!(
            "Preview config: {} project tags, autodocs override {:?}",
            self.preview.tags.len(),
            self.preview.docs.autodocs
        );
        Ok(())
    }

    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    #[must_use]
    pub fn preview_path(&self) -> PathBuf {
        self.config_dir.join(PREVIEW_CONFIG_FILE)
    }

    /// Specifiers with directories rebased from the config dir onto the
    /// working dir.
    pub fn specifiers(&self) -> Vec<StoriesSpecifier> {
        self.main
            .stories
            .iter()
            .map(|entry| {
                let mut specifier = match entry {
                    StoriesEntry::Glob(pattern) => StoriesSpecifier::from_glob(pattern),
                    StoriesEntry::Specifier {
                        directory,
                        files,
                        title_prefix,
                    } => StoriesSpecifier {
                        directory: directory.clone(),
                        files: files.clone(),
                        title_prefix: title_prefix.clone(),
                    },
                };
                let absolute = lexical_normalize(&self.config_dir.join(&specifier.directory));
                specifier.directory = import_path_for(&self.working_dir, &absolute);
                specifier
            })
            .collect()
    }

    #[must_use]
    pub fn docs_options(&self) -> DocsOptions {
        let overrides = &self.preview.docs;
        DocsOptions {
            autodocs: overrides.autodocs.unwrap_or(self.main.docs.autodocs),
            default_name: overrides
                .default_name
                .clone()
                .unwrap_or_else(|| self.main.docs.default_name.clone()),
        }
    }

    #[must_use]
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            docs: self.docs_options(),
            project_tags: self.preview.tags.clone(),
            indexer_concurrency: self.main.index.indexer_concurrency.max(1),
        }
    }

    #[must_use]
    pub fn generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            build: self.build_options(),
            assemble: AssembleOptions {
                strict_story_names: self.main.index.strict_story_names,
            },
            debounce: Duration::from_millis(self.main.index.debounce_ms),
            max_wait: Duration::from_millis(self.main.index.max_wait_ms),
        }
    }

    /// Whether a changed path is a preview config file.
    #[must_use]
    pub fn is_preview_file(&self, path: &Path) -> bool {
        path.parent() == Some(self.config_dir.as_path())
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("preview"))
    }
}
