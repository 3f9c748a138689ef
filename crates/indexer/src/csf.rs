//! Built-in indexer for Component Story Format files.

use crate::entry::{RawEntry, StoryStats};
use crate::lexer::{
    identifier_field, object_body, resolve_specifier, static_regex, string_field,
    string_list_field, top_level,
};
use crate::naming::merge_tags;
use crate::registry::{Indexer, IndexerOptions};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

pub const CSF_FILE_PATTERN: &str = r"\.(stories|story)\.(m?js|jsx|ts|tsx)$";

pub struct CsfIndexer {
    test: Regex,
}

impl CsfIndexer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            test: static_regex(&CSF_TEST, CSF_FILE_PATTERN).clone(),
        }
    }
}

impl Default for CsfIndexer {
    fn default() -> Self {
        Self::new()
    }
}

static CSF_TEST: OnceLock<Regex> = OnceLock::new();

#[async_trait]
impl Indexer for CsfIndexer {
    fn name(&self) -> &str {
        "csf"
    }

    fn test(&self) -> &Regex {
        &self.test
    }

    async fn create_index(
        &self,
        file_name: &Path,
        options: &IndexerOptions,
    ) -> anyhow::Result<Vec<RawEntry>> {
        let source = tokio::fs::read_to_string(file_name)
            .await
            .with_context(|| format!("reading {}", file_name.display()))?;
        let csf = parse_csf(&source)?;

        let title = options.make_title(csf.meta.title.as_deref());
        let component_path = csf
            .meta
            .component
            .as_ref()
            .and_then(|ident| csf.imports.get(ident))
            .map(|specifier| resolve_specifier(&options.working_dir, file_name, specifier));

        Ok(csf
            .stories
            .into_iter()
            .filter(|story| csf.meta.includes(&story.export_name))
            .map(|story| RawEntry {
                export_name: Some(story.export_name),
                import_path: options.import_path.clone(),
                subtype: Some("story".to_string()),
                title: Some(title.clone()),
                name: story.name,
                meta_id: csf.meta.id.clone(),
                tags: Some(merge_tags(&csf.meta.tags, &story.tags)),
                component_path: component_path.clone(),
                stats: Some(story.stats),
                ..RawEntry::default()
            })
            .collect())
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CsfMeta {
    title: Option<String>,
    id: Option<String>,
    tags: Vec<String>,
    component: Option<String>,
    include_stories: Option<Vec<String>>,
    exclude_stories: Vec<String>,
}

impl CsfMeta {
    fn includes(&self, export_name: &str) -> bool {
        if self.exclude_stories.iter().any(|name| name == export_name) {
            return false;
        }
        self.include_stories
            .as_ref()
            .map_or(true, |names| names.iter().any(|name| name == export_name))
    }
}

#[derive(Debug, PartialEq, Eq)]
struct CsfStory {
    export_name: String,
    name: Option<String>,
    tags: Vec<String>,
    stats: StoryStats,
}

#[derive(Debug)]
struct CsfFile {
    meta: CsfMeta,
    stories: Vec<CsfStory>,
    imports: HashMap<String, String>,
}

fn parse_csf(source: &str) -> anyhow::Result<CsfFile> {
    static DEFAULT_EXPORT: OnceLock<Regex> = OnceLock::new();
    let default_export = static_regex(&DEFAULT_EXPORT, r"(?m)^\s*export\s+default\s+")
        .find(source)
        .ok_or_else(|| anyhow!("CSF: missing default export"))?;

    let meta_body = meta_object(source, default_export.end());
    let meta = meta_body
        .map(|body| {
            let top = top_level(body);
            CsfMeta {
                title: string_field(&top, "title"),
                id: string_field(&top, "id"),
                tags: string_list_field(&top, "tags").unwrap_or_default(),
                component: identifier_field(&top, "component"),
                include_stories: string_list_field(&top, "includeStories"),
                exclude_stories: string_list_field(&top, "excludeStories").unwrap_or_default(),
            }
        })
        .unwrap_or_default();

    Ok(CsfFile {
        meta,
        stories: parse_stories(source),
        imports: parse_imports(source),
    })
}

/// The meta object: either inlined after `export default` or bound to the
/// identifier it exports.
fn meta_object(source: &str, after_default: usize) -> Option<&str> {
    let rest = &source[after_default..];
    if rest.starts_with('{') {
        return object_body(source, after_default);
    }

    static IDENT: OnceLock<Regex> = OnceLock::new();
    let ident = static_regex(&IDENT, r"^([A-Za-z_$][\w$]*)")
        .captures(rest)?
        .get(1)?
        .as_str();
    let binding = Regex::new(&format!(
        r"(?:const|let|var)\s+{}\b[^=]*=\s*\{{",
        regex::escape(ident)
    ))
    .ok()?;
    let found = binding.find(source)?;
    object_body(source, found.end() - 1)
}

fn parse_stories(source: &str) -> Vec<CsfStory> {
    static STORY_EXPORT: OnceLock<Regex> = OnceLock::new();
    static STORY_NAME: OnceLock<Regex> = OnceLock::new();
    static STATS_KEY: OnceLock<Regex> = OnceLock::new();

    let story_export = static_regex(
        &STORY_EXPORT,
        r"(?m)^\s*export\s+(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*",
    );
    let legacy_names: HashMap<String, String> = static_regex(
        &STORY_NAME,
        r#"(?m)^\s*([A-Za-z_$][\w$]*)\.storyName\s*=\s*(?:'([^']*)'|"([^"]*)"|`([^`]*)`)"#,
    )
    .captures_iter(source)
    .filter_map(|caps| {
        let ident = caps.get(1)?.as_str().to_string();
        let name = (2..=4).find_map(|group| caps.get(group))?.as_str().to_string();
        Some((ident, name))
    })
    .collect();
    let stats_key = static_regex(
        &STATS_KEY,
        r"\b(render|play|loaders|mount|beforeEach)\s*(?::|\()",
    );

    let mut stories = Vec::new();
    for caps in story_export.captures_iter(source) {
        let (Some(whole), Some(ident)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let export_name = ident.as_str().to_string();
        if export_name.starts_with("__") {
            continue;
        }

        let mut story = CsfStory {
            name: legacy_names.get(&export_name).cloned(),
            export_name,
            tags: Vec::new(),
            stats: StoryStats::default(),
        };

        match object_body(source, whole.end()) {
            Some(body) => {
                let top = top_level(body);
                if let Some(name) = string_field(&top, "name") {
                    story.name = Some(name);
                }
                story.tags = string_list_field(&top, "tags").unwrap_or_default();
                for key in stats_key.captures_iter(&top).filter_map(|c| c.get(1)) {
                    match key.as_str() {
                        "render" => story.stats.render = true,
                        "play" => story.stats.play = true,
                        "loaders" => story.stats.loaders = true,
                        "mount" => story.stats.mount = true,
                        "beforeEach" => story.stats.before_each = true,
                        _ => {}
                    }
                }
            }
            None => story.stats.story_fn = true,
        }
        stories.push(story);
    }
    stories
}

fn parse_imports(source: &str) -> HashMap<String, String> {
    static IMPORT: OnceLock<Regex> = OnceLock::new();
    let import = static_regex(
        &IMPORT,
        r#"import\s+(?:type\s+)?(?:([A-Za-z_$][\w$]*)\s*,?\s*)?(?:\{([^}]*)\})?\s*from\s*['"]([^'"]+)['"]"#,
    );

    let mut imports = HashMap::new();
    for caps in import.captures_iter(source) {
        let Some(specifier) = caps.get(3).map(|m| m.as_str().to_string()) else {
            continue;
        };
        if let Some(default) = caps.get(1) {
            imports.insert(default.as_str().to_string(), specifier.clone());
        }
        if let Some(named) = caps.get(2) {
            for binding in named.as_str().split(',') {
                let local = binding.rsplit(" as ").next().unwrap_or(binding).trim();
                if !local.is_empty() {
                    imports.insert(local.to_string(), specifier.clone());
                }
            }
        }
    }
    imports
}
