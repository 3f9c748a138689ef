//! Built-in indexer for MDX docs pages.

use crate::csf::CSF_FILE_PATTERN;
use crate::entry::RawEntry;
use crate::lexer::{resolve_specifier, static_regex, string_literals};
use crate::registry::{Indexer, IndexerOptions};
use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;

const STORY_EXTENSIONS: &[&str] = &["tsx", "ts", "jsx", "js", "mjs"];

pub struct MdxIndexer {
    test: Regex,
}

impl MdxIndexer {
    #[must_use]
    pub fn new() -> Self {
        static MDX_TEST: OnceLock<Regex> = OnceLock::new();
        Self {
            test: static_regex(&MDX_TEST, r"\.mdx$").clone(),
        }
    }
}

impl Default for MdxIndexer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Indexer for MdxIndexer {
    fn name(&self) -> &str {
        "mdx"
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
        let mdx = parse_mdx(&source);

        let resolve = |specifier: &str| {
            let resolved = resolve_story_file(file_name, specifier);
            resolve_specifier(&options.working_dir, file_name, &resolved)
        };

        let mut stories_imports = Vec::new();
        if let Some(of) = &mdx.of {
            let specifier = mdx
                .imports
                .get(of)
                .with_context(|| format!("<Meta of={{{of}}} /> does not reference an import"))?;
            stories_imports.push(resolve(specifier));
        }
        for specifier in mdx.imports.values() {
            let import_path = resolve(specifier);
            if is_story_import(&import_path) && !stories_imports.contains(&import_path) {
                stories_imports.push(import_path);
            }
        }

        let mut entry = RawEntry::docs(options.import_path.clone());
        entry.title = mdx.title;
        entry.name = mdx.name;
        entry.tags = (!mdx.tags.is_empty()).then_some(mdx.tags);
        entry.stories_imports = stories_imports;
        Ok(vec![entry])
    }
}

#[derive(Debug, Default)]
struct MdxFile {
    of: Option<String>,
    title: Option<String>,
    name: Option<String>,
    tags: Vec<String>,
    /// local binding -> module specifier, sorted by binding for stable output.
    imports: BTreeMap<String, String>,
}

fn parse_mdx(source: &str) -> MdxFile {
    static META: OnceLock<Regex> = OnceLock::new();
    static IMPORT: OnceLock<Regex> = OnceLock::new();

    let mut mdx = MdxFile::default();
    for caps in static_regex(
        &IMPORT,
        r#"(?m)^\s*import\s+(?:\*\s+as\s+)?([A-Za-z_$][\w$]*)\s+from\s+['"]([^'"]+)['"]"#,
    )
    .captures_iter(source)
    {
        if let (Some(binding), Some(specifier)) = (caps.get(1), caps.get(2)) {
            mdx.imports
                .insert(binding.as_str().to_string(), specifier.as_str().to_string());
        }
    }

    let Some(attrs) = static_regex(&META, r"<Meta\b([^>]*)/?>")
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    else {
        return mdx;
    };
    let attributes = parse_attributes(attrs);
    mdx.of = attributes.get("of").cloned();
    mdx.title = attributes.get("title").cloned();
    mdx.name = attributes.get("name").cloned();
    mdx.tags = attributes
        .get("tags")
        .map(|raw| string_literals(raw))
        .unwrap_or_default();
    mdx
}

/// `key="v"`, `key='v'` and `key={expr}` attributes of a JSX tag.
fn parse_attributes(attrs: &str) -> HashMap<String, String> {
    static ATTR: OnceLock<Regex> = OnceLock::new();
    static_regex(
        &ATTR,
        r#"([A-Za-z]+)\s*=\s*(?:"([^"]*)"|'([^']*)'|\{([^}]*)\})"#,
    )
    .captures_iter(attrs)
    .filter_map(|caps| {
        let key = caps.get(1)?.as_str().to_string();
        let value = (2..=4).find_map(|group| caps.get(group))?.as_str().trim();
        Some((key, value.to_string()))
    })
    .collect()
}

/// Adds the on-disk extension to an extensionless relative story import.
fn resolve_story_file(importer: &Path, specifier: &str) -> String {
    let has_extension = Path::new(specifier)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| STORY_EXTENSIONS.contains(&ext));
    if !specifier.starts_with('.') || has_extension {
        return specifier.to_string();
    }
    let base = importer.parent().unwrap_or(importer);
    STORY_EXTENSIONS
        .iter()
        .map(|ext| format!("{specifier}.{ext}"))
        .find(|candidate| base.join(candidate).is_file())
        .unwrap_or_else(|| specifier.to_string())
}

fn is_story_import(import_path: &str) -> bool {
    static CSF: OnceLock<Regex> = OnceLock::new();
    static_regex(&CSF, CSF_FILE_PATTERN).is_match(import_path)
}
