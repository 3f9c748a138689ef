use crate::csf::CsfIndexer;
use crate::entry::RawEntry;
use crate::mdx::MdxIndexer;
use crate::naming::title_from_path;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Context handed to an indexer for one file.
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub working_dir: PathBuf,
    pub import_path: String,
    /// Path relative to the owning specifier's directory.
    pub relative_path: String,
    pub title_prefix: Option<String>,
}

impl IndexerOptions {
    /// The title a file gets when it does not declare one. A declared title is
    /// returned unchanged.
    #[must_use]
    pub fn make_title(&self, user_title: Option<&str>) -> String {
        match user_title {
            Some(title) => title.to_string(),
            None => title_from_path(&self.relative_path, self.title_prefix.as_deref()),
        }
    }
}

/// A pluggable extractor that turns one story file into raw entries.
#[async_trait]
pub trait Indexer: Send + Sync {
    fn name(&self) -> &str;

    /// Files this indexer handles.
    fn test(&self) -> &Regex;

    async fn create_index(
        &self,
        file_name: &Path,
        options: &IndexerOptions,
    ) -> anyhow::Result<Vec<RawEntry>>;
}

/// Ordered indexers; the first one whose `test` matches a path wins.
#[derive(Clone, Default)]
pub struct IndexerRegistry {
    indexers: Vec<Arc<dyn Indexer>>,
}

impl IndexerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the CSF and MDX indexers.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.push(Arc::new(CsfIndexer::new()));
        registry.push(Arc::new(MdxIndexer::new()));
        registry
    }

    pub fn push(&mut self, indexer: Arc<dyn Indexer>) {
        self.indexers.push(indexer);
    }

    /// Registers `indexer` ahead of every existing one.
    pub fn prepend(&mut self, indexer: Arc<dyn Indexer>) {
        self.indexers.insert(0, indexer);
    }

    #[must_use]
    pub fn select(&self, path: &Path) -> Option<Arc<dyn Indexer>> {
        let name = path.to_string_lossy();
        self.indexers
            .iter()
            .find(|indexer| indexer.test().is_match(&name))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indexers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexers.is_empty()
    }
}

impl std::fmt::Debug for IndexerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.indexers.iter().map(|indexer| indexer.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        name: &'static str,
        test: Regex,
    }

    #[async_trait]
    impl Indexer for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn test(&self) -> &Regex {
            &self.test
        }

        async fn create_index(
            &self,
            _file_name: &Path,
            _options: &IndexerOptions,
        ) -> anyhow::Result<Vec<RawEntry>> {
            Ok(Vec::new())
        }
    }

    fn named(name: &'static str, pattern: &str) -> Arc<dyn Indexer> {
        Arc::new(Named {
            name,
            test: Regex::new(pattern).unwrap(),
        })
    }

    #[test]
    fn first_matching_indexer_wins() {
        let mut registry = IndexerRegistry::new();
        registry.push(named("js", r"\.js$"));
        registry.push(named("stories", r"\.stories\.js$"));
        let chosen = registry.select(Path::new("/p/A.stories.js")).unwrap();
        assert_eq!(chosen.name(), "js");

        registry.prepend(named("custom", r"A\.stories"));
        let chosen = registry.select(Path::new("/p/A.stories.js")).unwrap();
        assert_eq!(chosen.name(), "custom");
    }

    #[test]
    fn unmatched_paths_have_no_indexer() {
        let registry = IndexerRegistry::with_builtins();
        assert!(registry.select(Path::new("/p/readme.txt")).is_none());
        assert_eq!(
            registry.select(Path::new("/p/A.stories.tsx")).unwrap().name(),
            "csf"
        );
        assert_eq!(registry.select(Path::new("/p/Intro.mdx")).unwrap().name(), "mdx");
    }

    #[test]
    fn make_title_prefers_declared_title() {
        let options = IndexerOptions {
            working_dir: PathBuf::from("/p"),
            import_path: "./src/forms/Input.stories.ts".into(),
            relative_path: "forms/Input.stories.ts".into(),
            title_prefix: Some("Design".into()),
        };
        assert_eq!(options.make_title(Some("Custom")), "Custom");
        assert_eq!(options.make_title(None), "Design/Forms/Input");
    }
}
