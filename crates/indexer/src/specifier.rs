use crate::naming::{import_path_for, posix, title_from_path};
use crate::{Result, StoryIndexError};
use globset::{GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Files matched when a stories entry names a bare directory.
pub const DEFAULT_FILES_PATTERN: &str =
    "**/*.{mdx,stories.js,stories.jsx,stories.mjs,stories.ts,stories.tsx}";

const IGNORED_SCOPES: &[&str] = &["node_modules", ".git"];

/// Where to look for stories, as configured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoriesSpecifier {
    pub directory: String,
    pub files: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_prefix: Option<String>,
}

impl StoriesSpecifier {
    pub fn new(directory: impl Into<String>, files: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            files: files.into(),
            title_prefix: None,
        }
    }

    #[must_use]
    pub fn with_title_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.title_prefix = Some(prefix.into());
        self
    }

    /// Splits a single glob such as `../src/**/*.stories.js` into its literal
    /// base directory and the glob remainder. A pattern without glob syntax is
    /// taken as a directory and gets [`DEFAULT_FILES_PATTERN`].
    pub fn from_glob(pattern: &str) -> Self {
        let segments: Vec<&str> = pattern.split('/').collect();
        let Some(first_glob) = segments.iter().position(|s| has_glob_syntax(s)) else {
            return Self::new(pattern.trim_end_matches('/'), DEFAULT_FILES_PATTERN);
        };
        let directory = if first_glob == 0 {
            ".".to_string()
        } else {
            segments[..first_glob].join("/")
        };
        Self::new(directory, segments[first_glob..].join("/"))
    }

    fn display(&self) -> String {
        format!("{}/{}", self.directory.trim_end_matches('/'), self.files)
    }
}

fn has_glob_syntax(segment: &str) -> bool {
    segment.contains(['*', '?', '[', '{', '(', '!'])
}

/// Rewrites `@(a|b)` and `+(a|b)` extglob groups into `{a,b}` alternates.
fn translate_extglob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    let mut depth = 0usize;
    while let Some(ch) = chars.next() {
        match ch {
            '@' | '+' if chars.peek() == Some(&'(') => {
                chars.next();
                depth += 1;
                out.push('{');
            }
            '|' if depth > 0 => out.push(','),
            ')' if depth > 0 => {
                depth -= 1;
                out.push('}');
            }
            _ => out.push(ch),
        }
    }
    out
}

fn compile_glob(pattern: &str) -> Result<globset::Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| StoryIndexError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// A specifier resolved against the working directory.
#[derive(Debug, Clone)]
pub struct NormalizedSpecifier {
    pub specifier: StoriesSpecifier,
    /// Absolute stories directory.
    pub directory: PathBuf,
    /// The directory as an import path, e.g. `./src`.
    pub directory_import_path: String,
    /// Matches the import paths of every file this specifier owns.
    pub import_path_matcher: Regex,
    matcher: GlobMatcher,
}

impl NormalizedSpecifier {
    pub fn new(specifier: StoriesSpecifier, working_dir: &Path) -> Result<Self> {
        let directory = lexical_normalize(&working_dir.join(&specifier.directory));
        let directory_import_path = import_path_for(working_dir, &directory);
        let files = translate_extglob(&specifier.files);

        let matcher = compile_glob(&files)?.compile_matcher();
        let full_pattern = format!(
            "{}/{files}",
            directory_import_path.trim_end_matches('/')
        );
        // globset emits byte-oriented regexes; import paths are always UTF-8.
        let full_regex = compile_glob(&full_pattern)?
            .regex()
            .trim_start_matches("(?-u)")
            .to_string();
        let import_path_matcher =
            Regex::new(&full_regex).map_err(|e| StoryIndexError::InvalidPattern {
                pattern: full_pattern.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            specifier,
            directory,
            directory_import_path,
            import_path_matcher,
            matcher,
        })
    }

    /// Path of `path` relative to the stories directory, `/`-separated.
    #[must_use]
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.directory).ok().map(posix)
    }

    /// Whether an absolute path belongs to this specifier.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let Some(relative) = self.relative_path(path) else {
            return false;
        };
        if relative
            .split('/')
            .any(|segment| IGNORED_SCOPES.contains(&segment))
        {
            return false;
        }
        self.matcher.is_match(&relative)
    }

    /// Title derived from the file's location below the stories directory.
    #[must_use]
    pub fn title_for(&self, path: &Path) -> String {
        let relative = self
            .relative_path(path)
            .unwrap_or_else(|| posix(path.file_name().map(Path::new).unwrap_or(path)));
        title_from_path(&relative, self.specifier.title_prefix.as_deref())
    }

    #[must_use]
    pub fn describe(&self) -> String {
        self.specifier.display()
    }

    fn scan(&self) -> Result<Vec<PathBuf>> {
        if !self.directory.is_dir() {
            return Err(StoryIndexError::Specifier {
                directory: self.directory.clone(),
                specifier: self.describe(),
            });
        }

        let files = self.walk(&self.directory);
        log::debug!("Specifier {} matched {} files", self.describe(), files.len());
        Ok(files)
    }

    /// Matching files below `dir`, which must sit inside the stories
    /// directory. Used when a whole directory appears at once.
    #[must_use]
    pub fn files_under(&self, dir: &Path) -> Vec<PathBuf> {
        if !dir.starts_with(&self.directory) || !dir.is_dir() {
            return Vec::new();
        }
        self.walk(dir)
    }

    fn walk(&self, root: &Path) -> Vec<PathBuf> {
        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(false)
            .ignore(false)
            .parents(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false);
        builder.filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map_or(true, |name| !IGNORED_SCOPES.contains(&name))
        });

        let mut files = Vec::new();
        for result in builder.build() {
            match result {
                Ok(entry) => {
                    if !entry.file_type().is_some_and(|t| t.is_file()) {
                        continue;
                    }
                    if self.matches(entry.path()) {
                        files.push(entry.path().to_path_buf());
                    }
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }
        files.sort();
        files
    }
}

/// A file path paired with the index of the specifier that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecifierMatch {
    pub specifier: usize,
    pub path: PathBuf,
}

pub fn normalize_specifiers(
    specifiers: &[StoriesSpecifier],
    working_dir: &Path,
) -> Result<Vec<NormalizedSpecifier>> {
    specifiers
        .iter()
        .cloned()
        .map(|specifier| NormalizedSpecifier::new(specifier, working_dir))
        .collect()
}

/// Expands every specifier against the filesystem, in configuration order and
/// then sorted path order.
pub async fn expand(specifiers: &[NormalizedSpecifier]) -> Result<Vec<SpecifierMatch>> {
    let specifiers = specifiers.to_vec();
    tokio::task::spawn_blocking(move || {
        let mut matches = Vec::new();
        for (index, specifier) in specifiers.iter().enumerate() {
            for path in specifier.scan()? {
                matches.push(SpecifierMatch {
                    specifier: index,
                    path,
                });
            }
        }
        Ok(matches)
    })
    .await
    .map_err(|e| StoryIndexError::Other(format!("specifier expansion task failed: {e}")))?
}

/// Resolves `.` and `..` without touching the filesystem.
pub(crate) fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn splits_single_glob_into_directory_and_files() {
        assert_eq!(
            StoriesSpecifier::from_glob("../src/**/*.stories.js"),
            StoriesSpecifier::new("../src", "**/*.stories.js")
        );
        assert_eq!(
            StoriesSpecifier::from_glob("*.mdx"),
            StoriesSpecifier::new(".", "*.mdx")
        );
        assert_eq!(
            StoriesSpecifier::from_glob("./docs/"),
            StoriesSpecifier::new("./docs", DEFAULT_FILES_PATTERN)
        );
    }

    #[test]
    fn extglob_groups_become_alternates() {
        assert_eq!(
            translate_extglob("**/*.stories.@(js|jsx|ts)"),
            "**/*.stories.{js,jsx,ts}"
        );
    }

    #[test]
    fn import_path_matcher_matches_owned_files() {
        let root = Path::new("/project");
        let spec = NormalizedSpecifier::new(
            StoriesSpecifier::new("./src", "**/*.stories.@(js|ts)"),
            root,
        )
        .unwrap();
        assert!(spec.import_path_matcher.is_match("./src/a/B.stories.ts"));
        assert!(!spec.import_path_matcher.is_match("./lib/B.stories.ts"));
        assert!(spec.matches(Path::new("/project/src/B.stories.js")));
        assert!(!spec.matches(Path::new("/project/src/B.js")));
        assert!(!spec.matches(Path::new("/project/src/node_modules/B.stories.js")));
    }

    #[tokio::test]
    async fn expands_sorted_per_specifier() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::create_dir_all(src.join("node_modules")).unwrap();
        fs::write(src.join("b.stories.js"), "").unwrap();
        fs::write(src.join("a.stories.js"), "").unwrap();
        fs::write(src.join("nested").join("c.stories.js"), "").unwrap();
        fs::write(src.join("node_modules").join("d.stories.js"), "").unwrap();
        fs::write(src.join("Intro.mdx"), "").unwrap();

        let specifiers = normalize_specifiers(
            &[
                StoriesSpecifier::new("./src", "*.stories.js"),
                StoriesSpecifier::new("./src", "**/*.mdx"),
            ],
            temp.path(),
        )
        .unwrap();
        let found = expand(&specifiers).await.unwrap();
        let listed: Vec<(usize, String)> = found
            .iter()
            .map(|m| (m.specifier, specifiers[m.specifier].relative_path(&m.path).unwrap()))
            .collect();
        assert_eq!(
            listed,
            vec![
                (0, "a.stories.js".to_string()),
                (0, "b.stories.js".to_string()),
                (1, "Intro.mdx".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let temp = tempdir().unwrap();
        let specifiers =
            normalize_specifiers(&[StoriesSpecifier::new("./nope", "*.js")], temp.path()).unwrap();
        let err = expand(&specifiers).await.unwrap_err();
        assert!(matches!(err, StoryIndexError::Specifier { .. }));
    }

    #[tokio::test]
    async fn empty_directory_is_valid() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        let specifiers =
            normalize_specifiers(&[StoriesSpecifier::new("./src", "*.js")], temp.path()).unwrap();
        assert!(expand(&specifiers).await.unwrap().is_empty());
    }
}
