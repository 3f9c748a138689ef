use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Format version written into every `index.json`.
pub const INDEX_FORMAT_VERSION: u32 = 5;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    #[default]
    Story,
    Docs,
}

/// Feature usage detected by an indexer for a single story export.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoryStats {
    #[serde(default)]
    pub play: bool,
    #[serde(default)]
    pub render: bool,
    #[serde(default)]
    pub loaders: bool,
    #[serde(default)]
    pub story_fn: bool,
    #[serde(default)]
    pub mount: bool,
    #[serde(default)]
    pub before_each: bool,
}

/// Indexer output for one export (or one docs page) of a file.
///
/// Full indexers fill `title`/`name`/`__id`; minimal ones only provide
/// `exportName`, `importPath` and `type`, and the normalizer completes the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_name: Option<String>,
    pub import_path: String,
    #[serde(rename = "type", default)]
    pub entry_type: EntryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_id: Option<String>,
    #[serde(rename = "__id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stories_imports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<StoryStats>,
}

impl RawEntry {
    /// Minimal story shape: export name and import path only.
    pub fn story(export_name: impl Into<String>, import_path: impl Into<String>) -> Self {
        Self {
            export_name: Some(export_name.into()),
            import_path: import_path.into(),
            entry_type: EntryType::Story,
            ..Self::default()
        }
    }

    pub fn docs(import_path: impl Into<String>) -> Self {
        Self {
            import_path: import_path.into(),
            entry_type: EntryType::Docs,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_meta_id(mut self, meta_id: impl Into<String>) -> Self {
        self.meta_id = Some(meta_id.into());
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryExtra {
    pub stats: StoryStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoryEntry {
    pub id: String,
    pub title: String,
    pub name: String,
    pub import_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_path: Option<String>,
    pub tags: Vec<String>,
    pub export_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_id: Option<String>,
    pub subtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<EntryExtra>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocsEntry {
    pub id: String,
    pub title: String,
    pub name: String,
    pub import_path: String,
    pub stories_imports: Vec<String>,
    pub tags: Vec<String>,
    /// Set on entries produced by autodocs rather than by an indexer.
    #[serde(skip)]
    pub synthesized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexEntry {
    Story(StoryEntry),
    Docs(DocsEntry),
}

impl IndexEntry {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Story(entry) => &entry.id,
            Self::Docs(entry) => &entry.id,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Story(entry) => &entry.title,
            Self::Docs(entry) => &entry.title,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Story(entry) => &entry.name,
            Self::Docs(entry) => &entry.name,
        }
    }

    #[must_use]
    pub fn import_path(&self) -> &str {
        match self {
            Self::Story(entry) => &entry.import_path,
            Self::Docs(entry) => &entry.import_path,
        }
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        match self {
            Self::Story(entry) => &entry.tags,
            Self::Docs(entry) => &entry.tags,
        }
    }

    #[must_use]
    pub const fn entry_type(&self) -> EntryType {
        match self {
            Self::Story(_) => EntryType::Story,
            Self::Docs(_) => EntryType::Docs,
        }
    }
}

/// The body served at `/index.json` and written to the static `index.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoryIndex {
    pub v: u32,
    pub entries: IndexMap<String, IndexEntry>,
}

impl StoryIndex {
    #[must_use]
    pub fn new(entries: IndexMap<String, IndexEntry>) -> Self {
        Self {
            v: INDEX_FORMAT_VERSION,
            entries,
        }
    }
}
