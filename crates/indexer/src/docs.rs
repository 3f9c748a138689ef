//! Autodocs: docs pages generated next to the stories they describe.

use crate::entry::{DocsEntry, StoryEntry};
use crate::naming::{docs_id, merge_tags};
use serde::{Deserialize, Serialize};

pub const AUTODOCS_TAG: &str = "autodocs";
pub const DEFAULT_DOCS_NAME: &str = "docs";

/// When a story file gets a generated docs page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AutodocsSetting", into = "AutodocsSetting")]
pub enum Autodocs {
    /// Every story file.
    Enabled,
    /// Story files with at least one story tagged `autodocs`.
    #[default]
    Tag,
    Disabled,
}

/// `true`, `false` or `"tag"` in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum AutodocsSetting {
    Flag(bool),
    Mode(String),
}

impl TryFrom<AutodocsSetting> for Autodocs {
    type Error = String;

    fn try_from(value: AutodocsSetting) -> Result<Self, Self::Error> {
        match value {
            AutodocsSetting::Flag(true) => Ok(Self::Enabled),
            AutodocsSetting::Flag(false) => Ok(Self::Disabled),
            AutodocsSetting::Mode(mode) if mode == "tag" => Ok(Self::Tag),
            AutodocsSetting::Mode(mode) => Err(format!(
                "autodocs must be true, false or \"tag\", got \"{mode}\""
            )),
        }
    }
}

impl From<Autodocs> for AutodocsSetting {
    fn from(value: Autodocs) -> Self {
        match value {
            Autodocs::Enabled => Self::Flag(true),
            Autodocs::Disabled => Self::Flag(false),
            Autodocs::Tag => Self::Mode("tag".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsOptions {
    pub autodocs: Autodocs,
    pub default_name: String,
}

impl Default for DocsOptions {
    fn default() -> Self {
        Self {
            autodocs: Autodocs::default(),
            default_name: DEFAULT_DOCS_NAME.to_string(),
        }
    }
}

impl DocsOptions {
    fn applies_to(&self, stories: &[StoryEntry]) -> bool {
        match self.autodocs {
            Autodocs::Enabled => true,
            Autodocs::Disabled => false,
            Autodocs::Tag => stories
                .iter()
                .any(|story| story.tags.iter().any(|tag| tag == AUTODOCS_TAG)),
        }
    }
}

/// Docs entries for one file's stories: one per distinct title, in the order
/// titles first appear. Callers place them ahead of the stories.
#[must_use]
pub fn synthesize_docs(stories: &[StoryEntry], options: &DocsOptions) -> Vec<DocsEntry> {
    if !options.applies_to(stories) {
        return Vec::new();
    }

    let mut docs: Vec<DocsEntry> = Vec::new();
    for story in stories {
        if let Some(existing) = docs.iter_mut().find(|doc| doc.title == story.title) {
            existing.tags = merge_tags(&existing.tags, &story.tags);
            continue;
        }
        docs.push(DocsEntry {
            id: docs_id(&story.title, &options.default_name),
            title: story.title.clone(),
            name: options.default_name.clone(),
            import_path: story.import_path.clone(),
            stories_imports: Vec::new(),
            tags: story.tags.clone(),
            synthesized: true,
        });
    }
    docs
}
