use crate::entry::IndexEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A per-file problem surfaced through the summary instead of failing the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiagnostic {
    pub import_path: String,
    pub message: String,
}

/// Statistics about one assembled index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Number of story entries
    pub stories: usize,

    /// Number of docs entries
    pub docs: usize,

    pub total: usize,

    /// Tracked story files
    pub files: usize,

    /// Files serving entries from an earlier successful pass
    pub stale: usize,

    /// Tag -> number of entries carrying it
    pub tags: BTreeMap<String, usize>,

    /// Files whose last extraction failed
    pub errors: Vec<FileDiagnostic>,

    pub warnings: Vec<FileDiagnostic>,

    /// Time spent indexing and assembling in milliseconds
    pub time_ms: u64,
}

impl IndexSummary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, entry: &IndexEntry) {
        match entry {
            IndexEntry::Story(_) => self.stories += 1,
            IndexEntry::Docs(_) => self.docs += 1,
        }
        self.total += 1;
        for tag in entry.tags() {
            *self.tags.entry(tag.clone()).or_insert(0) += 1;
        }
    }

    /// Reverses `add_entry` for an entry replaced during assembly.
    pub fn remove_entry(&mut self, entry: &IndexEntry) {
        match entry {
            IndexEntry::Story(_) => self.stories = self.stories.saturating_sub(1),
            IndexEntry::Docs(_) => self.docs = self.docs.saturating_sub(1),
        }
        self.total = self.total.saturating_sub(1);
        for tag in entry.tags() {
            if let Some(count) = self.tags.get_mut(tag) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.tags.remove(tag);
                }
            }
        }
    }

    pub fn add_error(&mut self, import_path: &str, message: &str) {
        self.errors.push(FileDiagnostic {
            import_path: import_path.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_warning(&mut self, import_path: &str, message: &str) {
        self.warnings.push(FileDiagnostic {
            import_path: import_path.to_string(),
            message: message.to_string(),
        });
    }
}
