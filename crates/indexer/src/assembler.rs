use crate::cache::IndexCache;
use crate::entry::{IndexEntry, StoryIndex};
use crate::stats::IndexSummary;
use crate::{Result, StoryIndexError};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct AssembleOptions {
    /// Reject two stories that share a visible `(title, name)`.
    pub strict_story_names: bool,
}

/// One immutable assembled index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSnapshot {
    /// Increases with every assembly; never part of the `index.json` body.
    pub generation: u64,
    pub index: StoryIndex,
    pub summary: IndexSummary,
}

/// Flattens the cache into an index in specifier, file, then entry order.
///
/// Fails on the first duplicate id. An indexer-produced docs entry replaces an
/// autodocs entry with the same id in place, whichever file came first.
pub fn assemble(
    cache: &IndexCache,
    options: &AssembleOptions,
    generation: u64,
) -> Result<IndexSnapshot> {
    let mut entries: IndexMap<String, IndexEntry> = IndexMap::new();
    let mut summary = IndexSummary::new();
    let mut names: HashMap<(String, String), String> = HashMap::new();

    for record in cache.records() {
        summary.files += 1;
        if let Some(error) = &record.error {
            summary.add_error(&record.import_path, error);
            if record.is_stale() {
                summary.stale += 1;
            }
        }
        for warning in &record.warnings {
            summary.add_warning(&record.import_path, warning);
        }

        for entry in &record.entries {
            if options.strict_story_names {
                if let IndexEntry::Story(story) = entry {
                    let key = (story.title.clone(), story.name.clone());
                    if let Some(first_id) = names.get(&key) {
                        if *first_id != story.id {
                            return Err(StoryIndexError::DuplicateStoryName {
                                title: story.title.clone(),
                                name: story.name.clone(),
                                first_id: first_id.clone(),
                                second_id: story.id.clone(),
                            });
                        }
                    } else {
                        names.insert(key, story.id.clone());
                    }
                }
            }

            match entries.get_mut(entry.id()) {
                None => {
                    summary.add_entry(entry);
                    entries.insert(entry.id().to_string(), entry.clone());
                }
                Some(existing) => match (synthesized(existing), synthesized(entry)) {
                    (Some(true), Some(false)) => {
                        summary.remove_entry(existing);
                        summary.add_entry(entry);
                        *existing = entry.clone();
                    }
                    (Some(false), Some(true)) => {}
                    _ => {
                        return Err(StoryIndexError::DuplicateEntry {
                            id: entry.id().to_string(),
                            first_import_path: existing.import_path().to_string(),
                            second_import_path: entry.import_path().to_string(),
                        });
                    }
                },
            }
        }
    }

    Ok(IndexSnapshot {
        generation,
        index: StoryIndex::new(entries),
        summary,
    })
}

fn synthesized(entry: &IndexEntry) -> Option<bool> {
    match entry {
        IndexEntry::Docs(docs) => Some(docs.synthesized),
        IndexEntry::Story(_) => None,
    }
}
