//! Per-file index cache and the invalidation engine around it.
//!
//! Every tracked path moves through `Unindexed -> Indexed -> Invalidated ->
//! Indexed ...`; removal drops the record. Only this module writes records.

use crate::docs::{synthesize_docs, DocsOptions};
use crate::entry::{EntryType, IndexEntry, RawEntry, StoryEntry};
use crate::naming::import_path_for;
use crate::normalize::{normalize_docs, normalize_story, FileContext};
use crate::registry::{Indexer, IndexerOptions, IndexerRegistry};
use crate::specifier::{lexical_normalize, NormalizedSpecifier};
use crate::StoryIndexError;
use log::{debug, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};

pub const DEFAULT_INDEXER_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Unindexed,
    Indexed,
    Invalidated,
}

/// Inputs shared by every file of one indexing pass.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub docs: DocsOptions,
    /// Project tags from the preview config, applied to every entry.
    pub project_tags: Vec<String>,
    pub indexer_concurrency: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            docs: DocsOptions::default(),
            project_tags: Vec::new(),
            indexer_concurrency: DEFAULT_INDEXER_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub import_path: String,
    pub specifier: usize,
    pub state: FileState,
    /// SHA-256 of the file bytes at the last successful extraction.
    pub fingerprint: Option<String>,
    pub raw: Vec<RawEntry>,
    /// Entries from the last successful pass, kept while the file is broken.
    pub entries: Vec<IndexEntry>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    /// Paths this file's entries reference.
    pub depends_on: BTreeSet<PathBuf>,
    reextract: bool,
}

impl FileRecord {
    fn new(specifier: usize, path: PathBuf, import_path: String) -> Self {
        Self {
            path,
            import_path,
            specifier,
            state: FileState::Unindexed,
            fingerprint: None,
            raw: Vec::new(),
            entries: Vec::new(),
            warnings: Vec::new(),
            error: None,
            depends_on: BTreeSet::new(),
            reextract: true,
        }
    }

    #[must_use]
    pub fn needs_indexing(&self) -> bool {
        self.state != FileState::Indexed
    }

    /// Broken now but still serving entries from an earlier pass.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.error.is_some() && !self.entries.is_empty()
    }
}

/// Counts from one `ensure_indexed` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexPass {
    pub extracted: usize,
    pub reused: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct IndexCache {
    working_dir: PathBuf,
    specifiers: Vec<NormalizedSpecifier>,
    /// One map per specifier so iteration is specifier order, then path order.
    files: Vec<BTreeMap<PathBuf, FileRecord>>,
    /// referenced path -> paths whose entries reference it.
    dependents: HashMap<PathBuf, BTreeSet<PathBuf>>,
}

struct ExtractJob {
    specifier: usize,
    path: PathBuf,
    indexer: Option<Arc<dyn Indexer>>,
    options: IndexerOptions,
    reusable_fingerprint: Option<String>,
}

enum Extraction {
    Fresh {
        fingerprint: String,
        raw: Vec<RawEntry>,
    },
    Unchanged,
    Failed(String),
}

struct Resolved {
    entries: Vec<IndexEntry>,
    warnings: Vec<String>,
    depends_on: BTreeSet<PathBuf>,
    error: Option<String>,
}

impl IndexCache {
    #[must_use]
    pub fn new(working_dir: PathBuf, specifiers: Vec<NormalizedSpecifier>) -> Self {
        let files = specifiers.iter().map(|_| BTreeMap::new()).collect();
        Self {
            working_dir,
            specifiers,
            files,
            dependents: HashMap::new(),
        }
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    #[must_use]
    pub fn specifiers(&self) -> &[NormalizedSpecifier] {
        &self.specifiers
    }

    /// Starts tracking `path` as `Unindexed`. A path already owned by any
    /// specifier stays with its first owner.
    pub fn track(&mut self, specifier: usize, path: PathBuf) -> bool {
        if specifier >= self.files.len() || self.locate(&path).is_some() {
            return false;
        }
        let import_path = import_path_for(&self.working_dir, &path);
        self.files[specifier].insert(path.clone(), FileRecord::new(specifier, path, import_path));
        true
    }

    #[must_use]
    pub fn record(&self, path: &Path) -> Option<&FileRecord> {
        self.locate(path).and_then(|index| self.files[index].get(path))
    }

    /// Records in specifier order, then path order.
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.iter().flat_map(BTreeMap::values)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.iter().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.records().filter(|record| record.needs_indexing()).count()
    }

    #[must_use]
    pub fn dependents_of(&self, path: &Path) -> Vec<PathBuf> {
        self.dependents
            .get(path)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Handles a change notification for `path`. Returns whether any tracked
    /// state changed.
    pub fn invalidate(&mut self, path: &Path, removed: bool) -> bool {
        let path = lexical_normalize(path);
        let mut changed = false;
        if removed {
            changed = self.remove(&path);
            if !changed {
                // A removed directory takes every tracked file below it along.
                for child in self.tracked_under(&path) {
                    self.remove(&child);
                    self.invalidate_dependents(&child);
                    changed = true;
                }
            }
        } else if let Some(record) = self.record_mut(&path) {
            record.state = FileState::Invalidated;
            record.reextract = true;
            changed = true;
        } else if let Some(index) = self.specifiers.iter().position(|s| s.matches(&path)) {
            changed = self.track(index, path.clone());
        } else if path.is_dir() {
            // A moved-in directory reports only itself, not its children.
            for index in 0..self.specifiers.len() {
                for child in self.specifiers[index].files_under(&path) {
                    changed |= self.track(index, child);
                }
            }
        }
        self.invalidate_dependents(&path) || changed
    }

    /// Marks every tracked path for re-extraction.
    pub fn invalidate_all(&mut self) {
        for record in self.files.iter_mut().flat_map(BTreeMap::values_mut) {
            if record.state == FileState::Indexed {
                record.state = FileState::Invalidated;
            }
            record.reextract = true;
        }
    }

    /// Extracts and normalizes every file that is not `Indexed`.
    ///
    /// Story entries are normalized before docs entries so docs pages resolve
    /// against the titles of this pass.
    pub async fn ensure_indexed(
        &mut self,
        registry: &IndexerRegistry,
        options: &BuildOptions,
    ) -> IndexPass {
        let jobs = self.pending_jobs(registry);
        let mut pass = IndexPass::default();
        if jobs.is_empty() {
            return pass;
        }

        let semaphore = Arc::new(Semaphore::new(options.indexer_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut owners: HashMap<task::Id, (usize, PathBuf)> = HashMap::new();
        for job in jobs {
            let semaphore = semaphore.clone();
            let owner = (job.specifier, job.path.clone());
            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = extract(&job).await;
                (job.specifier, job.path, outcome)
            });
            owners.insert(handle.id(), owner);
        }

        let mut ready = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (specifier, path, outcome) = match joined {
                Ok((id, done)) => {
                    owners.remove(&id);
                    done
                }
                Err(e) => {
                    let Some((specifier, path)) = owners.remove(&e.id()) else {
                        warn!("Indexer task failed: {e}");
                        pass.failed += 1;
                        continue;
                    };
                    (specifier, path, Extraction::Failed(join_failure(e)))
                }
            };
            let Some(record) = self.files[specifier].get_mut(&path) else {
                continue;
            };
            match outcome {
                Extraction::Fresh { fingerprint, raw } => {
                    record.fingerprint = Some(fingerprint);
                    record.raw = raw;
                    record.reextract = false;
                    pass.extracted += 1;
                    ready.push((specifier, path));
                }
                Extraction::Unchanged => {
                    debug!("Reusing extraction of {} (fingerprint unchanged)", path.display());
                    pass.reused += 1;
                    ready.push((specifier, path));
                }
                Extraction::Failed(message) => {
                    let error = StoryIndexError::Extraction {
                        path: path.clone(),
                        message,
                    };
                    warn!("{error}");
                    record.error = Some(error.to_string());
                    pass.failed += 1;
                }
            }
        }
        ready.sort();

        let stories = self.normalize_stories(&ready, options);
        let titles = self.attached_titles(&stories);
        for ((specifier, path), (stories, warnings)) in ready.into_iter().zip(stories) {
            let resolved = self.resolve_file(specifier, &path, stories, warnings, &titles, options);
            if resolved.error.is_some() {
                pass.failed += 1;
            }
            self.apply(specifier, &path, resolved);
        }
        pass
    }

    fn pending_jobs(&self, registry: &IndexerRegistry) -> Vec<ExtractJob> {
        self.records()
            .filter(|record| record.needs_indexing())
            .map(|record| {
                let specifier = &self.specifiers[record.specifier];
                ExtractJob {
                    specifier: record.specifier,
                    path: record.path.clone(),
                    indexer: registry.select(&record.path),
                    options: IndexerOptions {
                        working_dir: self.working_dir.clone(),
                        import_path: record.import_path.clone(),
                        relative_path: specifier.relative_path(&record.path).unwrap_or_default(),
                        title_prefix: specifier.specifier.title_prefix.clone(),
                    },
                    reusable_fingerprint: if record.reextract {
                        None
                    } else {
                        record.fingerprint.clone()
                    },
                }
            })
            .collect()
    }

    fn file_context(
        &self,
        specifier: usize,
        record: &FileRecord,
        options: &BuildOptions,
    ) -> FileContext {
        FileContext {
            import_path: record.import_path.clone(),
            path_title: self.specifiers[specifier].title_for(&record.path),
            meta_tags: options.project_tags.clone(),
        }
    }

    /// Story entries of each ready file, tagged with their raw entry index.
    fn normalize_stories(
        &self,
        ready: &[(usize, PathBuf)],
        options: &BuildOptions,
    ) -> Vec<(Vec<(usize, StoryEntry)>, Vec<String>)> {
        ready
            .iter()
            .map(|(specifier, path)| {
                let record = &self.files[*specifier][path];
                let ctx = self.file_context(*specifier, record, options);
                let mut warnings = Vec::new();
                let stories = record
                    .raw
                    .iter()
                    .enumerate()
                    .filter(|(_, raw)| raw.entry_type == EntryType::Story)
                    .filter_map(|(index, raw)| {
                        normalize_story(raw, &ctx, &mut warnings).map(|story| (index, story))
                    })
                    .collect();
                for warning in &warnings {
                    warn!("{warning}");
                }
                (stories, warnings)
            })
            .collect()
    }

    /// import path -> title of the file's first story, preferring this pass.
    fn attached_titles(
        &self,
        fresh: &[(Vec<(usize, StoryEntry)>, Vec<String>)],
    ) -> HashMap<String, String> {
        let mut titles = HashMap::new();
        for record in self.records() {
            let title = record.entries.iter().find_map(|entry| match entry {
                IndexEntry::Story(story) => Some(story.title.clone()),
                IndexEntry::Docs(_) => None,
            });
            if let Some(title) = title {
                titles.insert(record.import_path.clone(), title);
            }
        }
        for (stories, _) in fresh {
            if let Some((_, story)) = stories.first() {
                titles.insert(story.import_path.clone(), story.title.clone());
            }
        }
        titles
    }

    fn resolve_file(
        &self,
        specifier: usize,
        path: &Path,
        stories: Vec<(usize, StoryEntry)>,
        warnings: Vec<String>,
        titles: &HashMap<String, String>,
        options: &BuildOptions,
    ) -> Resolved {
        let record = &self.files[specifier][path];
        let ctx = self.file_context(specifier, record, options);
        let plain: Vec<StoryEntry> = stories.iter().map(|(_, story)| story.clone()).collect();

        let mut entries: Vec<IndexEntry> = synthesize_docs(&plain, &options.docs)
            .into_iter()
            .map(IndexEntry::Docs)
            .collect();
        let mut depends_on = BTreeSet::new();
        let mut error = None;
        let mut stories = stories.into_iter().peekable();

        for (index, raw) in record.raw.iter().enumerate() {
            match raw.entry_type {
                EntryType::Story => {
                    if let Some((_, story)) = stories.next_if(|(at, _)| *at == index) {
                        entries.push(IndexEntry::Story(story));
                    }
                }
                EntryType::Docs => {
                    let others: Vec<&String> = raw
                        .stories_imports
                        .iter()
                        .filter(|import| **import != record.import_path)
                        .collect();
                    depends_on.extend(
                        others
                            .iter()
                            .filter_map(|import| self.path_for_import(import)),
                    );
                    if let Some(missing) = others.iter().find(|import| !titles.contains_key(**import)) {
                        error = Some(
                            StoryIndexError::Extraction {
                                path: path.to_path_buf(),
                                message: format!(
                                    "docs page references {missing}, which is not an indexed story file"
                                ),
                            }
                            .to_string(),
                        );
                        continue;
                    }
                    let attached = others
                        .first()
                        .and_then(|import| titles.get(import.as_str()))
                        .map(String::as_str);
                    entries.push(IndexEntry::Docs(normalize_docs(
                        raw,
                        &ctx,
                        attached,
                        &options.docs.default_name,
                    )));
                }
            }
        }

        Resolved {
            entries,
            warnings,
            depends_on,
            error,
        }
    }

    fn apply(&mut self, specifier: usize, path: &Path, resolved: Resolved) {
        let previous = self.files[specifier]
            .get(path)
            .map(|record| record.depends_on.clone())
            .unwrap_or_default();
        self.unlink(path, &previous);
        for target in &resolved.depends_on {
            self.dependents
                .entry(target.clone())
                .or_default()
                .insert(path.to_path_buf());
        }

        let Some(record) = self.files[specifier].get_mut(path) else {
            return;
        };
        record.depends_on = resolved.depends_on;
        match resolved.error {
            Some(error) => {
                warn!("{error}");
                record.error = Some(error);
            }
            None => {
                record.entries = resolved.entries;
                record.warnings = resolved.warnings;
                record.error = None;
                record.state = FileState::Indexed;
            }
        }
    }

    fn path_for_import(&self, import_path: &str) -> Option<PathBuf> {
        if import_path.starts_with("./") || import_path.starts_with("../") {
            Some(lexical_normalize(&self.working_dir.join(import_path)))
        } else if Path::new(import_path).is_absolute() {
            Some(PathBuf::from(import_path))
        } else {
            None
        }
    }

    fn tracked_under(&self, dir: &Path) -> Vec<PathBuf> {
        self.records()
            .filter(|record| record.path.starts_with(dir))
            .map(|record| record.path.clone())
            .collect()
    }

    fn locate(&self, path: &Path) -> Option<usize> {
        self.files.iter().position(|files| files.contains_key(path))
    }

    fn record_mut(&mut self, path: &Path) -> Option<&mut FileRecord> {
        let index = self.locate(path)?;
        self.files[index].get_mut(path)
    }

    fn remove(&mut self, path: &Path) -> bool {
        let Some(index) = self.locate(path) else {
            return false;
        };
        let Some(record) = self.files[index].remove(path) else {
            return false;
        };
        self.unlink(path, &record.depends_on);
        debug!("Dropped {} from the index cache", path.display());
        true
    }

    fn unlink(&mut self, path: &Path, targets: &BTreeSet<PathBuf>) {
        for target in targets {
            if let Some(set) = self.dependents.get_mut(target) {
                set.remove(path);
                if set.is_empty() {
                    self.dependents.remove(target);
                }
            }
        }
    }

    /// Walks the dependents graph from `path`, marking indexed records
    /// `Invalidated` without forcing re-extraction.
    fn invalidate_dependents(&mut self, path: &Path) -> bool {
        let mut visited: HashSet<PathBuf> = HashSet::from([path.to_path_buf()]);
        let mut queue = self.dependents_of(path);
        let mut touched = false;
        while let Some(next) = queue.pop() {
            if !visited.insert(next.clone()) {
                continue;
            }
            if let Some(record) = self.record_mut(&next) {
                if record.state == FileState::Indexed {
                    record.state = FileState::Invalidated;
                }
                touched = true;
            }
            queue.extend(self.dependents_of(&next));
        }
        touched
    }
}

async fn extract(job: &ExtractJob) -> Extraction {
    let bytes = match tokio::fs::read(&job.path).await {
        Ok(bytes) => bytes,
        Err(e) => return Extraction::Failed(e.to_string()),
    };
    let fingerprint = fingerprint(&bytes);
    if job.reusable_fingerprint.as_deref() == Some(fingerprint.as_str()) {
        return Extraction::Unchanged;
    }
    let Some(indexer) = &job.indexer else {
        debug!("No indexer matches {}, skipping", job.path.display());
        return Extraction::Fresh {
            fingerprint,
            raw: Vec::new(),
        };
    };
    match indexer.create_index(&job.path, &job.options).await {
        Ok(raw) => Extraction::Fresh { fingerprint, raw },
        Err(e) => Extraction::Failed(format!("{e:#}")),
    }
}

fn join_failure(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("indexer task failed: {err}");
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("indexer panicked: {message}")
}

/// Hex SHA-256 of a file's bytes.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
