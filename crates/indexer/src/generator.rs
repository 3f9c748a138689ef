use crate::assembler::{assemble, AssembleOptions, IndexSnapshot};
use crate::cache::{BuildOptions, IndexCache};
use crate::invalidation::{
    IndexInvalidated, InvalidationNotifier, DEFAULT_DEBOUNCE, DEFAULT_MAX_WAIT,
};
use crate::naming::import_path_for;
use crate::registry::IndexerRegistry;
use crate::specifier::{expand, normalize_specifiers, NormalizedSpecifier, StoriesSpecifier};
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub build: BuildOptions,
    pub assemble: AssembleOptions,
    pub debounce: Duration,
    pub max_wait: Duration,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            build: BuildOptions::default(),
            assemble: AssembleOptions::default(),
            debounce: DEFAULT_DEBOUNCE,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

struct GeneratorState {
    cache: IndexCache,
    build: BuildOptions,
    memo: Option<Arc<IndexSnapshot>>,
}

struct GeneratorInner {
    working_dir: PathBuf,
    specifiers: Vec<NormalizedSpecifier>,
    registry: IndexerRegistry,
    assemble: AssembleOptions,
    state: Mutex<GeneratorState>,
    generation: AtomicU64,
    notifier: InvalidationNotifier,
}

/// Shared handle to the story index of one project.
///
/// One lock guards the cache and the memoized snapshot: concurrent
/// `get_index` callers queue behind the assembly in flight and then share its
/// result, and invalidations wait for it to finish.
#[derive(Clone)]
pub struct StoryIndexGenerator {
    inner: Arc<GeneratorInner>,
}

impl StoryIndexGenerator {
    /// Must be called inside a tokio runtime: it starts the notifier task.
    pub fn new(
        working_dir: impl AsRef<Path>,
        specifiers: &[StoriesSpecifier],
        registry: IndexerRegistry,
        options: GeneratorOptions,
    ) -> Result<Self> {
        let working_dir = working_dir.as_ref().to_path_buf();
        let specifiers = normalize_specifiers(specifiers, &working_dir)?;
        let cache = IndexCache::new(working_dir.clone(), specifiers.clone());
        Ok(Self {
            inner: Arc::new(GeneratorInner {
                working_dir,
                specifiers,
                registry,
                assemble: options.assemble,
                state: Mutex::new(GeneratorState {
                    cache,
                    build: options.build,
                    memo: None,
                }),
                generation: AtomicU64::new(0),
                notifier: InvalidationNotifier::start(options.debounce, options.max_wait),
            }),
        })
    }

    /// Expands every specifier and tracks the matches. Returns the number of
    /// files tracked. A missing stories directory is fatal.
    pub async fn initialize(&self) -> Result<usize> {
        let matches = expand(&self.inner.specifiers).await?;
        let mut state = self.inner.state.lock().await;
        let mut tracked = 0usize;
        for found in matches {
            if state.cache.track(found.specifier, found.path) {
                tracked += 1;
            }
        }
        state.memo = None;
        log::info!(
            "Tracking {tracked} story files from {} specifiers",
            self.inner.specifiers.len()
        );
        Ok(tracked)
    }

    pub async fn get_index(&self) -> Result<Arc<IndexSnapshot>> {
        let mut guard = self.inner.state.lock().await;
        if let Some(snapshot) = &guard.memo {
            return Ok(snapshot.clone());
        }

        let started = Instant::now();
        let state = &mut *guard;
        let pass = state
            .cache
            .ensure_indexed(&self.inner.registry, &state.build)
            .await;
        let generation = self.inner.generation.load(Ordering::SeqCst) + 1;
        let mut snapshot = assemble(&state.cache, &self.inner.assemble, generation)?;
        self.inner.generation.store(generation, Ordering::SeqCst);
        snapshot.summary.time_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        log::info!(
            "Index generation {generation}: {} stories, {} docs from {} files in {}ms \
             ({} extracted, {} reused, {} failed)",
            snapshot.summary.stories,
            snapshot.summary.docs,
            snapshot.summary.files,
            snapshot.summary.time_ms,
            pass.extracted,
            pass.reused,
            pass.failed
        );

        let snapshot = Arc::new(snapshot);
        state.memo = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Reports a change to `path`. Returns whether the cache changed.
    pub async fn invalidate(&self, path: &Path, removed: bool) -> bool {
        let mut state = self.inner.state.lock().await;
        let changed = state.cache.invalidate(path, removed);
        state.memo = None;
        if changed {
            let verb = if removed { "removed" } else { "changed" };
            self.inner.notifier.notify(format!(
                "{} {verb}",
                import_path_for(&self.inner.working_dir, path)
            ));
        }
        changed
    }

    pub async fn invalidate_all(&self) {
        let mut state = self.inner.state.lock().await;
        state.cache.invalidate_all();
        state.memo = None;
        self.inner.notifier.notify("all files invalidated");
    }

    /// Swaps the project-wide build options (tags, docs policy) and
    /// re-indexes every file with them.
    pub async fn reload_build_options(&self, build: BuildOptions) {
        let mut state = self.inner.state.lock().await;
        state.build = build;
        state.cache.invalidate_all();
        state.memo = None;
        self.inner.notifier.notify("preview configuration changed");
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<IndexInvalidated> {
        self.inner.notifier.subscribe()
    }

    /// Generation of the last assembled snapshot, 0 before the first one.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn specifiers(&self) -> &[NormalizedSpecifier] {
        &self.inner.specifiers
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.inner.working_dir
    }
}

impl std::fmt::Debug for StoryIndexGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryIndexGenerator")
            .field("working_dir", &self.inner.working_dir)
            .field("specifiers", &self.inner.specifiers.len())
            .field("registry", &self.inner.registry)
            .field("generation", &self.generation())
            .finish()
    }
}
