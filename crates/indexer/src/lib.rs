//! # Story Indexer
//!
//! Builds the story index (`index.json`) of a component workshop project.
//!
//! ## Pipeline
//!
//! ```text
//! Stories specifiers
//!     │
//!     ├──> Specifier Matcher (glob expansion)
//!     │      └─> Story files
//!     │
//!     ├──> Indexer Registry (CSF, MDX, custom)
//!     │      └─> Raw entries
//!     │
//!     ├──> Normalizer + Autodocs
//!     │      └─> Per-file entries (cached, fingerprinted)
//!     │
//!     └──> Assembler
//!            └─> { v, entries }
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use story_indexer::{IndexerRegistry, ProjectConfig, StoryIndexGenerator};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let working_dir = Path::new("/path/to/project");
//!     let config = ProjectConfig::load(Path::new(".storybook"), working_dir)?;
//!     let generator = StoryIndexGenerator::new(
//!         working_dir,
//!         &config.specifiers(),
//!         IndexerRegistry::with_builtins(),
//!         config.generator_options(),
//!     )?;
//!     generator.initialize().await?;
//!     let snapshot = generator.get_index().await?;
//!
//!     println!("{} stories, {} docs", snapshot.summary.stories, snapshot.summary.docs);
//!     Ok(())
//! }
//! ```

mod artifact;
mod assembler;
mod cache;
mod config;
mod csf;
mod docs;
mod entry;
mod error;
mod generator;
mod invalidation;
mod lexer;
mod mdx;
mod naming;
mod normalize;
mod registry;
mod specifier;
mod stats;
mod watcher;

pub use artifact::{index_json_bytes, read_index_json, write_index_json, INDEX_FILE_NAME};
pub use assembler::{assemble, AssembleOptions, IndexSnapshot};
pub use cache::{
    fingerprint, BuildOptions, FileRecord, FileState, IndexCache, IndexPass,
    DEFAULT_INDEXER_CONCURRENCY,
};
pub use config::{
    DocsOverride, IndexSettings, MainConfig, PreviewConfig, ProjectConfig, StoriesEntry,
    MAIN_CONFIG_FILE, PREVIEW_CONFIG_FILE,
};
pub use csf::{CsfIndexer, CSF_FILE_PATTERN};
pub use docs::{synthesize_docs, Autodocs, DocsOptions, AUTODOCS_TAG, DEFAULT_DOCS_NAME};
pub use entry::{
    DocsEntry, EntryExtra, EntryType, IndexEntry, RawEntry, StoryEntry, StoryIndex, StoryStats,
    INDEX_FORMAT_VERSION,
};
pub use error::{Result, StoryIndexError};
pub use generator::{GeneratorOptions, StoryIndexGenerator};
pub use invalidation::{IndexInvalidated, InvalidationNotifier, DEFAULT_DEBOUNCE, DEFAULT_MAX_WAIT};
pub use mdx::MdxIndexer;
pub use naming::{
    docs_id, import_path_for, merge_tags, slug, story_id, story_name_from_export, title_from_path,
};
pub use normalize::{
    normalize_docs, normalize_story, FileContext, ATTACHED_MDX_TAG, UNATTACHED_MDX_TAG,
};
pub use registry::{Indexer, IndexerOptions, IndexerRegistry};
pub use specifier::{
    expand, normalize_specifiers, NormalizedSpecifier, SpecifierMatch, StoriesSpecifier,
    DEFAULT_FILES_PATTERN,
};
pub use stats::{FileDiagnostic, IndexSummary};
pub use watcher::StoryWatcher;
