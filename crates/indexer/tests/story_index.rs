use async_trait::async_trait;
use pretty_assertions::assert_eq;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use story_indexer::{
    AssembleOptions, Autodocs, BuildOptions, DocsOptions, GeneratorOptions, IndexEntry, Indexer,
    IndexerOptions, IndexerRegistry, RawEntry, StoriesSpecifier, StoryIndexError,
    StoryIndexGenerator, ATTACHED_MDX_TAG,
};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, body: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn specifiers() -> Vec<StoriesSpecifier> {
    vec![
        StoriesSpecifier::new("./src", "**/*.mdx"),
        StoriesSpecifier::new("./src", "**/*.stories.js"),
    ]
}

async fn open(temp: &TempDir, options: GeneratorOptions) -> StoryIndexGenerator {
    let generator = StoryIndexGenerator::new(
        temp.path(),
        &specifiers(),
        IndexerRegistry::with_builtins(),
        options,
    )
    .unwrap();
    generator.initialize().await.unwrap();
    generator
}

fn ids(generator_index: &story_indexer::StoryIndex) -> Vec<&str> {
    generator_index.entries.keys().map(String::as_str).collect()
}

fn docs_options(autodocs: Autodocs) -> GeneratorOptions {
    GeneratorOptions {
        build: BuildOptions {
            docs: DocsOptions {
                autodocs,
                ..DocsOptions::default()
            },
            ..BuildOptions::default()
        },
        ..GeneratorOptions::default()
    }
}

#[tokio::test]
async fn ids_come_from_title_and_export_name() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/A.stories.js",
        "export default { title: 'A' };\nexport const StoryOne = {};\n",
    );
    write(
        temp.path(),
        "src/B.stories.js",
        "export default { title: 'B', id: 'custom-meta-id' };\nexport const StoryThree = {};\n",
    );
    let generator = open(&temp, GeneratorOptions::default()).await;

    let snapshot = generator.get_index().await.unwrap();
    assert_eq!(
        ids(&snapshot.index),
        vec!["a--story-one", "custom-meta-id--story-three"]
    );
    let IndexEntry::Story(story) = &snapshot.index.entries["a--story-one"] else {
        panic!("expected a story entry");
    };
    assert_eq!(story.title, "A");
    assert_eq!(story.name, "Story One");
    assert_eq!(story.import_path, "./src/A.stories.js");
    assert_eq!(snapshot.index.entries["custom-meta-id--story-three"].title(), "B");
}

#[tokio::test]
async fn duplicate_ids_across_files_fail_assembly() {
    let temp = TempDir::new().unwrap();
    let body = "export default { title: 'Shared' };\nexport const Primary = {};\n";
    write(temp.path(), "src/A.stories.js", body);
    write(temp.path(), "src/B.stories.js", body);
    let generator = open(&temp, GeneratorOptions::default()).await;

    match generator.get_index().await {
        Err(StoryIndexError::DuplicateEntry {
            id,
            first_import_path,
            second_import_path,
        }) => {
            assert_eq!(id, "shared--primary");
            assert_eq!(first_import_path, "./src/A.stories.js");
            assert_eq!(second_import_path, "./src/B.stories.js");
        }
        other => panic!("expected DuplicateEntry, got {other:?}"),
    }
    assert_eq!(generator.generation(), 0);

    // Renaming the second file's title resolves the conflict.
    write(
        temp.path(),
        "src/B.stories.js",
        "export default { title: 'Other' };\nexport const Primary = {};\n",
    );
    generator
        .invalidate(&temp.path().join("src/B.stories.js"), false)
        .await;
    let snapshot = generator.get_index().await.unwrap();
    assert_eq!(ids(&snapshot.index), vec!["shared--primary", "other--primary"]);
}

#[tokio::test]
async fn repeated_reads_share_one_snapshot() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/A.stories.js",
        "export default { title: 'A' };\nexport const One = {};\n",
    );
    let generator = open(&temp, GeneratorOptions::default()).await;

    let (first, second, third) = tokio::join!(
        generator.get_index(),
        generator.get_index(),
        generator.get_index()
    );
    let first = first.unwrap();
    assert!(Arc::ptr_eq(&first, &second.unwrap()));
    assert!(Arc::ptr_eq(&first, &third.unwrap()));
    assert_eq!(first.generation, 1);

    let again = generator.get_index().await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(generator.generation(), 1);
}

#[tokio::test]
async fn invalidation_picks_up_edits_additions_and_removals() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/A.stories.js",
        "export default { title: 'A' };\nexport const One = {};\n",
    );
    let generator = open(&temp, GeneratorOptions::default()).await;
    assert_eq!(ids(&generator.get_index().await.unwrap().index), vec!["a--one"]);

    write(
        temp.path(),
        "src/A.stories.js",
        "export default { title: 'A' };\nexport const One = {};\nexport const Two = {};\n",
    );
    assert!(generator.invalidate(&temp.path().join("src/A.stories.js"), false).await);
    let snapshot = generator.get_index().await.unwrap();
    assert_eq!(ids(&snapshot.index), vec!["a--one", "a--two"]);
    assert_eq!(snapshot.generation, 2);

    write(
        temp.path(),
        "src/C.stories.js",
        "export default { title: 'C' };\nexport const Three = {};\n",
    );
    assert!(generator.invalidate(&temp.path().join("src/C.stories.js"), false).await);
    assert_eq!(
        ids(&generator.get_index().await.unwrap().index),
        vec!["a--one", "a--two", "c--three"]
    );

    fs::remove_file(temp.path().join("src/A.stories.js")).unwrap();
    assert!(generator.invalidate(&temp.path().join("src/A.stories.js"), true).await);
    assert_eq!(ids(&generator.get_index().await.unwrap().index), vec!["c--three"]);

    // Paths outside every specifier are ignored.
    write(temp.path(), "src/util.js", "export const x = 1;\n");
    assert!(!generator.invalidate(&temp.path().join("src/util.js"), false).await);
}

#[tokio::test]
async fn tagged_autodocs_precede_their_stories() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/Button.stories.js",
        "export default { title: 'Example/Button', tags: ['autodocs'] };\n\
         export const Primary = {};\nexport const Secondary = { tags: ['beta'] };\n",
    );
    write(
        temp.path(),
        "src/Card.stories.js",
        "export default { title: 'Example/Card' };\nexport const Plain = {};\n",
    );
    let generator = open(&temp, GeneratorOptions::default()).await;

    let snapshot = generator.get_index().await.unwrap();
    assert_eq!(
        ids(&snapshot.index),
        vec![
            "example-button--docs",
            "example-button--primary",
            "example-button--secondary",
            "example-card--plain",
        ]
    );
    let IndexEntry::Docs(docs) = &snapshot.index.entries["example-button--docs"] else {
        panic!("expected a docs entry");
    };
    assert_eq!(docs.name, "docs");
    assert_eq!(docs.import_path, "./src/Button.stories.js");
    assert_eq!(docs.tags, vec!["autodocs", "beta"]);
    assert_eq!(snapshot.summary.docs, 1);
    assert_eq!(snapshot.summary.stories, 3);
}

#[tokio::test]
async fn autodocs_policy_controls_synthesis() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/A.stories.js",
        "export default { title: 'A', tags: ['autodocs'] };\nexport const One = {};\n",
    );
    write(
        temp.path(),
        "src/B.stories.js",
        "export default { title: 'B' };\nexport const Two = {};\n",
    );

    let enabled = open(&temp, docs_options(Autodocs::Enabled)).await;
    assert_eq!(
        ids(&enabled.get_index().await.unwrap().index),
        vec!["a--docs", "a--one", "b--docs", "b--two"]
    );

    let disabled = open(&temp, docs_options(Autodocs::Disabled)).await;
    assert_eq!(
        ids(&disabled.get_index().await.unwrap().index),
        vec!["a--one", "b--two"]
    );
}

#[tokio::test]
async fn attached_mdx_takes_the_title_and_replaces_autodocs() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/Button.stories.js",
        "export default { title: 'Example/Button', tags: ['autodocs'] };\nexport const Primary = {};\n",
    );
    write(
        temp.path(),
        "src/Button.mdx",
        "import * as ButtonStories from './Button.stories';\n\n<Meta of={ButtonStories} />\n",
    );
    let generator = open(&temp, GeneratorOptions::default()).await;

    let snapshot = generator.get_index().await.unwrap();
    assert_eq!(
        ids(&snapshot.index),
        vec!["example-button--docs", "example-button--primary"]
    );
    let IndexEntry::Docs(docs) = &snapshot.index.entries["example-button--docs"] else {
        panic!("expected a docs entry");
    };
    assert_eq!(docs.import_path, "./src/Button.mdx");
    assert_eq!(docs.title, "Example/Button");
    assert_eq!(docs.stories_imports, vec!["./src/Button.stories.js"]);
    assert!(docs.tags.iter().any(|tag| tag == ATTACHED_MDX_TAG));
}

#[tokio::test]
async fn editing_a_story_file_re_resolves_its_docs_pages() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/Button.stories.js",
        "export default { title: 'Example/Button' };\nexport const Primary = {};\n",
    );
    write(
        temp.path(),
        "src/Button.mdx",
        "import * as ButtonStories from './Button.stories';\n\n<Meta of={ButtonStories} />\n",
    );
    let generator = open(&temp, GeneratorOptions::default()).await;
    assert_eq!(
        ids(&generator.get_index().await.unwrap().index),
        vec!["example-button--docs", "example-button--primary"]
    );

    write(
        temp.path(),
        "src/Button.stories.js",
        "export default { title: 'Example/Renamed' };\nexport const Primary = {};\n",
    );
    generator
        .invalidate(&temp.path().join("src/Button.stories.js"), false)
        .await;
    assert_eq!(
        ids(&generator.get_index().await.unwrap().index),
        vec!["example-renamed--docs", "example-renamed--primary"]
    );
}

#[tokio::test]
async fn broken_files_are_reported_without_failing_the_index() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/A.stories.js",
        "export default { title: 'A' };\nexport const One = {};\n",
    );
    write(temp.path(), "src/Broken.stories.js", "export const NoMeta = {};\n");
    write(
        temp.path(),
        "src/Orphan.mdx",
        "import * as Missing from './Missing.stories';\n\n<Meta of={Missing} />\n",
    );
    let generator = open(&temp, GeneratorOptions::default()).await;

    let snapshot = generator.get_index().await.unwrap();
    assert_eq!(ids(&snapshot.index), vec!["a--one"]);
    let failed: Vec<&str> = snapshot
        .summary
        .errors
        .iter()
        .map(|error| error.import_path.as_str())
        .collect();
    assert_eq!(failed, vec!["./src/Orphan.mdx", "./src/Broken.stories.js"]);
    assert_eq!(snapshot.summary.stale, 0);

    // A file that breaks after indexing keeps serving its last entries.
    write(temp.path(), "src/A.stories.js", "export const One = {};\n");
    generator
        .invalidate(&temp.path().join("src/A.stories.js"), false)
        .await;
    let snapshot = generator.get_index().await.unwrap();
    assert_eq!(ids(&snapshot.index), vec!["a--one"]);
    assert_eq!(snapshot.summary.stale, 1);
}

#[tokio::test]
async fn strict_names_reject_repeated_story_names() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/A.stories.js",
        "export default { title: 'A' };\nexport const Primary = {};\n",
    );
    write(
        temp.path(),
        "src/B.stories.js",
        "export default { title: 'A', id: 'a-alt' };\nexport const Primary = {};\n",
    );

    let lenient = open(&temp, GeneratorOptions::default()).await;
    assert_eq!(
        ids(&lenient.get_index().await.unwrap().index),
        vec!["a--primary", "a-alt--primary"]
    );

    let strict = open(
        &temp,
        GeneratorOptions {
            assemble: AssembleOptions {
                strict_story_names: true,
            },
            ..GeneratorOptions::default()
        },
    )
    .await;
    match strict.get_index().await {
        Err(StoryIndexError::DuplicateStoryName { title, name, .. }) => {
            assert_eq!(title, "A");
            assert_eq!(name, "Primary");
        }
        other => panic!("expected DuplicateStoryName, got {other:?}"),
    }
}

#[tokio::test]
async fn project_tags_reach_every_entry() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/A.stories.js",
        "export default { title: 'A', tags: ['autodocs'] };\nexport const One = { tags: ['beta'] };\n",
    );
    let generator = open(&temp, GeneratorOptions::default()).await;
    generator
        .reload_build_options(BuildOptions {
            project_tags: vec!["dev".to_string()],
            ..BuildOptions::default()
        })
        .await;

    let snapshot = generator.get_index().await.unwrap();
    assert_eq!(
        snapshot.index.entries["a--one"].tags(),
        ["dev", "autodocs", "beta"]
    );
    assert_eq!(
        snapshot.index.entries["a--docs"].tags(),
        ["dev", "autodocs", "beta"]
    );
}

#[tokio::test]
async fn subscribers_hear_about_invalidations() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/A.stories.js",
        "export default { title: 'A' };\nexport const One = {};\n",
    );
    let generator = open(
        &temp,
        GeneratorOptions {
            debounce: Duration::from_millis(20),
            max_wait: Duration::from_millis(100),
            ..GeneratorOptions::default()
        },
    )
    .await;
    let mut events = generator.subscribe();

    generator
        .invalidate(&temp.path().join("src/A.stories.js"), false)
        .await;
    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("notification in time")
        .expect("open channel");
    assert_eq!(event.reason, "./src/A.stories.js changed");
    assert!(event.coalesced >= 1);
}

#[tokio::test]
async fn mdx_listed_after_stories_replaces_autodocs_in_place() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "src/Button.stories.js",
        "export default { title: 'Example/Button', tags: ['autodocs'] };\nexport const Primary = {};\n",
    );
    write(
        temp.path(),
        "src/Button.mdx",
        "import * as ButtonStories from './Button.stories';\n\n<Meta of={ButtonStories} />\n",
    );
    let generator = StoryIndexGenerator::new(
        temp.path(),
        &[
            StoriesSpecifier::new("./src", "**/*.stories.js"),
            StoriesSpecifier::new("./src", "**/*.mdx"),
        ],
        IndexerRegistry::with_builtins(),
        GeneratorOptions::default(),
    )
    .unwrap();
    generator.initialize().await.unwrap();

    let snapshot = generator.get_index().await.unwrap();
    assert_eq!(
        ids(&snapshot.index),
        vec!["example-button--docs", "example-button--primary"]
    );
    assert_eq!(
        snapshot.index.entries["example-button--docs"].import_path(),
        "./src/Button.mdx"
    );
    assert_eq!(snapshot.summary.docs, 1);
    assert_eq!(snapshot.summary.total, 2);
}

struct ExplodingIndexer {
    test: Regex,
}

#[async_trait]
impl Indexer for ExplodingIndexer {
    fn name(&self) -> &str {
        "exploding"
    }

    fn test(&self) -> &Regex {
        &self.test
    }

    async fn create_index(
        &self,
        _file_name: &Path,
        _options: &IndexerOptions,
    ) -> anyhow::Result<Vec<RawEntry>> {
        panic!("custom indexer blew up");
    }
}

#[tokio::test]
async fn panicking_indexer_is_reported_per_file() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "src/X.custom.js", "whatever\n");
    write(
        temp.path(),
        "src/A.stories.js",
        "export default { title: 'A' };\nexport const One = {};\n",
    );
    let mut registry = IndexerRegistry::with_builtins();
    registry.prepend(Arc::new(ExplodingIndexer {
        test: Regex::new(r"\.custom\.js$").unwrap(),
    }));
    let generator = StoryIndexGenerator::new(
        temp.path(),
        &[StoriesSpecifier::new("./src", "*.@(custom|stories).js")],
        registry,
        GeneratorOptions::default(),
    )
    .unwrap();
    generator.initialize().await.unwrap();

    let snapshot = generator.get_index().await.unwrap();
    assert_eq!(ids(&snapshot.index), vec!["a--one"]);
    assert_eq!(snapshot.summary.files, 2);
    assert_eq!(snapshot.summary.errors.len(), 1);
    let error = &snapshot.summary.errors[0];
    assert_eq!(error.import_path, "./src/X.custom.js");
    assert!(error.message.contains("custom indexer blew up"), "{}", error.message);
}
