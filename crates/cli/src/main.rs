use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use story_index_cli::serve_http;
use story_indexer::{
    read_index_json, write_index_json, IndexEntry, IndexSummary, IndexerRegistry, ProjectConfig,
    StoryIndex, StoryIndexGenerator, StoryWatcher, INDEX_FILE_NAME,
};

#[derive(Parser)]
#[command(name = "story-index")]
#[command(about = "Story index generator for component workshops", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Directory holding main.toml and preview.toml, relative to the working dir
    #[arg(long, global = true, default_value = ".storybook")]
    config_dir: PathBuf,

    /// Project root (defaults to current directory)
    #[arg(long, global = true)]
    working_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve /index.json and keep it fresh while files change
    Serve(ServeArgs),

    /// Write index.json once into an output directory
    Build(BuildArgs),

    /// Print the assembled index summary
    Inspect(InspectArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Bind address, e.g. 127.0.0.1:6006
    #[arg(long, default_value = "127.0.0.1:6006")]
    bind: String,

    /// Do not watch the filesystem for changes
    #[arg(long)]
    no_watch: bool,
}

#[derive(Args)]
struct BuildArgs {
    /// Directory receiving index.json
    #[arg(long, default_value = "storybook-static")]
    output_dir: PathBuf,
}

#[derive(Args)]
struct InspectArgs {
    /// Output JSON format
    #[arg(long)]
    json: bool,

    /// Read a previously built index.json from this directory instead of indexing
    #[arg(long, value_name = "DIR")]
    from: Option<PathBuf>,
}

#[derive(Serialize)]
struct InspectOutput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    generation: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a IndexSummary>,
    entries: Vec<InspectEntry<'a>>,
}

#[derive(Serialize)]
struct InspectEntry<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    entry_type: &'static str,
    title: &'a str,
    name: &'a str,
    import_path: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    if matches!(&cli.command, Commands::Inspect(args) if args.json) {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let working_dir = match &cli.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let working_dir = std::fs::canonicalize(&working_dir)
        .with_context(|| format!("Working directory {} not found", working_dir.display()))?;
    if let Commands::Inspect(InspectArgs {
        json,
        from: Some(dir),
    }) = &cli.command
    {
        return run_inspect_artifact(&working_dir.join(dir), *json).await;
    }
    let config = ProjectConfig::load(&cli.config_dir, &working_dir)
        .with_context(|| format!("Failed to load config from {}", cli.config_dir.display()))?;
    let generator = open_generator(&working_dir, &config).await?;

    match cli.command {
        Commands::Serve(args) => run_serve(args, generator, config).await?,
        Commands::Build(args) => run_build(args, &working_dir, generator).await?,
        Commands::Inspect(args) => run_inspect(args, generator).await?,
    }
    Ok(())
}

async fn open_generator(
    working_dir: &Path,
    config: &ProjectConfig,
) -> Result<StoryIndexGenerator> {
    let generator = StoryIndexGenerator::new(
        working_dir,
        &config.specifiers(),
        IndexerRegistry::with_builtins(),
        config.generator_options(),
    )?;
    generator
        .initialize()
        .await
        .context("Failed to expand stories specifiers")?;
    Ok(generator)
}

async fn run_serve(
    args: ServeArgs,
    generator: StoryIndexGenerator,
    config: ProjectConfig,
) -> Result<()> {
    // Warm the cache; a broken index is reported per request.
    if let Err(err) = generator.get_index().await {
        log::warn!("Initial index failed: {err}");
    }
    let _watcher = if args.no_watch {
        None
    } else {
        Some(StoryWatcher::start(generator.clone(), Some(config))?)
    };
    serve_http(generator, &args.bind).await
}

async fn run_build(
    args: BuildArgs,
    working_dir: &Path,
    generator: StoryIndexGenerator,
) -> Result<()> {
    let snapshot = generator.get_index().await?;
    for error in &snapshot.summary.errors {
        log::warn!("{}: {}", error.import_path, error.message);
    }
    let output_dir = working_dir.join(&args.output_dir);
    let path = write_index_json(&snapshot.index, &output_dir)
        .await
        .with_context(|| format!("Failed to write {}", output_dir.display()))?;
    print_stdout(&format!(
        "Wrote {} entries to {}",
        snapshot.summary.total,
        path.display()
    ))
}

fn inspect_entries(index: &StoryIndex) -> Vec<InspectEntry<'_>> {
    index
        .entries
        .values()
        .map(|entry| InspectEntry {
            id: entry.id(),
            entry_type: match entry {
                IndexEntry::Story(_) => "story",
                IndexEntry::Docs(_) => "docs",
            },
            title: entry.title(),
            name: entry.name(),
            import_path: entry.import_path(),
        })
        .collect()
}

fn entry_lines(entries: &[InspectEntry<'_>], text: &mut String) {
    for entry in entries {
        text.push_str(&format!(
            "{:<5} {}  {} / {}  ({})\n",
            entry.entry_type, entry.id, entry.title, entry.name, entry.import_path
        ));
    }
}

async fn run_inspect_artifact(output_dir: &Path, json: bool) -> Result<()> {
    let index = read_index_json(output_dir)
        .await
        .with_context(|| format!("Failed to read {}", output_dir.display()))?
        .with_context(|| {
            format!(
                "No {INDEX_FILE_NAME} in {}; run `story-index build` first",
                output_dir.display()
            )
        })?;
    let entries = inspect_entries(&index);

    if json {
        let output = InspectOutput {
            generation: None,
            summary: None,
            entries,
        };
        return print_stdout(&serde_json::to_string_pretty(&output)?);
    }

    let mut text = format!(
        "{} entries (format v{}) in {}\n",
        entries.len(),
        index.v,
        output_dir.join(INDEX_FILE_NAME).display()
    );
    entry_lines(&entries, &mut text);
    print_stdout(text.trim_end())
}

async fn run_inspect(args: InspectArgs, generator: StoryIndexGenerator) -> Result<()> {
    let snapshot = generator.get_index().await?;
    let entries = inspect_entries(&snapshot.index);

    if args.json {
        let output = InspectOutput {
            generation: Some(snapshot.generation),
            summary: Some(&snapshot.summary),
            entries,
        };
        return print_stdout(&serde_json::to_string_pretty(&output)?);
    }

    let summary = &snapshot.summary;
    let mut text = format!(
        "{} stories, {} docs from {} files ({} errors, {} stale)\n",
        summary.stories,
        summary.docs,
        summary.files,
        summary.errors.len(),
        summary.stale
    );
    entry_lines(&entries, &mut text);
    for error in &summary.errors {
        text.push_str(&format!("error {}: {}\n", error.import_path, error.message));
    }
    print_stdout(text.trim_end())
}

fn print_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}
