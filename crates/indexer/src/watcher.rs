use crate::config::ProjectConfig;
use crate::generator::StoryIndexGenerator;
use crate::{Result, StoryIndexError};
use log::{debug, info, warn};
use notify::event::EventKind;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What one filesystem path change means for the index.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchAction {
    Invalidate { path: PathBuf, removed: bool },
    PreviewChanged,
}

/// Feeds filesystem changes under the stories directories and the config
/// directory into a [`StoryIndexGenerator`]. Dropping it stops watching.
pub struct StoryWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl StoryWatcher {
    /// Must be called inside a tokio runtime.
    pub fn start(generator: StoryIndexGenerator, config: Option<ProjectConfig>) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.blocking_send(res);
            },
            NotifyConfig::default(),
        )
        .map_err(|e| StoryIndexError::Watch(format!("watcher init failed: {e}")))?;

        let mut watched = 0usize;
        for specifier in generator.specifiers() {
            match watcher.watch(&specifier.directory, RecursiveMode::Recursive) {
                Ok(()) => watched += 1,
                Err(err) => warn!("failed to watch {}: {err}", specifier.directory.display()),
            }
        }
        if let Some(config) = &config {
            if let Err(err) = watcher.watch(config.config_dir(), RecursiveMode::NonRecursive) {
                warn!("failed to watch {}: {err}", config.config_dir().display());
            }
        }
        info!("Watching {watched} stories directories");

        let task = spawn_watch_loop(generator, config, event_rx);
        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for StoryWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn spawn_watch_loop(
    generator: StoryIndexGenerator,
    mut config: Option<ProjectConfig>,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    warn!("watch error: {err}");
                    continue;
                }
            };
            for action in classify(&event, config.as_ref()) {
                match action {
                    WatchAction::Invalidate { path, removed } => {
                        if generator.invalidate(&path, removed).await {
                            debug!("Invalidated {} (removed: {removed})", path.display());
                        }
                    }
                    WatchAction::PreviewChanged => {
                        let Some(config) = config.as_mut() else {
                            continue;
                        };
                        match config.reload_preview() {
                            Ok(()) => {
                                info!("Preview config changed, re-indexing every file");
                                generator.reload_build_options(config.build_options()).await;
                            }
                            Err(err) => {
                                warn!("Failed to reload preview config: {err}");
                                generator.invalidate_all().await;
                            }
                        }
                    }
                }
            }
        }
    })
}

fn classify(event: &Event, config: Option<&ProjectConfig>) -> Vec<WatchAction> {
    if matches!(event.kind, EventKind::Access(_)) {
        return Vec::new();
    }
    let mut actions = Vec::new();
    for path in &event.paths {
        let action = if config.is_some_and(|config| config.is_preview_file(path)) {
            WatchAction::PreviewChanged
        } else {
            WatchAction::Invalidate {
                path: path.clone(),
                removed: !path_exists(path),
            }
        };
        if !actions.contains(&action) {
            actions.push(action);
        }
    }
    actions
}

fn path_exists(path: &Path) -> bool {
    path.try_exists().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[PathBuf]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(path.clone());
        }
        event
    }

    #[test]
    fn existing_paths_are_changes_and_missing_ones_removals() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("A.stories.js");
        std::fs::write(&present, "export default {};").unwrap();
        let gone = temp.path().join("B.stories.js");

        let actions = classify(
            &event(
                EventKind::Modify(ModifyKind::Any),
                &[present.clone(), gone.clone()],
            ),
            None,
        );
        assert_eq!(
            actions,
            vec![
                WatchAction::Invalidate {
                    path: present,
                    removed: false
                },
                WatchAction::Invalidate {
                    path: gone,
                    removed: true
                },
            ]
        );
    }

    #[test]
    fn access_events_are_ignored() {
        let temp = TempDir::new().unwrap();
        let actions = classify(
            &event(
                EventKind::Access(AccessKind::Any),
                &[temp.path().join("A.stories.js")],
            ),
            None,
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn preview_files_collapse_into_one_reload() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".storybook");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("main.toml"), "stories = [\"../src\"]").unwrap();
        let config = ProjectConfig::load(Path::new(".storybook"), temp.path()).unwrap();

        let actions = classify(
            &event(
                EventKind::Create(CreateKind::File),
                &[config_dir.join("preview.toml"), config_dir.join("preview-head.html")],
            ),
            Some(&config),
        );
        assert_eq!(actions, vec![WatchAction::PreviewChanged]);

        let actions = classify(
            &event(
                EventKind::Remove(RemoveKind::File),
                &[config_dir.join("main.toml")],
            ),
            Some(&config),
        );
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], WatchAction::Invalidate { .. }));
    }
}
