use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoryIndexError>;

#[derive(Error, Debug)]
pub enum StoryIndexError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A configured stories directory does not exist.
    #[error("Stories directory does not exist: {} (specifier {specifier})", .directory.display())]
    Specifier { directory: PathBuf, specifier: String },

    #[error("Invalid stories pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// One file's indexer failed. Recorded on the file, never fatal for the build.
    #[error("Unable to index {}: {message}", .path.display())]
    Extraction { path: PathBuf, message: String },

    /// Two entries resolved to the same id. Fatal for the whole assembly.
    #[error(
        "Duplicate stories with id: {id}\n  first:  {first_import_path}\n  second: {second_import_path}"
    )]
    DuplicateEntry {
        id: String,
        first_import_path: String,
        second_import_path: String,
    },

    #[error("Duplicate story name \"{name}\" under title \"{title}\" (ids {first_id} and {second_id})")]
    DuplicateStoryName {
        title: String,
        name: String,
        first_id: String,
        second_id: String,
    },

    #[error("Story {id} has no component annotation and no render function")]
    MissingComponentAnnotation { id: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Watcher error: {0}")]
    Watch(String),

    #[error("{0}")]
    Other(String),
}
