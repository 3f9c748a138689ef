//! Identifier and title derivation shared by the normalizer, the docs
//! synthesizer and the built-in indexers.

use heck::ToTitleCase;
use std::path::{Component, Path};

/// Lowercases `value` and collapses every run of non-alphanumeric characters
/// into a single `-`. Leading and trailing separators are dropped, so
/// `slug(slug(x)) == slug(x)`.
#[must_use]
pub fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_dash = false;
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// `StoryOne` -> `Story One`, `story_one` -> `Story One`, `Story1` -> `Story 1`.
///
/// Digit runs are words of their own, which heck alone keeps attached.
#[must_use]
pub fn story_name_from_export(export_name: &str) -> String {
    split_digit_runs(export_name).to_title_case()
}

fn split_digit_runs(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let mut previous: Option<char> = None;
    for ch in value.chars() {
        if let Some(prev) = previous {
            let boundary = (prev.is_alphabetic() && ch.is_ascii_digit())
                || (prev.is_ascii_digit() && ch.is_alphabetic());
            if boundary {
                out.push(' ');
            }
        }
        out.push(ch);
        previous = Some(ch);
    }
    out
}

/// Builds the `<kind>--<story>` id from an id namespace (meta id or title)
/// and an export name.
#[must_use]
pub fn story_id(namespace: &str, export_name: &str) -> String {
    format!(
        "{}--{}",
        slug(namespace),
        slug(&story_name_from_export(export_name))
    )
}

/// Id of a docs entry named `name` under `title`.
#[must_use]
pub fn docs_id(namespace: &str, name: &str) -> String {
    format!("{}--{}", slug(namespace), slug(name))
}

/// Derives a title from a path relative to its specifier directory.
///
/// `components/button/Button.stories.tsx` with prefix `Design` becomes
/// `Design/Components/Button`. A trailing `index` segment and a file name that
/// repeats its parent directory are collapsed.
#[must_use]
pub fn title_from_path(relative: &str, title_prefix: Option<&str>) -> String {
    let mut segments: Vec<String> = relative
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_string)
        .collect();

    if let Some(file) = segments.last_mut() {
        if let Some((stem, _)) = file.split_once('.') {
            *file = stem.to_string();
        }
    }
    let stem = segments.last().cloned().unwrap_or_default();

    if segments.len() > 1
        && segments
            .last()
            .is_some_and(|last| last.eq_ignore_ascii_case("index"))
    {
        segments.pop();
    }
    let mut segments: Vec<String> = segments
        .iter()
        .map(|segment| segment.to_title_case())
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.len() > 1 && segments[segments.len() - 1] == segments[segments.len() - 2] {
        segments.pop();
    }

    let mut parts: Vec<String> = title_prefix
        .map(|prefix| {
            prefix
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    parts.extend(segments);

    if parts.is_empty() {
        return stem.to_title_case();
    }
    parts.join("/")
}

/// Ordered union: keeps the first occurrence of every tag.
#[must_use]
pub fn merge_tags(base: &[String], extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(base.len() + extra.len());
    for tag in base.iter().chain(extra) {
        if !merged.contains(tag) {
            merged.push(tag.clone());
        }
    }
    merged
}

/// `./`-prefixed, `/`-separated path of `path` relative to `working_dir`.
/// Paths outside the working directory keep their absolute form.
#[must_use]
pub fn import_path_for(working_dir: &Path, path: &Path) -> String {
    match path.strip_prefix(working_dir) {
        Ok(relative) => format!("./{}", posix(relative)),
        Err(_) => posix(path),
    }
}

pub(crate) fn posix(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        match component {
            Component::RootDir => out.push('/'),
            Component::CurDir => {}
            Component::Prefix(prefix) => out.push_str(&prefix.as_os_str().to_string_lossy()),
            Component::ParentDir | Component::Normal(_) => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(&component.as_os_str().to_string_lossy());
            }
        }
    }
    out
}
