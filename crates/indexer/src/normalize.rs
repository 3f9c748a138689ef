use crate::entry::{DocsEntry, EntryExtra, RawEntry, StoryEntry};
use crate::naming::{docs_id, merge_tags, story_id, story_name_from_export};
use crate::StoryIndexError;

/// Tag added to MDX docs pages that attach to at least one story file.
pub const ATTACHED_MDX_TAG: &str = "attached-mdx";
/// Tag added to standalone MDX docs pages.
pub const UNATTACHED_MDX_TAG: &str = "unattached-mdx";

const DEFAULT_SUBTYPE: &str = "story";
const META_EXPORT: &str = "default";

/// What the normalizer knows about the file an entry came from.
#[derive(Debug, Clone)]
pub struct FileContext {
    pub import_path: String,
    /// Title derived from the file's location under its specifier.
    pub path_title: String,
    /// Tags applied to every entry of the file, ahead of indexer tags.
    pub meta_tags: Vec<String>,
}

/// Completes a raw story entry.
///
/// Returns `None` (and records why in `warnings`) for entries that can never
/// be stories: the `default` export and entries without an export name.
pub fn normalize_story(
    raw: &RawEntry,
    ctx: &FileContext,
    warnings: &mut Vec<String>,
) -> Option<StoryEntry> {
    let Some(export_name) = raw.export_name.as_deref() else {
        warnings.push(format!(
            "{}: story entry without an export name was skipped",
            ctx.import_path
        ));
        return None;
    };
    if export_name == META_EXPORT {
        warnings.push(format!(
            "{}: the default export is reserved for meta and was skipped",
            ctx.import_path
        ));
        return None;
    }

    let title = raw.title.clone().unwrap_or_else(|| ctx.path_title.clone());
    let id = raw.id.clone().unwrap_or_else(|| {
        story_id(raw.meta_id.as_deref().unwrap_or(&title), export_name)
    });
    let name = raw
        .name
        .clone()
        .unwrap_or_else(|| story_name_from_export(export_name));
    let tags = merge_tags(&ctx.meta_tags, raw.tags.as_deref().unwrap_or_default());

    if raw.component_path.is_none() {
        if let Some(stats) = &raw.stats {
            if !stats.render && !stats.story_fn {
                warnings.push(
                    StoryIndexError::MissingComponentAnnotation { id: id.clone() }.to_string(),
                );
            }
        }
    }

    Some(StoryEntry {
        id,
        title,
        name,
        import_path: import_path_of(raw, ctx),
        component_path: raw.component_path.clone(),
        tags,
        export_name: export_name.to_string(),
        meta_id: raw.meta_id.clone(),
        subtype: raw
            .subtype
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBTYPE.to_string()),
        extra: raw.stats.clone().map(|stats| EntryExtra { stats }),
    })
}

/// Completes a raw docs entry produced by an indexer.
///
/// `attached_title` is the title of the first story file the page references,
/// used when the page declares no title itself.
#[must_use]
pub fn normalize_docs(
    raw: &RawEntry,
    ctx: &FileContext,
    attached_title: Option<&str>,
    default_name: &str,
) -> DocsEntry {
    let import_path = import_path_of(raw, ctx);
    let title = raw
        .title
        .clone()
        .or_else(|| attached_title.map(str::to_string))
        .unwrap_or_else(|| ctx.path_title.clone());
    let name = raw.name.clone().unwrap_or_else(|| default_name.to_string());
    let id = raw
        .id
        .clone()
        .unwrap_or_else(|| docs_id(raw.meta_id.as_deref().unwrap_or(&title), &name));

    let mut stories_imports: Vec<String> = Vec::with_capacity(raw.stories_imports.len());
    for path in &raw.stories_imports {
        if *path != import_path && !stories_imports.contains(path) {
            stories_imports.push(path.clone());
        }
    }

    let mut tags = merge_tags(&ctx.meta_tags, raw.tags.as_deref().unwrap_or_default());
    if import_path.ends_with(".mdx") {
        let marker = if stories_imports.is_empty() {
            UNATTACHED_MDX_TAG
        } else {
            ATTACHED_MDX_TAG
        };
        tags = merge_tags(&tags, &[marker.to_string()]);
    }

    DocsEntry {
        id,
        title,
        name,
        import_path,
        stories_imports,
        tags,
        synthesized: false,
    }
}

fn import_path_of(raw: &RawEntry, ctx: &FileContext) -> String {
    if raw.import_path.is_empty() {
        ctx.import_path.clone()
    } else {
        raw.import_path.clone()
    }
}
