use crate::entry::StoryIndex;
use crate::Result;
use std::path::{Path, PathBuf};

pub const INDEX_FILE_NAME: &str = "index.json";

/// The serialized `index.json` body, shared by the HTTP route and the static
/// build so both are byte-identical.
pub fn index_json_bytes(index: &StoryIndex) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(index)?)
}

/// Writes `<output_dir>/index.json` through a temp file and a rename.
pub async fn write_index_json(index: &StoryIndex, output_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(INDEX_FILE_NAME);
    let bytes = index_json_bytes(index)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(path)
}

pub async fn read_index_json(output_dir: &Path) -> Result<Option<StoryIndex>> {
    let path = output_dir.join(INDEX_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = tokio::fs::read(&path).await?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{IndexEntry, StoryEntry};
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn written_file_matches_served_body() {
        let mut entries = IndexMap::new();
        entries.insert(
            "a--story-one".to_string(),
            IndexEntry::Story(StoryEntry {
                id: "a--story-one".into(),
                title: "A".into(),
                name: "Story One".into(),
                import_path: "./src/A.stories.js".into(),
                component_path: None,
                tags: vec![],
                export_name: "StoryOne".into(),
                meta_id: None,
                subtype: "story".into(),
                extra: None,
            }),
        );
        let index = StoryIndex::new(entries);

        let temp = TempDir::new().unwrap();
        let out = temp.path().join("storybook-static");
        let path = write_index_json(&index, &out).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), index_json_bytes(&index).unwrap());
        assert!(!out.join("index.json.tmp").exists());
        assert_eq!(read_index_json(&out).await.unwrap(), Some(index));
    }

    #[tokio::test]
    async fn missing_artifact_reads_as_none() {
        let temp = TempDir::new().unwrap();
        assert_eq!(read_index_json(temp.path()).await.unwrap(), None);
    }
}
