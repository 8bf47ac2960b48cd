//! Filesystem-backed coordination store.
//!
//! Layout: `<base>/<session_id>/<key>.json`, each file holding an
//! [`Envelope`]. Writes go to a temporary sibling, are fsynced, then renamed
//! over the target so readers never observe a torn entry.

use super::{validate_key, validate_session_id, CoordinationStore, Envelope};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const EXTENSION: &str = ".json";
const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(session_id)
    }

    /// The suffix is appended to the last segment, never substituted for an
    /// extension already present in the key.
    fn entry_path(&self, session_id: &str, key: &str) -> PathBuf {
        let mut path = self.session_dir(session_id);
        let (dirs, file) = match key.rsplit_once('/') {
            Some((dirs, file)) => (Some(dirs), file),
            None => (None, key),
        };
        if let Some(dirs) = dirs {
            for segment in dirs.split('/') {
                path.push(segment);
            }
        }
        path.push(format!("{}{}", file, EXTENSION));
        path
    }
}

fn storage_error(action: &str, path: &Path, err: std::io::Error) -> AppError {
    AppError::Storage(format!("Failed to {} {}: {}", action, path.display(), err))
}

#[async_trait]
impl CoordinationStore for FileStore {
    async fn put(&self, session_id: &str, key: &str, value: &Value) -> Result<()> {
        validate_session_id(session_id)?;
        validate_key(key)?;

        let path = self.entry_path(session_id, key);
        let parent = path
            .parent()
            .ok_or_else(|| AppError::Storage(format!("No parent for {}", path.display())))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| storage_error("create", parent, e))?;

        let envelope = Envelope::new(key, value.clone());
        let bytes = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| AppError::Storage(format!("Failed to serialize '{}': {}", key, e)))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("entry.json");
        let tmp_path = parent.join(format!(
            ".{}.{}{}",
            file_name,
            uuid::Uuid::new_v4(),
            TEMP_SUFFIX
        ));

        let write = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &path).await
        };

        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(storage_error("write", &path, e));
        }

        Ok(())
    }

    async fn get(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        validate_session_id(session_id)?;
        validate_key(key)?;

        let path = self.entry_path(session_id, key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error("read", &path, e)),
        };

        let envelope: Envelope = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::Storage(format!("Malformed entry {}: {}", path.display(), e))
        })?;
        Ok(Some(envelope.data))
    }

    async fn list_keys(&self, session_id: &str, prefix: &str) -> Result<Vec<String>> {
        validate_session_id(session_id)?;

        let root = self.session_dir(session_id);
        let mut keys = Vec::new();
        let mut pending = vec![(root.clone(), String::new())];

        while let Some((dir, key_prefix)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(storage_error("list", &dir, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| storage_error("list", &dir, e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| storage_error("inspect", &entry.path(), e))?;

                if file_type.is_dir() {
                    pending.push((entry.path(), format!("{}{}/", key_prefix, name)));
                } else if let Some(stem) = name.strip_suffix(EXTENSION) {
                    let key = format!("{}{}", key_prefix, stem);
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn remove(&self, session_id: &str, key: &str) -> Result<()> {
        validate_session_id(session_id)?;
        validate_key(key)?;

        let path = self.entry_path(session_id, key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(storage_error("remove", &path, e)),
        }

        // Prune directories left empty, up to and including the session's.
        let root = self.base_dir.as_path();
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == root || tokio::fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;

        let dir = self.session_dir(session_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("clear", &dir, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_file_layout_and_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store
            .put("s1", "research/research_1", &json!({"summary": "x"}))
            .await
            .unwrap();

        let path = dir.path().join("s1").join("research").join("research_1.json");
        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["key"], "research/research_1");
        assert_eq!(raw["data"]["summary"], "x");
        assert!(raw["saved_at"].is_string());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.put("s1", "plan", &json!(1)).await.unwrap();
        store.put("s1", "plan", &json!(2)).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("s1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["plan.json".to_string()]);
        assert_eq!(store.get("s1", "plan").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_dotted_key_keeps_its_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.put("s1", "notes/a", &json!("plain")).await.unwrap();
        store.put("s1", "notes/a.b", &json!("dotted")).await.unwrap();

        assert!(dir.path().join("s1/notes/a.json").is_file());
        assert!(dir.path().join("s1/notes/a.b.json").is_file());
        assert_eq!(store.get("s1", "notes/a").await.unwrap(), Some(json!("plain")));
    }

    #[tokio::test]
    async fn test_remove_prunes_empty_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store.put("s1", "research/research_a", &json!(1)).await.unwrap();
        store.remove("s1", "research/research_a").await.unwrap();
        store.remove("s1", "research/research_a").await.unwrap();

        assert!(!dir.path().join("s1").exists());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        assert!(store.put("s1", "../escape", &json!(1)).await.is_err());
        assert!(store.put("../s1", "plan", &json!(1)).await.is_err());
    }
}
