use super::ItemStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use switchyard_common::errors::{AppError, Result};
use switchyard_common::models::KnowledgeItem;
use tracing::debug;

/// JSON array on disk, replaced via temp file + rename
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "items.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ItemStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<KnowledgeItem>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Store file absent, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(AppError::Persistence {
                    message: format!("Failed to read {}: {}", self.path.display(), e),
                })
            }
        };

        serde_json::from_slice(&raw).map_err(|e| AppError::Persistence {
            message: format!("Corrupt store file {}: {}", self.path.display(), e),
        })
    }

    async fn save(&self, items: &[KnowledgeItem]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(items)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), items = items.len(), "Store file replaced");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_common::models::SourceKind;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/wiki.json"));

        let mut item = KnowledgeItem::new("kb-1", "Reset VPN password", "Use the self-service portal.");
        item.refresh_derived(SourceKind::Articles);
        store.save(&[item.clone()]).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, vec![item]);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not a list").unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, AppError::Persistence { .. }));
    }
}
