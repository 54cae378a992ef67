//! Persisted set of already-processed source identifiers
//!
//! Stored as a flat JSON list of strings in insertion order and replaced
//! atomically (temp file + rename) once per batch.

use crate::errors::{HarvestError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedSet {
    order: Vec<String>,
    index: HashSet<String>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Returns false when the id was already present
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.order.push(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }
}

impl FromIterator<String> for ProcessedSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, message: impl Into<String>) -> HarvestError {
        HarvestError::StateError {
            path: self.path.display().to_string(),
            message: message.into(),
        }
    }

    /// Missing file means nothing processed yet
    pub async fn load(&self) -> Result<ProcessedSet> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ProcessedSet::new()),
            Err(e) => return Err(e.into()),
        };

        let ids: Vec<String> =
            serde_json::from_slice(&raw).map_err(|e| self.error(format!("corrupt state: {}", e)))?;
        Ok(ids.into_iter().collect())
    }

    pub async fn save(&self, set: &ProcessedSet) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(set.ids())
            .map_err(|e| self.error(format!("serialize failed: {}", e)))?;

        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), ids = set.len(), "Processed set saved");
        Ok(())
    }
}
