//! Specialist lookup table - exact-key structured entity store
//!
//! Codes are matched case-insensitively and exactly; there is no fuzzy matching.

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Relation from one entity to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    /// Relation type, e.g. "includes", "requires", "conflicts_with"
    pub relation: String,

    /// Code of the related entity
    pub code: String,
}

/// Structured entity addressed by a code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupEntity {
    pub code: String,

    /// Entity type used to group fact sheets, e.g. "role", "transaction"
    pub entity_type: String,

    pub description: String,

    #[serde(default)]
    pub cross_references: Vec<CrossReference>,
}

/// Read access to specialist entities
pub trait EntityLookup: Send + Sync {
    /// Exact case-insensitive match
    fn get_entity(&self, code: &str) -> Result<Option<LookupEntity>>;

    /// Read-only key check used by the classifier's verification stage
    fn contains(&self, code: &str) -> bool {
        matches!(self.get_entity(code), Ok(Some(_)))
    }
}

/// In-memory lookup table keyed by upper-cased code
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entities: HashMap<String, LookupEntity>,
}

fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entities; a repeated code (in any case) is an error
    pub fn from_entities(entities: impl IntoIterator<Item = LookupEntity>) -> Result<Self> {
        let mut table = Self::new();
        for entity in entities {
            table.insert(entity)?;
        }
        Ok(table)
    }

    /// Load a JSON array of entities
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await.map_err(|e| AppError::LookupUnavailable {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let entities: Vec<LookupEntity> = serde_json::from_slice(&raw)?;
        let table = Self::from_entities(entities)?;
        info!(path = %path.display(), entities = table.len(), "Lookup table loaded");
        Ok(table)
    }

    pub fn insert(&mut self, entity: LookupEntity) -> Result<()> {
        let key = normalize(&entity.code);
        if key.is_empty() {
            return Err(AppError::Validation {
                message: "Lookup entity code must not be empty".to_string(),
                field: Some("code".to_string()),
            });
        }
        if self.entities.contains_key(&key) {
            return Err(AppError::Validation {
                message: format!("Duplicate lookup code: {}", entity.code),
                field: Some("code".to_string()),
            });
        }
        self.entities.insert(key, entity);
        Ok(())
    }

    pub fn get(&self, code: &str) -> Option<&LookupEntity> {
        self.entities.get(&normalize(code))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityLookup for LookupTable {
    fn get_entity(&self, code: &str) -> Result<Option<LookupEntity>> {
        Ok(self.get(code).cloned())
    }

    fn contains(&self, code: &str) -> bool {
        self.entities.contains_key(&normalize(code))
    }
}
