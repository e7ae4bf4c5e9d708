//! Concept database lookup for the partial tier.

use std::{collections::HashMap, path::Path};

use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    config::ConfidenceConfig,
    error::LoadError,
    nlp::{words, Category, Entities, ExtractionResult, Tier},
};

/// File name of the serialized concept database inside the concept directory.
pub const CONCEPT_DB_FILE: &str = "concept_db.json";

/// Precomputed name -> concept identifier mapping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConceptDb {
    /// Lowercased surface name -> concept identifier.
    pub names: HashMap<String, String>,
    /// Concept identifier -> preferred display name.
    #[serde(default)]
    pub preferred: HashMap<String, String>,
}

impl ConceptDb {
    fn read(dir: &Path) -> Result<Self, LoadError> {
        let path = dir.join(CONCEPT_DB_FILE);
        if !path.exists() {
            return Err(LoadError::MissingPath(path));
        }
        let raw = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let mut db: ConceptDb =
            serde_json::from_str(&raw).map_err(|source| LoadError::Parse { path, source })?;
        db.names = db
            .names
            .into_iter()
            .map(|(name, id)| (name.to_lowercase(), id))
            .collect();
        Ok(db)
    }
}

/// Lazily loaded concept database. Loading happens at most once per store;
/// share one store through an `Arc` to get process-wide single loading.
#[derive(Debug, Default)]
pub struct ConceptStore {
    db: OnceCell<ConceptDb>,
    confidence: ConfidenceConfig,
}

impl ConceptStore {
    pub fn new(confidence: ConfidenceConfig) -> Self {
        Self {
            db: OnceCell::new(),
            confidence,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.db.get().is_some()
    }

    /// Number of known surface names, zero until loaded.
    pub fn concept_count(&self) -> usize {
        self.db.get().map(|db| db.names.len()).unwrap_or(0)
    }

    /// Load `concept_db.json` from `dir`. A no-op once loaded.
    pub fn try_load(&self, dir: &Path) -> Result<(), LoadError> {
        if self.is_loaded() {
            return Ok(());
        }
        self.db.get_or_try_init(|| ConceptDb::read(dir))?;
        info!(dir = %dir.display(), concepts = self.concept_count(), "concept database loaded");
        Ok(())
    }

    /// Boolean form of [`Self::try_load`]; failures are logged and leave the store unloaded.
    pub fn load(&self, dir: &Path) -> bool {
        match self.try_load(dir) {
            Ok(()) => true,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "concept database load failed");
                false
            }
        }
    }

    /// Word-level lookup. `None` when the database has not been loaded.
    ///
    /// The database carries no semantic types, so every hit is filed under
    /// conditions.
    pub fn extract(&self, text: &str) -> Option<ExtractionResult> {
        let db = self.db.get()?;
        let mut entities = Entities::default();
        for word in words(text) {
            let Some(concept_id) = db.names.get(&word) else {
                continue;
            };
            let name = db.preferred.get(concept_id).cloned().unwrap_or(word);
            entities.insert(Category::Conditions, name);
        }
        Some(ExtractionResult::new(
            text,
            entities,
            self.confidence.partial,
            Tier::Partial,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_db(dir: &Path) {
        std::fs::write(
            dir.join(CONCEPT_DB_FILE),
            r#"{"names": {"Diabetes": "C0011849", "asthma": "C0004096"},
                "preferred": {"C0011849": "Diabetes Mellitus"}}"#,
        )
        .unwrap();
    }

    #[test]
    fn extract_is_absent_until_loaded() {
        let store = ConceptStore::default();
        assert!(store.extract("diabetes").is_none());
    }

    #[test]
    fn missing_file_leaves_store_unloaded_and_retry_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConceptStore::default();
        assert!(!store.load(dir.path()));
        assert!(!store.is_loaded());

        write_db(dir.path());
        assert!(store.load(dir.path()));
        assert!(store.is_loaded());
        assert_eq!(store.concept_count(), 2);
    }

    #[test]
    fn load_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_db(dir.path());
        let store = ConceptStore::default();
        assert!(store.load(dir.path()));
        std::fs::remove_file(dir.path().join(CONCEPT_DB_FILE)).unwrap();
        assert!(store.load(dir.path()));
    }

    #[test]
    fn corrupt_file_is_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONCEPT_DB_FILE), "{not json").unwrap();
        let store = ConceptStore::default();
        let err = store.try_load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::FaultKind::LoadFailure);
    }

    #[test]
    fn words_map_to_preferred_names_under_conditions() {
        let dir = tempfile::tempdir().unwrap();
        write_db(dir.path());
        let store = ConceptStore::default();
        store.try_load(dir.path()).unwrap();

        let result = store.extract("Diabetes and asthma, unknownword.").unwrap();
        assert_eq!(result.method, Tier::Partial);
        assert!((result.confidence - 0.85).abs() < 1e-9);
        assert_eq!(
            result.entities.conditions.iter().collect::<Vec<_>>(),
            vec!["Diabetes Mellitus", "asthma"]
        );
        assert!(result.entities.medications.is_empty());
    }
}
