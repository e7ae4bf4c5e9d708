//! Full-tier adapter around a heavyweight entity model.
//!
//! The model itself sits behind [`EntityModel`]; the default implementation is
//! [`PackModel`], which reads a model pack directory:
//!
//! ```text
//! ner-pack/
//!   meta.json       {"name": "...", "version": "...", "labels": [...]}
//!   patterns.json   [{"text": "metformin", "label": "CHEMICAL", "canonical": "메트포르민"}]
//! ```

use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::Arc,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use tracing::{debug, info};

use crate::{
    error::{ExtractionError, LoadError},
    nlp::{words, Category, Entities, ExtractionResult, Tier},
};

pub const PACK_META_FILE: &str = "meta.json";
pub const PACK_PATTERNS_FILE: &str = "patterns.json";

/// Minimum Jaro-Winkler similarity for a fuzzy single-token hit.
const FUZZY_THRESHOLD: f64 = 0.92;
/// Tokens shorter than this never fuzzy-match.
const FUZZY_MIN_CHARS: usize = 5;

/// Raw entity as reported by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntity {
    pub text: String,
    pub label: String,
    pub score: f64,
}

/// Heavyweight model seam.
pub trait EntityModel: Send + Sync {
    fn name(&self) -> &str;
    fn entities(&self, text: &str) -> Result<Vec<ModelEntity>, ExtractionError>;
}

/// Produces a ready [`ModelAdapter`]; invoked from the background loader.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<ModelAdapter, LoadError>;

    /// Human-readable source, used in logs.
    fn describe(&self) -> String;
}

/// Map a model type label onto a category. Unknown labels fall back to conditions.
pub fn category_for_label(label: &str) -> Category {
    const CONDITION_CUES: &[&str] = &["disease", "disorder", "condition", "syndrome"];
    const MEDICATION_CUES: &[&str] = &["drug", "chemical", "medication"];
    const SYMPTOM_CUES: &[&str] = &["symptom", "sign", "finding"];

    let label = label.to_lowercase();
    if CONDITION_CUES.iter().any(|cue| label.contains(cue)) {
        Category::Conditions
    } else if MEDICATION_CUES.iter().any(|cue| label.contains(cue)) {
        Category::Medications
    } else if SYMPTOM_CUES.iter().any(|cue| label.contains(cue)) {
        Category::Symptoms
    } else {
        Category::Conditions
    }
}

/// Converts raw model output into [`ExtractionResult`]s.
#[derive(Clone)]
pub struct ModelAdapter {
    model: Arc<dyn EntityModel>,
    confidence: f64,
}

impl std::fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("model", &self.model.name())
            .field("confidence", &self.confidence)
            .finish()
    }
}

impl ModelAdapter {
    pub fn new(model: Arc<dyn EntityModel>, confidence: f64) -> Self {
        Self { model, confidence }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Run the model. Errors and panics inside the model come back as `Err`.
    pub fn extract(&self, text: &str) -> Result<ExtractionResult, ExtractionError> {
        let found = catch_unwind(AssertUnwindSafe(|| self.model.entities(text)))
            .map_err(|payload| ExtractionError::Panicked(panic_message(payload)))??;
        let mut entities = Entities::default();
        for entity in found {
            entities.insert(category_for_label(&entity.label), entity.text);
        }
        Ok(ExtractionResult::new(
            text,
            entities,
            self.confidence,
            Tier::Full,
        ))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PackMeta {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PackPattern {
    text: String,
    label: String,
    #[serde(default)]
    canonical: Option<String>,
}

#[derive(Debug)]
struct Matcher {
    regex: Regex,
    label: String,
    name: String,
    /// Lowercased pattern when it is a single token eligible for fuzzy matching.
    fuzzy: Option<String>,
}

/// Pattern-pack model: exact word-bounded matches plus fuzzy single-token matches.
#[derive(Debug)]
pub struct PackModel {
    meta: PackMeta,
    matchers: Vec<Matcher>,
}

impl PackModel {
    /// Open a model pack directory.
    pub fn open(dir: &Path) -> Result<Self, LoadError> {
        if !dir.is_dir() {
            return Err(LoadError::MissingPath(dir.to_path_buf()));
        }
        let meta: PackMeta = read_json(&dir.join(PACK_META_FILE))?;
        let patterns: Vec<PackPattern> = read_json(&dir.join(PACK_PATTERNS_FILE))?;

        let mut matchers = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let expr = format!(r"(?i)\b{}\b", regex::escape(pattern.text.trim()));
            let regex = Regex::new(&expr).map_err(|source| LoadError::Pattern {
                pattern: pattern.text.clone(),
                source,
            })?;
            let lowered = pattern.text.trim().to_lowercase();
            let fuzzy = (!lowered.contains(char::is_whitespace)
                && lowered.chars().count() >= FUZZY_MIN_CHARS)
                .then_some(lowered);
            matchers.push(Matcher {
                regex,
                label: pattern.label,
                name: pattern.canonical.unwrap_or(pattern.text),
                fuzzy,
            });
        }
        info!(
            pack = %meta.name,
            version = %meta.version,
            labels = meta.labels.len(),
            patterns = matchers.len(),
            "opened model pack"
        );
        Ok(Self { meta, matchers })
    }
}

impl EntityModel for PackModel {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn entities(&self, text: &str) -> Result<Vec<ModelEntity>, ExtractionError> {
        let tokens: Vec<String> = words(text)
            .filter(|w| w.chars().count() >= FUZZY_MIN_CHARS)
            .collect();
        let mut found = Vec::new();
        for matcher in &self.matchers {
            let score = if matcher.regex.is_match(text) {
                Some(1.0)
            } else {
                matcher.fuzzy.as_ref().and_then(|target| {
                    tokens
                        .iter()
                        .map(|token| jaro_winkler(token, target))
                        .filter(|sim| *sim >= FUZZY_THRESHOLD)
                        .reduce(f64::max)
                })
            };
            if let Some(score) = score {
                found.push(ModelEntity {
                    text: matcher.name.clone(),
                    label: matcher.label.clone(),
                    score,
                });
            }
        }
        debug!(entities = found.len(), "pack model pass");
        Ok(found)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads a [`PackModel`] from a directory.
#[derive(Debug, Clone)]
pub struct PackLoader {
    path: PathBuf,
    confidence: f64,
}

impl PackLoader {
    pub fn new(path: impl Into<PathBuf>, confidence: f64) -> Self {
        Self {
            path: path.into(),
            confidence,
        }
    }
}

impl ModelLoader for PackLoader {
    fn load(&self) -> Result<ModelAdapter, LoadError> {
        let model = PackModel::open(&self.path)?;
        Ok(ModelAdapter::new(Arc::new(model), self.confidence))
    }

    fn describe(&self) -> String {
        format!("pack:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<ModelEntity>);

    impl EntityModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn entities(&self, _text: &str) -> Result<Vec<ModelEntity>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    struct Exploding;

    impl EntityModel for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn entities(&self, _text: &str) -> Result<Vec<ModelEntity>, ExtractionError> {
            panic!("tensor shape mismatch")
        }
    }

    fn entity(text: &str, label: &str) -> ModelEntity {
        ModelEntity {
            text: text.into(),
            label: label.into(),
            score: 0.4,
        }
    }

    #[test]
    fn labels_map_by_substring() {
        assert_eq!(category_for_label("DISEASE"), Category::Conditions);
        assert_eq!(category_for_label("Mental_Disorder"), Category::Conditions);
        assert_eq!(category_for_label("CHEMICAL"), Category::Medications);
        assert_eq!(category_for_label("drug_name"), Category::Medications);
        assert_eq!(category_for_label("Sign_or_Symptom"), Category::Symptoms);
        assert_eq!(category_for_label("ORGAN"), Category::Conditions);
    }

    #[test]
    fn confidence_is_fixed_regardless_of_model_score() {
        let adapter = ModelAdapter::new(
            Arc::new(Fixed(vec![entity("metformin", "CHEMICAL"), entity("cough", "SYMPTOM")])),
            0.95,
        );
        let result = adapter.extract("anything").unwrap();
        assert_eq!(result.method, Tier::Full);
        assert!((result.confidence - 0.95).abs() < 1e-9);
        assert!(result.entities.medications.contains("metformin"));
        assert!(result.entities.symptoms.contains("cough"));
    }

    #[test]
    fn model_panic_becomes_error() {
        let adapter = ModelAdapter::new(Arc::new(Exploding), 0.95);
        let err = adapter.extract("text").unwrap_err();
        assert!(matches!(err, ExtractionError::Panicked(msg) if msg.contains("tensor")));
    }

    #[test]
    fn pack_matches_exact_and_fuzzy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PACK_META_FILE),
            r#"{"name": "test-pack", "version": "1", "labels": ["DISEASE", "CHEMICAL"]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(PACK_PATTERNS_FILE),
            r#"[{"text": "heart failure", "label": "DISEASE", "canonical": "심부전"},
                {"text": "metformin", "label": "CHEMICAL"}]"#,
        )
        .unwrap();

        let adapter = PackLoader::new(dir.path(), 0.95).load().unwrap();
        assert_eq!(adapter.model_name(), "test-pack");
        let result = adapter
            .extract("Congestive Heart Failure, started metformn.")
            .unwrap();
        assert!(result.entities.conditions.contains("심부전"));
        assert!(result.entities.medications.contains("metformin"));
    }

    #[test]
    fn missing_pack_is_configuration_error() {
        let err = PackLoader::new("/definitely/not/here", 0.95)
            .load()
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::FaultKind::ConfigurationError);
    }
}
