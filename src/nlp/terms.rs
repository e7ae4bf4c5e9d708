//! Dictionary-backed lightweight extraction.

use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::ConfidenceConfig,
    error::LoadError,
    nlp::{Category, Entities, ExtractionResult, Tier},
};

/// Canonical term -> synonyms, per category. Declaration order is significant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermDictionary {
    #[serde(default)]
    pub conditions: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub medications: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub symptoms: IndexMap<String, Vec<String>>,
}

impl TermDictionary {
    /// Read a dictionary from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn category(&self, category: Category) -> &IndexMap<String, Vec<String>> {
        match category {
            Category::Conditions => &self.conditions,
            Category::Medications => &self.medications,
            Category::Symptoms => &self.symptoms,
        }
    }

    fn category_mut(&mut self, category: Category) -> &mut IndexMap<String, Vec<String>> {
        match category {
            Category::Conditions => &mut self.conditions,
            Category::Medications => &mut self.medications,
            Category::Symptoms => &mut self.symptoms,
        }
    }

    /// Builder-style helper used by the built-in dictionary and tests.
    pub fn with_term(mut self, category: Category, canonical: &str, synonyms: &[&str]) -> Self {
        self.category_mut(category).insert(
            canonical.to_string(),
            synonyms.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

static BUILTIN: Lazy<TermDictionary> = Lazy::new(|| {
    use Category::*;
    TermDictionary::default()
        .with_term(Conditions, "당뇨병", &["diabetes", "diabetes mellitus", "type 2 diabetes", "당뇨"])
        .with_term(Conditions, "고혈압", &["hypertension", "high blood pressure"])
        .with_term(Conditions, "천식", &["asthma"])
        .with_term(Conditions, "폐렴", &["pneumonia"])
        .with_term(Conditions, "우울증", &["depression", "depressive disorder"])
        .with_term(Conditions, "심부전", &["heart failure", "cardiac failure"])
        .with_term(Conditions, "관절염", &["arthritis"])
        .with_term(Conditions, "고지혈증", &["hyperlipidemia", "high cholesterol"])
        .with_term(Medications, "메트포르민", &["metformin", "glucophage"])
        .with_term(Medications, "인슐린", &["insulin"])
        .with_term(Medications, "아스피린", &["aspirin", "acetylsalicylic acid"])
        .with_term(Medications, "리시노프릴", &["lisinopril"])
        .with_term(Medications, "아목시실린", &["amoxicillin"])
        .with_term(Medications, "아토르바스타틴", &["atorvastatin", "lipitor"])
        .with_term(Medications, "이부프로펜", &["ibuprofen", "advil"])
        .with_term(Medications, "살부타몰", &["salbutamol", "albuterol"])
        .with_term(Symptoms, "두통", &["headache"])
        .with_term(Symptoms, "발열", &["fever", "pyrexia"])
        .with_term(Symptoms, "기침", &["cough"])
        .with_term(Symptoms, "피로", &["fatigue", "tiredness"])
        .with_term(Symptoms, "메스꺼움", &["nausea"])
        .with_term(Symptoms, "어지러움", &["dizziness", "vertigo"])
        .with_term(Symptoms, "흉통", &["chest pain"])
        .with_term(Symptoms, "호흡곤란", &["shortness of breath", "dyspnea"])
});

/// Built-in Korean/English medical dictionary.
pub fn builtin_dictionary() -> &'static TermDictionary {
    &BUILTIN
}

/// Immutable synonym index over a [`TermDictionary`].
///
/// Every canonical term is indexed as a synonym of itself. When a synonym is
/// declared under several owners, the first declared one (categories in
/// [`Category::ALL`] order, then dictionary order) is the one reported.
#[derive(Debug, Clone)]
pub struct TermIndex {
    index: IndexMap<String, Vec<(Category, String)>>,
    confidence: ConfidenceConfig,
}

impl Default for TermIndex {
    fn default() -> Self {
        Self::new(builtin_dictionary().clone(), ConfidenceConfig::default())
    }
}

impl TermIndex {
    pub fn new(dictionary: TermDictionary, confidence: ConfidenceConfig) -> Self {
        let mut index: IndexMap<String, Vec<(Category, String)>> = IndexMap::new();
        for category in Category::ALL {
            for (canonical, synonyms) in dictionary.category(category) {
                for synonym in std::iter::once(canonical).chain(synonyms) {
                    let key = synonym.trim().to_lowercase();
                    if key.is_empty() {
                        continue;
                    }
                    let owners = index.entry(key).or_default();
                    let owner = (category, canonical.clone());
                    if !owners.contains(&owner) {
                        owners.push(owner);
                    }
                }
            }
        }
        debug!(synonyms = index.len(), "built term index");
        Self {
            index,
            confidence,
        }
    }

    /// Number of indexed synonyms.
    pub fn term_count(&self) -> usize {
        self.index.len()
    }

    /// Every owner of a synonym, highest priority first.
    pub fn owners(&self, synonym: &str) -> &[(Category, String)] {
        self.index
            .get(&synonym.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Substring match every synonym against the lowercased text.
    pub fn extract(&self, text: &str) -> ExtractionResult {
        let lower = text.to_lowercase();
        let mut entities = Entities::default();
        for (synonym, owners) in &self.index {
            if !lower.contains(synonym.as_str()) {
                continue;
            }
            if let Some((category, canonical)) = owners.first() {
                entities.insert(*category, canonical.clone());
            }
        }
        let confidence = self.confidence.lightweight(entities.len());
        ExtractionResult::new(text, entities, confidence, Tier::Lightweight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_english_synonym_to_korean_term() {
        let index = TermIndex::default();
        let result = index.extract("Patient has diabetes.");
        assert_eq!(result.entities.conditions.iter().collect::<Vec<_>>(), vec!["당뇨병"]);
        assert!((result.confidence - 0.55).abs() < 1e-9);
        assert_eq!(result.method, Tier::Lightweight);
    }

    #[test]
    fn several_synonyms_of_one_term_count_once() {
        let index = TermIndex::default();
        let result = index.extract("type 2 diabetes mellitus (당뇨병)");
        assert_eq!(result.entities.len(), 1);
    }

    #[test]
    fn confidence_caps_at_lightweight_ceiling() {
        let index = TermIndex::default();
        let result = index.extract(
            "asthma, pneumonia, arthritis, headache, fever, cough, nausea, insulin, aspirin",
        );
        assert_eq!(result.entities.len(), 9);
        assert!((result.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn shared_synonym_resolves_to_first_declared_owner() {
        let dictionary = TermDictionary::default()
            .with_term(Category::Symptoms, "dizziness", &["vertigo"])
            .with_term(Category::Conditions, "vestibular disorder", &["vertigo"]);
        let index = TermIndex::new(dictionary, ConfidenceConfig::default());

        let owners = index.owners("VERTIGO");
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0], (Category::Conditions, "vestibular disorder".to_string()));

        let result = index.extract("complains of vertigo");
        assert_eq!(
            result.entities.conditions.iter().collect::<Vec<_>>(),
            vec!["vestibular disorder"]
        );
        assert!(result.entities.get(Category::Symptoms).is_empty());
    }

    #[test]
    fn empty_text_yields_empty_categories() {
        let result = TermIndex::default().extract("");
        assert!(result.entities.is_empty());
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }
}
