//! Tiered medical entity extraction.
//!
//! Three extractors trade latency for fidelity:
//!
//! * [`terms::TermIndex`] matches a curated synonym dictionary and is always available.
//! * [`concepts::ConceptStore`] looks words up in a precomputed concept database.
//! * [`model::ModelAdapter`] wraps a heavyweight entity model.
//!
//! [`hybrid::HybridCoordinator`] loads the two heavier tiers in the background and
//! routes each request to the best tier that is ready.

pub mod cache;
pub mod concepts;
pub mod diagnostics;
pub mod hybrid;
pub mod model;
pub mod terms;

use std::{fmt, time::Duration};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};

/// Closed set of entity categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Conditions,
    Medications,
    Symptoms,
}

impl Category {
    /// Declaration order; also the priority order when a synonym has several owners.
    pub const ALL: [Category; 3] = [Self::Conditions, Self::Medications, Self::Symptoms];
}

/// Extraction tier, reported as `method` on results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Lightweight,
    Partial,
    Full,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lightweight => "lightweight",
            Self::Partial => "partial",
            Self::Full => "full",
        };
        f.write_str(name)
    }
}

/// Requested extraction mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    /// Dictionary matching only.
    Lightweight,
    /// Concept database if loaded, otherwise dictionary.
    Partial,
    /// Full model, cascading down to whatever is ready.
    Full,
    /// Best tier currently ready.
    #[default]
    Auto,
}

/// Entity names per category, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    pub conditions: IndexSet<String>,
    pub medications: IndexSet<String>,
    pub symptoms: IndexSet<String>,
}

impl Entities {
    pub fn get(&self, category: Category) -> &IndexSet<String> {
        match category {
            Category::Conditions => &self.conditions,
            Category::Medications => &self.medications,
            Category::Symptoms => &self.symptoms,
        }
    }

    /// Insert a name; returns `false` if it was already present.
    pub fn insert(&mut self, category: Category, name: impl Into<String>) -> bool {
        let set = match category {
            Category::Conditions => &mut self.conditions,
            Category::Medications => &mut self.medications,
            Category::Symptoms => &mut self.symptoms,
        };
        set.insert(name.into())
    }

    /// Total entities across all categories.
    pub fn len(&self) -> usize {
        self.conditions.len() + self.medications.len() + self.symptoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Structured output shared by every tier.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub entities: Entities,
    pub confidence: f64,
    pub method: Tier,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub extraction_time: Duration,
}

impl ExtractionResult {
    pub(crate) fn new(text: &str, entities: Entities, confidence: f64, method: Tier) -> Self {
        Self {
            text: text.to_string(),
            entities,
            confidence,
            method,
            extraction_time: Duration::ZERO,
        }
    }
}

/// Split text into lowercased alphanumeric words.
pub(crate) fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities_deduplicate_per_category() {
        let mut entities = Entities::default();
        assert!(entities.insert(Category::Symptoms, "두통"));
        assert!(!entities.insert(Category::Symptoms, "두통"));
        assert!(entities.insert(Category::Conditions, "두통"));
        assert_eq!(entities.len(), 2);
    }

    #[test]
    fn result_serialises_method_and_seconds() {
        let mut result = ExtractionResult::new("x", Entities::default(), 0.5, Tier::Partial);
        result.extraction_time = Duration::from_millis(1500);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["method"], "partial");
        assert_eq!(json["extraction_time"], 1.5);
        assert!(json["entities"]["conditions"].as_array().unwrap().is_empty());
    }

    #[test]
    fn words_split_on_punctuation() {
        let split: Vec<String> = words("Type-2 Diabetes, 고혈압!").collect();
        assert_eq!(split, vec!["type", "2", "diabetes", "고혈압"]);
    }
}
