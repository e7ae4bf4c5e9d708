use std::sync::Arc;

use medner::{
    config::CoordinatorConfig,
    nlp::{concepts::ConceptStore, terms::TermIndex},
    ExtractMode, HybridCoordinator, Tier, Tiers,
};
use proptest::prelude::*;

fn offline_coordinator() -> HybridCoordinator {
    HybridCoordinator::start(
        CoordinatorConfig::default(),
        Tiers {
            term_index: TermIndex::default(),
            concept_store: Arc::new(ConceptStore::default()),
            concept_dir: None,
            model_loader: None,
        },
    )
}

#[test]
fn diabetes_maps_to_korean_condition() {
    let result = offline_coordinator().extract("Patient has diabetes.", ExtractMode::Lightweight);
    assert_eq!(
        result.entities.conditions.iter().collect::<Vec<_>>(),
        vec!["당뇨병"]
    );
    assert!(result.entities.medications.is_empty());
    assert!(result.entities.symptoms.is_empty());
    assert!((result.confidence - 0.55).abs() < 1e-9);
    assert_eq!(result.method, Tier::Lightweight);
}

#[test]
fn mixed_language_note_fills_every_category() {
    let result = offline_coordinator().extract(
        "고혈압 환자, lisinopril 복용 중. Reports headache and 기침.",
        ExtractMode::Lightweight,
    );
    assert!(result.entities.conditions.contains("고혈압"));
    assert!(result.entities.medications.contains("리시노프릴"));
    assert!(result.entities.symptoms.contains("두통"));
    assert!(result.entities.symptoms.contains("기침"));
    assert!((result.confidence - 0.7).abs() < 1e-9);
}

proptest! {
    #[test]
    fn lightweight_mode_always_answers_lightweight(text in "\\PC{0,200}") {
        let result = offline_coordinator().extract(&text, ExtractMode::Lightweight);
        prop_assert_eq!(result.method, Tier::Lightweight);
        prop_assert!(result.confidence >= 0.5 && result.confidence <= 0.7);
        prop_assert_eq!(result.text, text);
    }
}
