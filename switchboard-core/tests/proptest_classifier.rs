//! Property-Based Tests for the Prompt Classifier
//!
//! Uses `proptest` to verify classifier invariants under random inputs:
//! the recommendation always names a registered backend, confidence
//! stays inside `[0, 1]`, scores stay normalized, and classification is
//! deterministic and side-effect free.

use proptest::prelude::*;

use switchboard_core::classifier::Classifier;
use switchboard_core::cache::normalize_prompt;
use switchboard_llm::BackendId;

fn classifier() -> Classifier {
    let all: Vec<BackendId> = ["gemini", "mistral", "deepseek", "gpt"]
        .iter()
        .map(|s| BackendId::new(*s))
        .collect();
    Classifier::new(all.clone(), all, BackendId::new("gemini"))
}

proptest! {
    #[test]
    fn recommendation_is_always_registered(prompt in ".{0,400}") {
        let c = classifier();
        let result = c.classify(&prompt);
        let known = ["gemini", "mistral", "deepseek", "gpt"];
        prop_assert!(known.contains(&result.recommended.as_str()));
    }

    #[test]
    fn confidence_is_bounded(prompt in ".{0,400}") {
        let result = classifier().classify(&prompt);
        prop_assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn scores_stay_normalized(prompt in ".{0,400}") {
        let result = classifier().classify(&prompt);
        let total: f32 = result.model_scores.values().sum();
        prop_assert!((total - 1.0).abs() < 1e-4);
        for score in result.model_scores.values() {
            prop_assert!((0.0..=1.0).contains(score));
        }
    }

    #[test]
    fn classification_is_deterministic(prompt in ".{0,400}") {
        let c = classifier();
        let first = c.classify(&prompt);
        let second = c.classify(&prompt);
        prop_assert_eq!(first.recommended, second.recommended);
        prop_assert_eq!(first.model_scores, second.model_scores);
    }
}

proptest! {
    // Normalization shares an invariant with the cache key: it must be
    // idempotent, or equal prompts could hash to different entries.
    #[test]
    fn prompt_normalization_is_idempotent(prompt in ".{0,400}") {
        let once = normalize_prompt(&prompt);
        let twice = normalize_prompt(&once);
        prop_assert_eq!(once, twice);
    }
}
