//! Importance scoring: deterministic, additive, weighted
//! heuristics over a message's text, clamped to `[0, 1]`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Configurable weights for each scoring signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceWeights {
    pub remember_verb: f32,
    pub personal_info: f32,
    pub question: f32,
    pub long_content: f32,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        ImportanceWeights {
            remember_verb: 1.0,
            personal_info: 0.8,
            question: 0.4,
            long_content: 0.3,
        }
    }
}

const REMEMBER_MARKERS: &[&str] = &["remember", "note", "don't forget", "important"];
const PERSONAL_PHRASES: &[&str] = &["my name is", "i am", "i'm", "call me", "my birthday"];

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{3}[-.]?\d{3}[-.]?\d{4}").unwrap())
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap())
}

/// Score `text`'s importance in `[0, 1]` using the heuristics.
/// Deterministic: identical text and weights always produce the same score.
pub fn score_importance(text: &str, weights: &ImportanceWeights) -> f32 {
    let lower = text.to_lowercase();
    let mut score = 0.0f32;

    if REMEMBER_MARKERS.iter().any(|marker| lower.contains(marker)) {
        score += weights.remember_verb;
    }

    let has_personal_phrase = PERSONAL_PHRASES.iter().any(|phrase| lower.contains(phrase));
    if has_personal_phrase || email_regex().is_match(text) || phone_regex().is_match(text) {
        score += weights.personal_info;
    }

    if text.trim_end().ends_with('?') {
        score += weights.question;
    }

    if text.len() > 100 {
        score += weights.long_content;
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_scores_low() {
        let score = score_importance("Hello", &ImportanceWeights::default());
        assert!(score <= 0.1, "expected low score, got {score}");
    }

    #[test]
    fn personal_info_scores_at_least_point_eight() {
        let score = score_importance(
            "My email is john@example.com and my phone is 555-1234.",
            &ImportanceWeights::default(),
        );
        assert!(score >= 0.8, "expected >= 0.8, got {score}");
    }

    #[test]
    fn explicit_remember_plus_personal_saturates_to_one() {
        let score = score_importance("Please remember my birthday is Jan 15.", &ImportanceWeights::default());
        assert_eq!(score, 1.0);
    }

    #[test]
    fn question_adds_partial_weight() {
        let score = score_importance("What's my name?", &ImportanceWeights::default());
        assert!((score - 0.4).abs() < 1e-6, "got {score}");
    }

    #[test]
    fn score_is_deterministic() {
        let weights = ImportanceWeights::default();
        let a = score_importance("Remember this important fact.", &weights);
        let b = score_importance("Remember this important fact.", &weights);
        assert_eq!(a, b);
    }
}
