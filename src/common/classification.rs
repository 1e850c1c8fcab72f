use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

/// One ranked label produced by the inference coordinator for a single frame.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: f32,
    pub observed_at: DateTime<Utc>,
}

impl ClassificationResult {
    pub fn new(label: impl Into<String>, confidence: f32, observed_at: DateTime<Utc>) -> Self {
        Self {
            label: label.into(),
            confidence,
            observed_at,
        }
    }
}

/// Turns raw runtime output into the ranked result list the rest of the
/// pipeline consumes.
///
/// Confidences are clamped to [0, 1], entries below the noise floor are
/// discarded, and the survivors are sorted descending by confidence with a
/// lexical label tie-break so equal-confidence orderings are deterministic.
/// The list is capped at `max_results`.
pub fn normalize_results(
    raw: Vec<(String, f32)>,
    observed_at: DateTime<Utc>,
    noise_floor: f32,
    max_results: usize,
) -> Vec<ClassificationResult> {
    let mut results: Vec<ClassificationResult> = raw
        .into_iter()
        .map(|(label, confidence)| {
            ClassificationResult::new(label, confidence.clamp(0.0, 1.0), observed_at)
        })
        .filter(|r| r.confidence >= noise_floor)
        .collect();

    results.sort_by(|a, b| match b.confidence.total_cmp(&a.confidence) {
        Ordering::Equal => a.label.cmp(&b.label),
        other => other,
    });
    results.truncate(max_results);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, f32)]) -> Vec<(String, f32)> {
        pairs.iter().map(|(l, c)| (l.to_string(), *c)).collect()
    }

    #[test]
    fn results_are_sorted_descending_and_capped() {
        let out = normalize_results(
            raw(&[("dog", 0.4), ("cat", 0.9), ("bird", 0.7), ("fish", 0.5)]),
            Utc::now(),
            0.0,
            3,
        );
        let labels: Vec<&str> = out.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["cat", "bird", "fish"]);
        assert!(out.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn equal_confidences_break_ties_lexically() {
        let out = normalize_results(
            raw(&[("zebra", 0.5), ("ant", 0.5), ("moth", 0.5)]),
            Utc::now(),
            0.0,
            10,
        );
        let labels: Vec<&str> = out.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["ant", "moth", "zebra"]);
    }

    #[test]
    fn noise_floor_discards_weak_results() {
        let out = normalize_results(
            raw(&[("dog", 0.1), ("cat", 0.6)]),
            Utc::now(),
            0.35,
            10,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "cat");
    }

    #[test]
    fn confidences_are_clamped_to_unit_interval() {
        let out = normalize_results(raw(&[("dog", 1.7), ("cat", 0.6)]), Utc::now(), 0.0, 10);
        assert!(out.iter().all(|r| (0.0..=1.0).contains(&r.confidence)));
        assert_eq!(out[0].confidence, 1.0);
    }
}
