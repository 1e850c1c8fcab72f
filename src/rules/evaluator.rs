use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::common::ClassificationResult;

/// One user-configured interest rule. Rules are owned externally and treated
/// as read-only input per evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRule {
    pub label: String,
    pub min_confidence: f32,
    pub enabled: bool,
}

impl InterestRule {
    pub fn new(label: impl Into<String>, min_confidence: f32) -> Self {
        Self {
            label: label.into(),
            min_confidence,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Active rule set, keyed by lowercased label so matching is case-insensitive
/// and each label appears at most once. Iteration order is insertion order,
/// which fixes the order of reported active labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    rules: IndexMap<String, InterestRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a rule, replacing any existing rule for the same label.
    pub fn insert(&mut self, rule: InterestRule) {
        self.rules.insert(rule.label.to_lowercase(), rule);
    }

    pub fn remove(&mut self, label: &str) -> Option<InterestRule> {
        self.rules.shift_remove(&label.to_lowercase())
    }

    pub fn get(&self, label: &str) -> Option<&InterestRule> {
        self.rules.get(&label.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterestRule> {
        self.rules.values()
    }
}

impl FromIterator<InterestRule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = InterestRule>>(iter: I) -> Self {
        let mut set = RuleSet::new();
        for rule in iter {
            set.insert(rule);
        }
        set
    }
}

/// Output of one evaluation pass: the capture gate plus every matched label
/// for the multi-highlight overlay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleVerdict {
    pub gate: bool,
    pub active_labels: Vec<String>,
}

/// Matches ranked results against the rule set.
///
/// Pure function of its inputs. A rule matches when an enabled rule's label
/// equals a result's label (case-insensitive and exact, not substring) and the
/// result's confidence is at or above the rule's floor. The gate is the OR
/// across matched rules; all matched labels are reported in rule-set order.
pub fn evaluate(results: &[ClassificationResult], rules: &RuleSet) -> RuleVerdict {
    let mut active_labels = Vec::new();
    for (key, rule) in &rules.rules {
        if !rule.enabled {
            continue;
        }
        let matched = results
            .iter()
            .any(|r| r.label.to_lowercase() == *key && r.confidence >= rule.min_confidence);
        if matched {
            active_labels.push(rule.label.clone());
        }
    }
    RuleVerdict {
        gate: !active_labels.is_empty(),
        active_labels,
    }
}
