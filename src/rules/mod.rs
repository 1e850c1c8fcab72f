pub mod evaluator;

pub use evaluator::{evaluate, InterestRule, RuleSet, RuleVerdict};
