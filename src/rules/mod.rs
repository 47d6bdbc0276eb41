//! Differentiable rule framework - valuation heuristics expressed as
//! individually-trainable scoring functions over feature maps.

pub mod engine;
pub mod rule;
pub mod set;

pub use engine::{default_rule_set, RuleEngine, TrainingSample};
pub use rule::{ComparisonOp, RangeMode, Rule, RuleKind, ThresholdDirection, MIN_RULE_WEIGHT};
pub use set::{RuleOutcome, RuleSet, RuleSetApplication};
