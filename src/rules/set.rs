//! Named, ordered collections of rules combined by weighted average.

use serde::{Deserialize, Serialize};

use crate::rules::rule::Rule;
use crate::valuation::types::FeatureMap;

/// An ordered, weighted collection of rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// One rule's contribution within a set application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub name: String,
    pub score: f64,
}

/// Result of applying a rule set: per-rule scores (in rule order) plus
/// their weighted average.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetApplication {
    pub outcomes: Vec<RuleOutcome>,
    /// `Σ(score·weight)/Σweight`; 0.5 for an empty or zero-weight set.
    pub weighted_average: f64,
}

impl RuleSet {
    pub fn new(name: &str, description: &str) -> Self {
        RuleSet {
            name: name.to_string(),
            description: description.to_string(),
            rules: Vec::new(),
        }
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.add_rule(rule);
        self
    }

    /// Applies every rule and combines the scores by weighted average.
    pub fn apply(&self, data: &FeatureMap) -> RuleSetApplication {
        let mut outcomes = Vec::with_capacity(self.rules.len());
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for rule in &self.rules {
            let score = rule.apply(data);
            weighted_sum += score * rule.weight;
            total_weight += rule.weight;
            outcomes.push(RuleOutcome {
                name: rule.name.clone(),
                score,
            });
        }

        let weighted_average = if total_weight > 0.0 {
            weighted_sum / total_weight
        } else {
            0.5
        };

        RuleSetApplication {
            outcomes,
            weighted_average,
        }
    }
}
