//! Individual valuation rules: differentiable scoring functions over a
//! feature map, each yielding a score in `[0, 1]` with a trainable weight.

use serde::{Deserialize, Serialize};

use crate::valuation::types::FeatureMap;

/// Weights never fall below this floor during training, so a rule's
/// influence cannot collapse to zero.
pub const MIN_RULE_WEIGHT: f64 = 0.1;

fn default_weight() -> f64 {
    1.0
}

fn default_trainable() -> bool {
    true
}

fn default_smoothness() -> f64 {
    1.0
}

fn default_neutral() -> f64 {
    0.5
}

/// How a comparison rule relates its two features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOp {
    #[default]
    Greater,
    Less,
    Equal,
}

/// Which side of a threshold scores high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdDirection {
    #[default]
    Above,
    Below,
}

/// Whether a range rule rewards values inside or outside its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RangeMode {
    #[default]
    Inside,
    Outside,
}

/// A single scoring heuristic. The flattened `kind` carries the serialized
/// `type` tag, so persisted documents are self-describing; an unknown tag
/// fails deserialization outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_trainable")]
    pub is_trainable: bool,
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// The variant-specific parameters of a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuleKind {
    /// Soft comparison of two features via a logistic (or, for equality,
    /// exponential) transform of their difference.
    #[serde(rename = "ComparisonRule")]
    Comparison {
        feature1: String,
        feature2: String,
        #[serde(default)]
        operator: ComparisonOp,
        #[serde(default)]
        margin: f64,
    },
    /// Logistic step centred on a threshold.
    #[serde(rename = "ThresholdRule")]
    Threshold {
        feature: String,
        threshold: f64,
        #[serde(default)]
        direction: ThresholdDirection,
        #[serde(default = "default_smoothness")]
        smoothness: f64,
    },
    /// Scores distance to (or from) a value range.
    #[serde(rename = "RangeRule")]
    Range {
        feature: String,
        min_value: f64,
        max_value: f64,
        #[serde(default)]
        mode: RangeMode,
        #[serde(default = "default_smoothness")]
        smoothness: f64,
    },
    /// Exact-match lookup into a category/value table.
    #[serde(rename = "CategoricalRule")]
    Categorical {
        feature: String,
        categories: Vec<String>,
        #[serde(default)]
        values: Vec<f64>,
        #[serde(default = "default_neutral")]
        default_value: f64,
    },
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn numeric(data: &FeatureMap, key: &str) -> Option<f64> {
    data.get(key).and_then(|v| v.as_number())
}

impl Rule {
    pub fn comparison(
        name: &str,
        description: &str,
        feature1: &str,
        feature2: &str,
        operator: ComparisonOp,
        margin: f64,
        weight: f64,
    ) -> Self {
        Rule {
            name: name.to_string(),
            description: description.to_string(),
            weight,
            is_trainable: true,
            kind: RuleKind::Comparison {
                feature1: feature1.to_string(),
                feature2: feature2.to_string(),
                operator,
                margin,
            },
        }
    }

    pub fn threshold(
        name: &str,
        description: &str,
        feature: &str,
        threshold: f64,
        direction: ThresholdDirection,
        smoothness: f64,
        weight: f64,
    ) -> Self {
        Rule {
            name: name.to_string(),
            description: description.to_string(),
            weight,
            is_trainable: true,
            kind: RuleKind::Threshold {
                feature: feature.to_string(),
                threshold,
                direction,
                smoothness,
            },
        }
    }

    pub fn range(
        name: &str,
        description: &str,
        feature: &str,
        min_value: f64,
        max_value: f64,
        mode: RangeMode,
        smoothness: f64,
        weight: f64,
    ) -> Self {
        Rule {
            name: name.to_string(),
            description: description.to_string(),
            weight,
            is_trainable: true,
            kind: RuleKind::Range {
                feature: feature.to_string(),
                min_value,
                max_value,
                mode,
                smoothness,
            },
        }
    }

    pub fn categorical(
        name: &str,
        description: &str,
        feature: &str,
        categories: &[&str],
        values: &[f64],
        weight: f64,
    ) -> Self {
        Rule {
            name: name.to_string(),
            description: description.to_string(),
            weight,
            is_trainable: true,
            kind: RuleKind::Categorical {
                feature: feature.to_string(),
                categories: categories.iter().map(|c| c.to_string()).collect(),
                values: values.to_vec(),
                default_value: default_neutral(),
            },
        }
    }

    /// Evaluates the rule against a feature map. Always lands in `[0, 1]`;
    /// missing or non-numeric features resolve to the neutral 0.5 (or the
    /// categorical rule's configured default), never an error.
    pub fn apply(&self, data: &FeatureMap) -> f64 {
        match &self.kind {
            RuleKind::Comparison {
                feature1,
                feature2,
                operator,
                margin,
            } => {
                let (Some(v1), Some(v2)) = (numeric(data, feature1), numeric(data, feature2))
                else {
                    return 0.5;
                };
                let scale = margin + 1e-6;
                match operator {
                    ComparisonOp::Greater => sigmoid((v1 - v2) / scale),
                    ComparisonOp::Less => sigmoid((v2 - v1) / scale),
                    ComparisonOp::Equal => (-(v1 - v2).abs() / scale).exp(),
                }
            }
            RuleKind::Threshold {
                feature,
                threshold,
                direction,
                smoothness,
            } => {
                let Some(value) = numeric(data, feature) else {
                    return 0.5;
                };
                match direction {
                    ThresholdDirection::Above => sigmoid((value - threshold) / smoothness),
                    ThresholdDirection::Below => sigmoid(-(value - threshold) / smoothness),
                }
            }
            RuleKind::Range {
                feature,
                min_value,
                max_value,
                mode,
                smoothness,
            } => {
                let Some(value) = numeric(data, feature) else {
                    return 0.5;
                };
                let distance = if value < *min_value {
                    min_value - value
                } else if value > *max_value {
                    value - max_value
                } else {
                    0.0
                };
                match mode {
                    RangeMode::Inside => (-distance / smoothness).exp(),
                    RangeMode::Outside => {
                        if distance > 0.0 {
                            return 1.0;
                        }
                        // Inside the range the score re-derives distance
                        // from the midpoint, scaled by the half-width.
                        let half_width = (max_value - min_value) / 2.0;
                        if half_width <= 0.0 {
                            return 0.0;
                        }
                        let center = (min_value + max_value) / 2.0;
                        let internal = (value - center).abs() / half_width;
                        1.0 - (-internal / smoothness).exp()
                    }
                }
            }
            RuleKind::Categorical {
                feature,
                categories,
                values,
                default_value,
            } => {
                let Some(label) = data.get(feature).and_then(|v| v.as_label()) else {
                    return *default_value;
                };
                match categories.iter().position(|c| c == label) {
                    Some(index) => values.get(index).copied().unwrap_or(1.0),
                    None => *default_value,
                }
            }
        }
    }
}
