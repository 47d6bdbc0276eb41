//! Similarity-weighted aggregation (the intelligent market comparison
//! approach): scores each comparable's similarity to the target, corrects
//! its price, then softmax-weights the priced cases into a point estimate
//! with an entropy-derived confidence.

use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};

use crate::rules::RuleEngine;
use crate::valuation::types::{
    AdjustmentBreakdown, CaseBreakdown, PropertyCase, SimilarityScore, ValuationResult,
};
use crate::valuation::utils;

/// Entropy guard against `ln(0)` on fully-concentrated weights.
const ENTROPY_EPSILON: f64 = 1e-10;

/// Fixed category weights for the six similarity dimensions. Sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityWeights {
    pub location: f64,
    pub time: f64,
    pub physical: f64,
    pub legal: f64,
    pub environment: f64,
    pub transaction: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        SimilarityWeights {
            location: 0.25,
            time: 0.15,
            physical: 0.20,
            legal: 0.10,
            environment: 0.15,
            transaction: 0.15,
        }
    }
}

/// Decay rates and component importances for the similarity formulas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityParams {
    /// Time decay per year since the transaction.
    pub time_decay_rate: f64,
    /// Location decay per kilometre of distance.
    pub distance_decay_rate: f64,
    /// Area difference (m²) scaling the physical-similarity decay.
    pub area_tolerance: f64,
    pub floor_importance: f64,
    pub decoration_importance: f64,
    pub age_importance: f64,
}

impl Default for SimilarityParams {
    fn default() -> Self {
        SimilarityParams {
            time_decay_rate: 0.1,
            distance_decay_rate: 0.2,
            area_tolerance: 10.0,
            floor_importance: 0.5,
            decoration_importance: 0.7,
            age_importance: 0.6,
        }
    }
}

/// The similarity-weighted aggregation engine.
#[derive(Debug, Clone, Default)]
pub struct Imca {
    pub weights: SimilarityWeights,
    pub params: SimilarityParams,
}

impl Imca {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces a point estimate and confidence from the comparable set.
    ///
    /// Every case receives a similarity and adjustment breakdown; only
    /// priced cases enter the softmax weighting and the weighted sum, so
    /// the weight vector and the priced-case list always stay aligned.
    /// When no case carries a price the result degrades to
    /// `(None, confidence 0)` rather than an error.
    pub fn estimate(
        &self,
        target: &PropertyCase,
        cases: &[PropertyCase],
        rules: Option<&RuleEngine>,
        today: NaiveDate,
    ) -> ValuationResult {
        let similarities: Vec<SimilarityScore> = cases
            .iter()
            .map(|case| self.similarity(target, case, today))
            .collect();
        let adjustments: Vec<AdjustmentBreakdown> = cases
            .iter()
            .map(|case| self.adjustment(target, case, rules, today))
            .collect();

        let mut breakdowns: Vec<CaseBreakdown> = similarities
            .iter()
            .zip(&adjustments)
            .map(|(similarity, adjustment)| CaseBreakdown {
                similarity: *similarity,
                adjustment: adjustment.clone(),
                weight: None,
                adjusted_price: None,
            })
            .collect();

        let priced: Vec<usize> = cases
            .iter()
            .enumerate()
            .filter_map(|(i, case)| {
                if case.price.is_some() {
                    Some(i)
                } else {
                    warn!(case = i + 1, "comparable case is missing a price, skipping");
                    None
                }
            })
            .collect();

        if priced.is_empty() {
            return ValuationResult {
                estimated_price: None,
                confidence: 0.0,
                cases: breakdowns,
            };
        }

        let priced_similarities: Vec<f64> =
            priced.iter().map(|&i| similarities[i].total).collect();
        let weights = softmax(&priced_similarities);

        let mut estimated = 0.0;
        for (&i, &weight) in priced.iter().zip(&weights) {
            if let Some(price) = cases[i].price {
                let adjusted = price * adjustments[i].total;
                estimated += weight * adjusted;
                breakdowns[i].weight = Some(weight);
                breakdowns[i].adjusted_price = Some(adjusted);
            }
        }

        let confidence = if weights.len() == 1 {
            1.0
        } else {
            weight_confidence(&weights)
        };

        ValuationResult {
            estimated_price: Some(estimated),
            confidence,
            cases: breakdowns,
        }
    }

    /// Category similarities between the target and one case. Categories a
    /// side is silent on score the neutral 1.0.
    fn similarity(&self, target: &PropertyCase, case: &PropertyCase, today: NaiveDate) -> SimilarityScore {
        let time_diff = case.time_diff_years(today).unwrap_or(0.0);
        let time = (-self.params.time_decay_rate * time_diff).exp();

        let location = match case.distance_km {
            Some(distance) => (-self.params.distance_decay_rate * distance).exp(),
            None => 1.0,
        };

        let area = match (target.size, case.size) {
            (Some(t), Some(c)) => (-(t - c).abs() / self.params.area_tolerance).exp(),
            _ => 1.0,
        };
        let floor = match (&target.floor, &case.floor) {
            (Some(t), Some(c)) if t == c => 1.0,
            (Some(_), Some(_)) => 0.5,
            _ => 1.0,
        };
        let decoration = match (&target.fitment, &case.fitment) {
            (Some(t), Some(c)) if t == c => 1.0,
            (Some(_), Some(_)) => 0.5,
            _ => 1.0,
        };
        let current_year = today.year();
        let age = match (target.age(current_year), case.age(current_year)) {
            (Some(t), Some(c)) => (-((t - c).abs() as f64) / 10.0).exp(),
            _ => 1.0,
        };
        let physical = (area
            + self.params.floor_importance * floor
            + self.params.decoration_importance * decoration
            + self.params.age_importance * age)
            / (1.0
                + self.params.floor_importance
                + self.params.decoration_importance
                + self.params.age_importance);

        let environment = match (target.green_rate, case.green_rate) {
            (Some(t), Some(c)) => (-(t - c).abs() / 0.1).exp(),
            _ => 1.0,
        };

        let legal = 1.0;

        let transaction = match (target.transaction_type, case.transaction_type) {
            (Some(t), Some(c)) if t == c => 1.0,
            (Some(_), Some(_)) => 0.7,
            _ => 1.0,
        };

        let total = self.weights.time * time
            + self.weights.location * location
            + self.weights.physical * physical
            + self.weights.environment * environment
            + self.weights.legal * legal
            + self.weights.transaction * transaction;

        SimilarityScore {
            time,
            location,
            physical,
            environment,
            legal,
            transaction,
            total,
        }
    }

    /// The price correction for one case: the last-registered rule set's
    /// weighted average when a rule engine is supplied, otherwise the
    /// product of six fixed heuristic factors.
    fn adjustment(
        &self,
        target: &PropertyCase,
        case: &PropertyCase,
        rules: Option<&RuleEngine>,
        today: NaiveDate,
    ) -> AdjustmentBreakdown {
        if let Some(engine) = rules {
            if let Some(breakdown) = self.rule_adjustment(target, case, engine, today) {
                return breakdown;
            }
            debug!("rule engine holds no rule sets, falling back to heuristic factors");
        }
        self.heuristic_adjustment(target, case, today)
    }

    fn rule_adjustment(
        &self,
        target: &PropertyCase,
        case: &PropertyCase,
        engine: &RuleEngine,
        today: NaiveDate,
    ) -> Option<AdjustmentBreakdown> {
        let mut data = target.feature_map(today);
        for (key, value) in case.feature_map(today) {
            data.insert(format!("comp_{key}"), value);
        }

        let results = engine.apply_rule_sets(&data);
        // the set registered last carries the combined adjustment
        let total = results.last()?.1.weighted_average;

        let mut breakdown = AdjustmentBreakdown::default();
        for (set_name, application) in &results {
            for outcome in &application.outcomes {
                breakdown
                    .components
                    .insert(format!("{set_name}_{}", outcome.name), outcome.score);
            }
        }
        breakdown.total = total;
        Some(breakdown)
    }

    fn heuristic_adjustment(
        &self,
        target: &PropertyCase,
        case: &PropertyCase,
        today: NaiveDate,
    ) -> AdjustmentBreakdown {
        let mut breakdown = AdjustmentBreakdown::default();

        // listing prices drift upward over time, so older transactions
        // are marked up
        let time = match case.time_diff_years(today) {
            Some(diff) => 1.0 + 0.05 * diff,
            None => 1.0,
        };
        breakdown.components.insert("time".to_string(), time);

        let area = match (target.size, case.size) {
            (Some(t), Some(c)) => 1.0 - 0.01 * ((t - c) / 10.0),
            _ => 1.0,
        };
        breakdown.components.insert("area".to_string(), area);

        let floor = match (
            target.floor.as_ref().and_then(utils::floor_ordinal),
            case.floor.as_ref().and_then(utils::floor_ordinal),
        ) {
            (Some(t), Some(c)) => 1.0 + 0.01 * (t - c),
            _ => 1.0,
        };
        breakdown.components.insert("floor".to_string(), floor);

        let decoration = match (
            target.fitment.as_ref().and_then(utils::fitment_ordinal),
            case.fitment.as_ref().and_then(utils::fitment_ordinal),
        ) {
            (Some(t), Some(c)) => 1.0 + 0.05 * (t - c),
            _ => 1.0,
        };
        breakdown
            .components
            .insert("decoration".to_string(), decoration);

        let current_year = today.year();
        let age = match (target.age(current_year), case.age(current_year)) {
            (Some(t), Some(c)) => 1.0 - 0.005 * (t - c) as f64,
            _ => 1.0,
        };
        breakdown.components.insert("age".to_string(), age);

        let green_rate = match (target.green_rate, case.green_rate) {
            (Some(t), Some(c)) => 1.0 + 0.2 * (t - c),
            _ => 1.0,
        };
        breakdown
            .components
            .insert("green_rate".to_string(), green_rate);

        breakdown.total = time * area * floor * decoration * age * green_rate;
        breakdown
    }
}

/// Softmax over a similarity vector. Empty input yields empty output; any
/// non-empty input sums to 1 within floating tolerance.
pub fn softmax(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Entropy-derived confidence over a weight vector of length ≥ 2:
/// `1 − H(w)/ln N`, where concentrated weights score near 1 and uniform
/// weights near 0.
pub fn weight_confidence(weights: &[f64]) -> f64 {
    let entropy: f64 = -weights
        .iter()
        .map(|w| w * (w + ENTROPY_EPSILON).ln())
        .sum::<f64>();
    1.0 - entropy / (weights.len() as f64).ln()
}
