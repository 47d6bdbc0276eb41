//! Rule-set registry, gradient training and directory persistence.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::rules::rule::{Rule, RangeMode, ThresholdDirection, MIN_RULE_WEIGHT};
use crate::rules::set::{RuleSet, RuleSetApplication};
use crate::valuation::types::FeatureMap;

const TRAINING_DATA_FILE: &str = "training_data.json";

/// One labelled observation for weight training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: FeatureMap,
    /// Expected rule-set output in 0-1.
    pub label: f64,
}

/// Holds named rule sets in insertion order together with the training
/// corpus. Training mutates rule weights in place, so it takes `&mut self`;
/// serve from a private copy while a replacement engine trains.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rule_sets: Vec<RuleSet>,
    training_data: Vec<TrainingSample>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine preloaded with the stock valuation rule set, for process
    /// start-up when no persisted definitions exist yet.
    pub fn with_default_rules() -> Self {
        let mut engine = Self::new();
        engine.add_rule_set(default_rule_set());
        engine
    }

    /// Registers a rule set. A set with an already-known name replaces the
    /// existing one in place, keeping its position in iteration order.
    pub fn add_rule_set(&mut self, rule_set: RuleSet) {
        match self.rule_sets.iter_mut().find(|s| s.name == rule_set.name) {
            Some(existing) => *existing = rule_set,
            None => self.rule_sets.push(rule_set),
        }
    }

    pub fn rule_sets(&self) -> &[RuleSet] {
        &self.rule_sets
    }

    pub fn rule_set(&self, name: &str) -> Option<&RuleSet> {
        self.rule_sets.iter().find(|s| s.name == name)
    }

    pub fn add_training_sample(&mut self, features: FeatureMap, label: f64) {
        self.training_data.push(TrainingSample { features, label });
    }

    pub fn extend_training_data(&mut self, samples: impl IntoIterator<Item = TrainingSample>) {
        self.training_data.extend(samples);
    }

    pub fn training_data(&self) -> &[TrainingSample] {
        &self.training_data
    }

    /// Applies every rule set to the feature map, in insertion order.
    pub fn apply_rule_sets(&self, data: &FeatureMap) -> Vec<(String, RuleSetApplication)> {
        self.rule_sets
            .iter()
            .map(|set| (set.name.clone(), set.apply(data)))
            .collect()
    }

    /// Trains rule weights by stochastic gradient descent over the corpus.
    ///
    /// Per sample and rule set: prediction is the weighted average, loss is
    /// squared error, and each trainable rule's weight moves by
    /// `lr · 2(pred − label)(score − pred)/Σweight`, clamped to the
    /// [`MIN_RULE_WEIGHT`] floor after every step. Returns the per-epoch
    /// mean loss history; an empty corpus returns an empty history.
    pub fn train(&mut self, learning_rate: f64, epochs: usize) -> Vec<f64> {
        let RuleEngine {
            rule_sets,
            training_data,
        } = self;

        if training_data.is_empty() {
            warn!("rule training requested with an empty corpus");
            return Vec::new();
        }

        info!(
            samples = training_data.len(),
            rule_sets = rule_sets.len(),
            epochs,
            "training rule weights"
        );

        let mut history = Vec::with_capacity(epochs);
        for epoch in 0..epochs {
            let mut epoch_loss = 0.0;

            for sample in training_data.iter() {
                for set in rule_sets.iter_mut() {
                    let application = set.apply(&sample.features);
                    let prediction = application.weighted_average;
                    epoch_loss += (prediction - sample.label).powi(2);

                    let gradient = 2.0 * (prediction - sample.label);
                    let total_weight: f64 = set.rules.iter().map(|r| r.weight).sum();
                    if total_weight <= 0.0 {
                        continue;
                    }

                    for (rule, outcome) in set.rules.iter_mut().zip(&application.outcomes) {
                        if !rule.is_trainable {
                            continue;
                        }
                        let weight_gradient =
                            gradient * (outcome.score - prediction) / total_weight;
                        rule.weight -= learning_rate * weight_gradient;
                        rule.weight = rule.weight.max(MIN_RULE_WEIGHT);
                    }
                }
            }

            let avg_loss = epoch_loss / training_data.len() as f64;
            history.push(avg_loss);
            if (epoch + 1) % 10 == 0 {
                debug!(epoch = epoch + 1, loss = avg_loss, "training progress");
            }
        }

        history
    }

    /// Persists each rule set as `<name>.json` plus the training corpus as
    /// `training_data.json` under `directory`.
    pub fn save(&self, directory: &Path) -> Result<()> {
        fs::create_dir_all(directory)
            .with_context(|| format!("failed to create rules directory {:?}", directory))?;

        for set in &self.rule_sets {
            let path = directory.join(format!("{}.json", set.name));
            let json = serde_json::to_string_pretty(set)
                .with_context(|| format!("failed to serialize rule set '{}'", set.name))?;
            fs::write(&path, json)
                .with_context(|| format!("failed to write rule set to {:?}", path))?;
        }

        let corpus_path = directory.join(TRAINING_DATA_FILE);
        let json = serde_json::to_string_pretty(&self.training_data)
            .context("failed to serialize training corpus")?;
        fs::write(&corpus_path, json)
            .with_context(|| format!("failed to write training corpus to {:?}", corpus_path))?;

        info!(directory = ?directory, rule_sets = self.rule_sets.len(), "saved rule engine");
        Ok(())
    }

    /// Loads every `*.json` rule-set document under `directory` (in sorted
    /// filename order, so iteration order is deterministic across
    /// platforms) plus the training corpus. A missing corpus file loads as
    /// empty; an unrecognized rule `type` tag is a hard error.
    pub fn load(directory: &Path) -> Result<Self> {
        let mut paths: Vec<_> = fs::read_dir(directory)
            .with_context(|| format!("failed to read rules directory {:?}", directory))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension().is_some_and(|ext| ext == "json")
                    && path
                        .file_name()
                        .is_some_and(|name| name != TRAINING_DATA_FILE)
            })
            .collect();
        paths.sort();

        let mut engine = RuleEngine::new();
        for path in paths {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("failed to read rule set {:?}", path))?;
            let set: RuleSet = serde_json::from_str(&json)
                .with_context(|| format!("failed to parse rule set {:?}", path))?;
            engine.add_rule_set(set);
        }

        let corpus_path = directory.join(TRAINING_DATA_FILE);
        if corpus_path.exists() {
            let json = fs::read_to_string(&corpus_path)
                .with_context(|| format!("failed to read training corpus {:?}", corpus_path))?;
            engine.training_data =
                serde_json::from_str(&json).context("failed to parse training corpus")?;
        } else {
            debug!(path = ?corpus_path, "no training corpus found, starting empty");
        }

        info!(rule_sets = engine.rule_sets.len(), "loaded rule engine");
        Ok(engine)
    }
}

/// The stock residential valuation rule set: area sweet spot, floor and
/// decoration preferences, age and amenity thresholds.
pub fn default_rule_set() -> RuleSet {
    RuleSet::new(
        "property_valuation",
        "Heuristic scoring rules for residential unit pricing",
    )
    .with_rule(Rule::range(
        "area_sweet_spot",
        "Homes between 60 and 120 square metres attract the widest demand",
        "house_area",
        60.0,
        120.0,
        RangeMode::Inside,
        20.0,
        1.0,
    ))
    .with_rule(Rule::categorical(
        "floor_preference",
        "Relative appeal of each floor band",
        "house_floor",
        &["低楼层", "中楼层", "高楼层"],
        &[0.7, 1.0, 0.8],
        0.8,
    ))
    .with_rule(Rule::categorical(
        "decoration_preference",
        "Relative appeal of each decoration state",
        "house_decorating",
        &["毛坯", "简装", "精装"],
        &[0.6, 0.8, 1.0],
        1.2,
    ))
    .with_rule(Rule::threshold(
        "age_discount",
        "Newer stock prices better",
        "house_age",
        10.0,
        ThresholdDirection::Below,
        5.0,
        0.9,
    ))
    .with_rule(Rule::threshold(
        "green_coverage",
        "Higher green coverage prices better",
        "green_rate",
        0.3,
        ThresholdDirection::Above,
        0.1,
        0.7,
    ))
    .with_rule(Rule::threshold(
        "transport_access",
        "Better transport access prices better",
        "transportation_score",
        0.7,
        ThresholdDirection::Above,
        0.2,
        1.1,
    ))
    .with_rule(Rule::threshold(
        "education_access",
        "Better school access prices better",
        "education_score",
        0.6,
        ThresholdDirection::Above,
        0.2,
        1.3,
    ))
}
