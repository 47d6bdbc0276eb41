//! Caller-facing entry points wiring selection, adjustment, aggregation,
//! explanation and rule training together.

use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::rules::{RuleEngine, TrainingSample};
use crate::store;
use crate::valuation::adjustment::AdjustmentEngine;
use crate::valuation::aggregator::Imca;
use crate::valuation::explain;
use crate::valuation::selector;
use crate::valuation::types::{
    PropertyCase, RankedComparable, RawComparableRecord, SelectionTarget, ValuationResult,
};

/// The selector's output: ranked comparable records and the classical
/// market-comparison point estimate derived from them.
#[derive(Debug, Clone)]
pub struct ComparableSelection {
    pub ranked: Vec<RankedComparable>,
    /// 0.0 when no estimate could be formed - callers treat this as
    /// "no comparables available", never as an error.
    pub classical_estimate: f64,
}

/// Fetches the city's coarse-filtered records, ranks them against the
/// target and runs the classical adjustment path over the ranked set.
pub async fn select_comparables(
    db: &PgPool,
    city: &str,
    target: &SelectionTarget,
) -> anyhow::Result<ComparableSelection> {
    let today = Utc::now().date_naive();
    let records = store::fetch_coarse_candidates(db, city, target, today).await?;
    Ok(select_from_records(target, &records, today))
}

/// The synchronous tail of [`select_comparables`], usable directly when
/// the records are already in hand.
pub fn select_from_records(
    target: &SelectionTarget,
    records: &[RawComparableRecord],
    today: NaiveDate,
) -> ComparableSelection {
    let ranked = selector::rank_comparables(target, records, today);
    if ranked.is_empty() {
        info!("no comparables survived selection, returning an empty result");
        return ComparableSelection {
            ranked,
            classical_estimate: 0.0,
        };
    }

    // The top-ranked record doubles as the pricing baseline: its fields
    // stand in for the parts of the target the descriptor does not carry
    // (transaction date, green rate), and the remaining ranked records are
    // priced against it.
    let mut baseline = ranked[0].record.to_case();
    baseline.price = None;
    let comparables: Vec<PropertyCase> = ranked[1..].iter().map(|r| r.record.to_case()).collect();

    let classical_estimate = AdjustmentEngine::new()
        .evaluate(&baseline, &comparables)
        .unwrap_or(0.0);

    ComparableSelection {
        ranked,
        classical_estimate,
    }
}

/// Similarity-weighted estimate for the target against the comparables,
/// optionally delegating price adjustment to a rule engine.
pub fn estimate(
    target: &PropertyCase,
    comparables: &[PropertyCase],
    rules: Option<&RuleEngine>,
) -> ValuationResult {
    estimate_at(target, comparables, rules, Utc::now().date_naive())
}

/// [`estimate`] with an explicit reference date, for deterministic runs.
pub fn estimate_at(
    target: &PropertyCase,
    comparables: &[PropertyCase],
    rules: Option<&RuleEngine>,
    today: NaiveDate,
) -> ValuationResult {
    Imca::new().estimate(target, comparables, rules, today)
}

/// Renders the narrative explanation for an estimation run.
pub fn explain(
    result: &ValuationResult,
    target: &PropertyCase,
    comparables: &[PropertyCase],
) -> String {
    explain_at(result, target, comparables, Utc::now().date_naive())
}

/// [`explain`] with an explicit reference date, for deterministic runs.
pub fn explain_at(
    result: &ValuationResult,
    target: &PropertyCase,
    comparables: &[PropertyCase],
    today: NaiveDate,
) -> String {
    explain::narrate(result, target, comparables, today)
}

/// Feeds labelled samples into the engine and trains its rule weights.
/// Training takes the engine by exclusive reference; serve estimates from
/// a separate copy while this runs.
pub fn train_rules(
    engine: &mut RuleEngine,
    samples: Vec<TrainingSample>,
    learning_rate: f64,
    epochs: usize,
) -> Vec<f64> {
    engine.extend_training_data(samples);
    engine.train(learning_rate, epochs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::fixtures;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn record(area: f64, year: &str, transaction: &str, price: f64) -> RawComparableRecord {
        RawComparableRecord {
            house_type: "2室1厅1厨1卫".to_string(),
            house_floor: "中楼层(共10层)".to_string(),
            house_direction: None,
            house_area: area,
            house_structure: "平层".to_string(),
            transaction_type: 1,
            transaction_time: transaction.to_string(),
            house_decoration: "精装".to_string(),
            is_elevator: None,
            house_year: Some(year.to_string()),
            green_rate: "35%".to_string(),
            house_loc: "仁恒森兰雅苑".to_string(),
            house_position: None,
            u_price: price,
            t_price: None,
            detail_url: None,
        }
    }

    fn target() -> SelectionTarget {
        SelectionTarget {
            location: "仁恒森兰雅苑".to_string(),
            structure: "平层".to_string(),
            built_year: 2013,
            floor: "中楼层".to_string(),
            room_layout: "2室1厅1厨1卫".to_string(),
            decoration: "精装".to_string(),
            area: 90.0,
        }
    }

    #[test]
    fn test_empty_records_degrade_to_no_estimate() {
        let selection = select_from_records(&target(), &[], today());
        assert!(selection.ranked.is_empty());
        assert_eq!(selection.classical_estimate, 0.0);
    }

    #[test]
    fn test_selection_prices_comparables_against_the_baseline() {
        let records = vec![
            record(90.0, "2013", "2025-01-01", 50_000.0),
            record(92.0, "2013", "2024-11-01", 51_000.0),
            record(95.0, "2014", "2024-06-01", 52_000.0),
        ];

        let selection = select_from_records(&target(), &records, today());

        assert_eq!(selection.ranked.len(), 3);
        assert!(selection.classical_estimate > 0.0);
        assert!(selection.classical_estimate.is_finite());
    }

    #[test]
    fn test_single_record_selection_yields_no_classical_estimate() {
        let records = vec![record(90.0, "2013", "2025-01-01", 50_000.0)];

        let selection = select_from_records(&target(), &records, today());

        assert_eq!(selection.ranked.len(), 1);
        assert_eq!(selection.classical_estimate, 0.0);
    }

    #[test]
    fn test_estimate_at_matches_direct_imca_call() {
        let target = fixtures::sample_target();
        let cases = fixtures::default_comparables();

        let via_pipeline = estimate_at(&target, &cases, None, today());
        let direct = Imca::new().estimate(&target, &cases, None, today());

        assert_eq!(via_pipeline.estimated_price, direct.estimated_price);
        assert_eq!(via_pipeline.confidence, direct.confidence);
    }

    #[test]
    fn test_explain_at_round_trips_through_the_pipeline() {
        let target = fixtures::sample_target();
        let cases = fixtures::default_comparables();
        let result = estimate_at(&target, &cases, None, today());

        let text = explain_at(&result, &target, &cases, today());
        assert!(text.contains("comparable cases"));
    }

    #[test]
    fn test_train_rules_appends_samples_and_returns_history() {
        let mut engine = RuleEngine::with_default_rules();
        let mut features = std::collections::BTreeMap::new();
        features.insert("house_area".to_string(), 90.0.into());
        let samples = vec![TrainingSample {
            features,
            label: 0.9,
        }];

        let history = train_rules(&mut engine, samples, 0.01, 5);
        assert_eq!(history.len(), 5);
        assert_eq!(engine.training_data().len(), 1);
    }
}
