//! Classical market-comparison arithmetic: per-field diff codes feeding a
//! multiplicative price correction, averaged over the comparable set.

use tracing::warn;

use crate::valuation::types::PropertyCase;
use crate::valuation::utils;

/// Per-field adjustment percentages applied per diff-code step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustmentSteps {
    pub transaction_type: f64,
    pub transaction_time: f64,
    pub green_rate: f64,
    pub built_time: f64,
    pub floor: f64,
    pub size: f64,
    pub fitment: f64,
}

impl Default for AdjustmentSteps {
    fn default() -> Self {
        AdjustmentSteps {
            transaction_type: 0.05,
            transaction_time: 0.02,
            green_rate: 0.05,
            built_time: 0.03,
            floor: 0.05,
            size: 0.05,
            fitment: 0.05,
        }
    }
}

/// Field selector for step overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentField {
    TransactionType,
    TransactionTime,
    GreenRate,
    BuiltTime,
    Floor,
    Size,
    Fitment,
}

/// Deterministic, non-trainable price adjuster. Each shared field between
/// target and candidate contributes a signed diff code; the candidate's
/// price is corrected by `Π(1 + diff·step)`.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentEngine {
    steps: AdjustmentSteps,
}

impl AdjustmentEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: AdjustmentSteps) -> Self {
        AdjustmentEngine { steps }
    }

    pub fn steps(&self) -> &AdjustmentSteps {
        &self.steps
    }

    /// Overrides a single field's step percentage.
    pub fn set_step(&mut self, field: AdjustmentField, step: f64) {
        match field {
            AdjustmentField::TransactionType => self.steps.transaction_type = step,
            AdjustmentField::TransactionTime => self.steps.transaction_time = step,
            AdjustmentField::GreenRate => self.steps.green_rate = step,
            AdjustmentField::BuiltTime => self.steps.built_time = step,
            AdjustmentField::Floor => self.steps.floor = step,
            AdjustmentField::Size => self.steps.size = step,
            AdjustmentField::Fitment => self.steps.fitment = step,
        }
    }

    /// The multiplicative correction for one candidate. Fields absent on
    /// either side (or unresolvable labels) contribute factor 1.
    pub fn factor(&self, target: &PropertyCase, case: &PropertyCase) -> f64 {
        let mut factor = 1.0;

        if let (Some(case_type), Some(target_type)) = (case.transaction_type, target.transaction_type)
        {
            let diff = -(case_type - target_type) as f64;
            factor *= 1.0 + diff * self.steps.transaction_type;
        }

        if let (Some(case_date), Some(target_date)) = (case.transaction_time, target.transaction_time)
        {
            let year_diff = (case_date - target_date).num_days().abs() / 365;
            let mut diff = match year_diff {
                0 => 0.0,
                1..=2 => 1.0,
                _ => 2.0,
            };
            if case_date > target_date {
                diff = -diff;
            }
            factor *= 1.0 + diff * self.steps.transaction_time;
        }

        if let (Some(case_rate), Some(target_rate)) = (case.green_rate, target.green_rate) {
            let delta = (case_rate - target_rate).abs();
            let mut diff = if delta < 0.3 {
                0.0
            } else if delta <= 0.5 {
                1.0
            } else {
                2.0
            };
            if case_rate > target_rate {
                diff = -diff;
            }
            factor *= 1.0 + diff * self.steps.green_rate;
        }

        if let (Some(case_built), Some(target_built)) = (case.built_time, target.built_time) {
            let mut diff = ((case_built - target_built).num_days().abs() / 365 / 5) as f64;
            if case_built > target_built {
                diff = -diff;
            }
            factor *= 1.0 + diff * self.steps.built_time;
        }

        if let (Some(case_floor), Some(target_floor)) = (
            case.floor.as_ref().and_then(utils::floor_ordinal),
            target.floor.as_ref().and_then(utils::floor_ordinal),
        ) {
            let mut diff = ((case_floor - target_floor).abs().floor() as i64 / 5) as f64;
            if case_floor > target_floor {
                diff = -diff;
            }
            factor *= 1.0 + diff * self.steps.floor;
        }

        if let (Some(case_size), Some(target_size)) = (case.size, target.size) {
            if target_size > 0.0 {
                let rel = (case_size - target_size).abs() / target_size;
                let mut diff = if rel < 0.2 {
                    0.0
                } else if rel <= 0.5 {
                    1.0
                } else {
                    2.0
                };
                if case_size < target_size {
                    diff = -diff;
                }
                factor *= 1.0 + diff * self.steps.size;
            }
        }

        if let (Some(case_fit), Some(target_fit)) = (
            case.fitment.as_ref().and_then(utils::fitment_ordinal),
            target.fitment.as_ref().and_then(utils::fitment_ordinal),
        ) {
            let diff = -(case_fit - target_fit);
            factor *= 1.0 + diff * self.steps.fitment;
        }

        factor
    }

    /// Adjusted price per candidate; `None` for candidates without a price
    /// (logged and excluded from averaging downstream).
    pub fn adjusted_prices(&self, target: &PropertyCase, cases: &[PropertyCase]) -> Vec<Option<f64>> {
        cases
            .iter()
            .enumerate()
            .map(|(i, case)| match case.price {
                Some(price) => Some(price * self.factor(target, case)),
                None => {
                    warn!(case = i + 1, "comparable case is missing a price, skipping");
                    None
                }
            })
            .collect()
    }

    /// Point estimate: the unweighted mean of all adjusted prices. `None`
    /// when no candidate carried a price.
    pub fn evaluate(&self, target: &PropertyCase, cases: &[PropertyCase]) -> Option<f64> {
        let adjusted: Vec<f64> = self
            .adjusted_prices(target, cases)
            .into_iter()
            .flatten()
            .collect();
        if adjusted.is_empty() {
            return None;
        }
        Some(adjusted.iter().sum::<f64>() / adjusted.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::types::FeatureValue;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn base_case(price: Option<f64>) -> PropertyCase {
        PropertyCase {
            price,
            transaction_type: Some(1),
            transaction_time: Some(date(2024, 6, 1)),
            green_rate: Some(0.35),
            built_time: Some(date(2013, 1, 1)),
            floor: Some(FeatureValue::Number(3.0)),
            size: Some(90.0),
            fitment: Some(FeatureValue::Number(1.0)),
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_cases_have_unit_factor() {
        let engine = AdjustmentEngine::new();
        let target = base_case(None);
        let case = base_case(Some(50_000.0));

        assert!((engine.factor(&target, &case) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_steps_yield_unit_factor() {
        let engine = AdjustmentEngine::with_steps(AdjustmentSteps {
            transaction_type: 0.0,
            transaction_time: 0.0,
            green_rate: 0.0,
            built_time: 0.0,
            floor: 0.0,
            size: 0.0,
            fitment: 0.0,
        });
        let target = base_case(None);
        let mut case = base_case(Some(50_000.0));
        case.size = Some(140.0);
        case.fitment = Some(FeatureValue::Number(2.0));
        case.transaction_time = Some(date(2021, 6, 1));

        assert!((engine.factor(&target, &case) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_factor_is_multiplicative_over_price() {
        let engine = AdjustmentEngine::new();
        let target = base_case(None);
        let mut case = base_case(Some(0.0));
        case.fitment = Some(FeatureValue::Number(2.0));

        let adjusted = engine.adjusted_prices(&target, &[case]);
        assert_eq!(adjusted, vec![Some(0.0)]);
    }

    #[test]
    fn test_older_transaction_raises_the_price() {
        let engine = AdjustmentEngine::new();
        let target = base_case(None);
        let mut case = base_case(Some(50_000.0));
        // transacted about eighteen months before the target's reference date
        case.transaction_time = Some(date(2023, 1, 1));

        let factor = engine.factor(&target, &case);
        assert!((factor - 1.02).abs() < 1e-9);
    }

    #[test]
    fn test_newer_transaction_lowers_the_price() {
        let engine = AdjustmentEngine::new();
        let mut target = base_case(None);
        target.transaction_time = Some(date(2023, 1, 1));
        let case = base_case(Some(50_000.0));

        let factor = engine.factor(&target, &case);
        assert!((factor - 0.98).abs() < 1e-9);
    }

    #[test]
    fn test_better_fitment_discounts_the_case() {
        let engine = AdjustmentEngine::new();
        let target = base_case(None);
        let mut case = base_case(Some(50_000.0));
        case.fitment = Some(FeatureValue::Label("精装".to_string()));

        // case is one rung above the target on the fitment ladder
        let factor = engine.factor(&target, &case);
        assert!((factor - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_smaller_case_discounts_the_case() {
        let engine = AdjustmentEngine::new();
        let target = base_case(None);
        let mut case = base_case(Some(50_000.0));
        case.size = Some(60.0); // a third smaller than the 90 m² target

        let factor = engine.factor(&target, &case);
        assert!((factor - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_missing_fields_are_skipped() {
        let engine = AdjustmentEngine::new();
        let target = PropertyCase {
            size: Some(90.0),
            ..Default::default()
        };
        let case = PropertyCase {
            price: Some(40_000.0),
            size: Some(95.0),
            fitment: Some(FeatureValue::Number(2.0)), // target has no fitment
            ..Default::default()
        };

        assert!((engine.factor(&target, &case) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_averages_adjusted_prices() {
        let engine = AdjustmentEngine::new();
        let target = base_case(None);
        let cases = vec![base_case(Some(50_000.0)), base_case(Some(60_000.0))];

        let estimate = engine.evaluate(&target, &cases).unwrap();
        assert!((estimate - 55_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_priceless_cases_are_excluded_not_fatal() {
        let engine = AdjustmentEngine::new();
        let target = base_case(None);
        let cases = vec![base_case(Some(50_000.0)), base_case(None)];

        let estimate = engine.evaluate(&target, &cases).unwrap();
        assert!((estimate - 50_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_priced_cases_yields_none() {
        let engine = AdjustmentEngine::new();
        let target = base_case(None);
        assert!(engine.evaluate(&target, &[base_case(None)]).is_none());
    }

    #[test]
    fn test_set_step_overrides_one_field() {
        let mut engine = AdjustmentEngine::new();
        engine.set_step(AdjustmentField::Fitment, 0.10);
        let target = base_case(None);
        let mut case = base_case(Some(50_000.0));
        case.fitment = Some(FeatureValue::Number(0.0));

        let factor = engine.factor(&target, &case);
        assert!((factor - 1.10).abs() < 1e-9);
    }
}
