//! Deterministic narrative rendering of a valuation result. The text is a
//! pure function of the numeric inputs so a rerun reproduces it
//! byte-for-byte.

use std::fmt::Write;

use chrono::{Datelike, NaiveDate};

use crate::valuation::types::{FeatureValue, PropertyCase, ValuationResult};

/// Renders a human-readable account of an estimation run: headline figure,
/// ranked case list, then qualitative commentary keyed on the target's
/// fields and the overall confidence.
pub fn narrate(
    result: &ValuationResult,
    target: &PropertyCase,
    cases: &[PropertyCase],
    today: NaiveDate,
) -> String {
    let Some(estimated_price) = result.estimated_price else {
        return "Unable to produce a valuation explanation: no usable comparable cases were available.".to_string();
    };
    let confidence = result.confidence;

    let mut text = String::new();
    let _ = writeln!(
        text,
        "Based on the intelligent market comparison approach, the estimated unit price for the target property is {:.2} per square metre, with a confidence of {:.2}%.",
        estimated_price,
        confidence * 100.0
    );
    text.push('\n');

    let _ = writeln!(text, "The analysis used the following comparable cases:");
    for (i, (case, breakdown)) in cases.iter().zip(&result.cases).enumerate() {
        let price = match case.price {
            Some(p) => format!("{}", p),
            None => "n/a".to_string(),
        };
        let address = case.address.as_deref().unwrap_or("unknown address");
        let weight = match breakdown.weight {
            Some(w) => format!("{:.2}%", w * 100.0),
            None => "n/a".to_string(),
        };
        let _ = writeln!(
            text,
            "Case {}: unit price {}, located at {}, similarity {:.2}%, weight {}",
            i + 1,
            price,
            address,
            breakdown.similarity.total * 100.0,
            weight
        );
    }

    let _ = writeln!(text, "\nKey influencing factors:");

    if let Some(size) = target.size {
        let verdict = if size > 120.0 {
            "a large home, which pulls the unit price down"
        } else if size < 60.0 {
            "a compact home, which pushes the unit price up"
        } else {
            "a mid-sized home with a typical unit price"
        };
        let _ = writeln!(
            text,
            "- Area: the target property measures {} square metres, {}.",
            size, verdict
        );
    }

    if let Some(floor) = &target.floor {
        let verdict = if is_high_floor(floor) {
            "giving good outlook and light, a positive for the price"
        } else if is_low_floor(floor) {
            "offering easy access but limited outlook, a modest negative for the price"
        } else {
            "a middle floor with neutral price impact"
        };
        let _ = writeln!(
            text,
            "- Floor: the target property sits on {}, {}.",
            floor, verdict
        );
    }

    if let Some(fitment) = &target.fitment {
        let verdict = if is_fine_fitment(fitment) {
            "a well-finished interior with a clear positive price impact"
        } else if is_basic_fitment(fitment) {
            "a basic fit-out with a mild positive price impact"
        } else {
            "an unfinished shell that needs a fit-out budget, a modest negative for the price"
        };
        let _ = writeln!(
            text,
            "- Fitment: the target property is {}, {}.",
            fitment, verdict
        );
    }

    if let Some(age) = target.age(today.year()) {
        let verdict = if age < 5 {
            "effectively new stock, a positive for the price"
        } else if age > 20 {
            "older stock that may need upkeep, a modest negative for the price"
        } else {
            "mid-aged stock with neutral price impact"
        };
        let _ = writeln!(
            text,
            "- Age: the target property is {} years old, {}.",
            age, verdict
        );
    }

    let verdict = if confidence > 0.8 {
        "indicating the comparable cases closely match the target property and the estimate is highly reliable"
    } else if confidence > 0.5 {
        "indicating a moderate match between the comparable cases and the target property"
    } else {
        "indicating limited similarity between the comparable cases and the target property; treat the estimate as indicative only"
    };
    let _ = write!(
        text,
        "\nThe valuation confidence is {:.2}%, {}.",
        confidence * 100.0,
        verdict
    );

    text
}

fn is_high_floor(floor: &FeatureValue) -> bool {
    match floor {
        FeatureValue::Label(label) => label == "高楼层",
        FeatureValue::Number(n) => *n > 10.0,
    }
}

fn is_low_floor(floor: &FeatureValue) -> bool {
    match floor {
        FeatureValue::Label(label) => label == "低楼层",
        FeatureValue::Number(n) => *n < 3.0,
    }
}

fn is_fine_fitment(fitment: &FeatureValue) -> bool {
    match fitment {
        FeatureValue::Label(label) => label == "精装",
        FeatureValue::Number(n) => *n == 2.0,
    }
}

fn is_basic_fitment(fitment: &FeatureValue) -> bool {
    match fitment {
        FeatureValue::Label(label) => label == "简装",
        FeatureValue::Number(n) => *n == 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::aggregator::Imca;
    use crate::valuation::fixtures;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn run_fixture() -> (ValuationResult, PropertyCase, Vec<PropertyCase>) {
        let target = fixtures::sample_target();
        let cases = fixtures::default_comparables();
        let result = Imca::new().estimate(&target, &cases, None, today());
        (result, target, cases)
    }

    #[test]
    fn test_narrative_is_reproducible() {
        let (result, target, cases) = run_fixture();

        let first = narrate(&result, &target, &cases, today());
        let second = narrate(&result, &target, &cases, today());
        assert_eq!(first, second);
    }

    #[test]
    fn test_narrative_lists_every_case() {
        let (result, target, cases) = run_fixture();
        let text = narrate(&result, &target, &cases, today());

        assert!(text.contains("Case 1"));
        assert!(text.contains("Case 2"));
        assert!(text.contains("Case 3"));
        assert!(text.contains("示例小区A"));
        assert!(text.contains("50000"));
    }

    #[test]
    fn test_narrative_covers_target_commentary() {
        let (result, target, cases) = run_fixture();
        let text = narrate(&result, &target, &cases, today());

        assert!(text.contains("90 square metres"));
        assert!(text.contains("中楼层"));
        assert!(text.contains("basic fit-out"));
        assert!(text.contains("9 years old"));
        assert!(text.contains("The valuation confidence is"));
    }

    #[test]
    fn test_priceless_case_renders_na_weight() {
        let target = fixtures::sample_target();
        let mut cases = fixtures::default_comparables();
        cases[2].price = None;
        let result = Imca::new().estimate(&target, &cases, None, today());

        let text = narrate(&result, &target, &cases, today());
        assert!(text.contains("Case 3: unit price n/a"));
        assert!(text.contains("weight n/a"));
    }

    #[test]
    fn test_null_estimate_has_fixed_message() {
        let target = fixtures::sample_target();
        let mut cases = fixtures::default_comparables();
        for case in &mut cases {
            case.price = None;
        }
        let result = Imca::new().estimate(&target, &cases, None, today());

        let text = narrate(&result, &target, &cases, today());
        assert!(text.starts_with("Unable to produce a valuation explanation"));
    }
}
