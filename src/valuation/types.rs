//! Core data types for the valuation pipeline
//! Pure data structures with no behavior beyond derived-field accessors

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::valuation::utils;

/// Feature map handed to the rule framework: feature name to value.
pub type FeatureMap = BTreeMap<String, FeatureValue>;

/// A field value that may arrive numeric or as a categorical label.
///
/// Floors and fitment states are the usual suspects: stored records carry
/// labels ("中楼层", "精装") while callers that already coerced their data
/// supply plain numbers. Both forms flow through similarity and rule
/// evaluation unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Label(String),
}

impl FeatureValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(n) => Some(*n),
            FeatureValue::Label(_) => None,
        }
    }

    pub fn as_label(&self) -> Option<&str> {
        match self {
            FeatureValue::Number(_) => None,
            FeatureValue::Label(s) => Some(s.as_str()),
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(n) => write!(f, "{}", n),
            FeatureValue::Label(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<i32> for FeatureValue {
    fn from(value: i32) -> Self {
        FeatureValue::Number(value as f64)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Label(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        FeatureValue::Label(value)
    }
}

/// A property under comparison - either the valuation target or a
/// comparable transaction. Every field is optional; absent fields fall out
/// of the arithmetic with neutral contributions rather than errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyCase {
    /// Unit price. Absent for the target; comparables without it are
    /// excluded from averaging but still scored.
    pub price: Option<f64>,
    /// 0 = settled transaction, 1 = listing.
    pub transaction_type: Option<i32>,
    pub transaction_time: Option<NaiveDate>,
    /// Green coverage as a fraction in 0-1.
    pub green_rate: Option<f64>,
    pub built_time: Option<NaiveDate>,
    /// Storey number or a band label such as "中楼层".
    pub floor: Option<FeatureValue>,
    /// Floor area in square metres.
    pub size: Option<f64>,
    /// Fitment ordinal (0 rough, 1 basic, 2 fine) or a label such as "简装".
    pub fitment: Option<FeatureValue>,
    pub structure: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    /// Distance to the target in kilometres, when a geocoder supplied one.
    pub distance_km: Option<f64>,
}

impl PropertyCase {
    /// Property age in years relative to `current_year`. Derived on demand,
    /// never stored.
    pub fn age(&self, current_year: i32) -> Option<i32> {
        self.built_time.map(|built| current_year - built.year())
    }

    /// Years elapsed since the transaction, relative to `today`. Negative
    /// when the recorded transaction date lies in the future.
    pub fn time_diff_years(&self, today: NaiveDate) -> Option<f64> {
        self.transaction_time
            .map(|t| (today - t).num_days() as f64 / 365.0)
    }

    /// Renders the case as a flat feature map for rule evaluation,
    /// including the derived `age` and `time_diff` fields.
    pub fn feature_map(&self, today: NaiveDate) -> FeatureMap {
        let mut map = FeatureMap::new();
        if let Some(price) = self.price {
            map.insert("price".into(), price.into());
        }
        if let Some(t) = self.transaction_type {
            map.insert("transaction_type".into(), t.into());
        }
        if let Some(date) = self.transaction_time {
            map.insert(
                "transaction_time".into(),
                date.format("%Y-%m-%d").to_string().into(),
            );
        }
        if let Some(rate) = self.green_rate {
            map.insert("green_rate".into(), rate.into());
        }
        if let Some(date) = self.built_time {
            map.insert(
                "built_time".into(),
                date.format("%Y-%m-%d").to_string().into(),
            );
        }
        if let Some(floor) = &self.floor {
            map.insert("floor".into(), floor.clone());
        }
        if let Some(size) = self.size {
            map.insert("size".into(), size.into());
        }
        if let Some(fitment) = &self.fitment {
            map.insert("fitment".into(), fitment.clone());
        }
        if let Some(structure) = &self.structure {
            map.insert("structure".into(), structure.clone().into());
        }
        if let Some(location) = &self.location {
            map.insert("location".into(), location.clone().into());
        }
        if let Some(address) = &self.address {
            map.insert("address".into(), address.clone().into());
        }
        if let Some(distance) = self.distance_km {
            map.insert("distance".into(), distance.into());
        }
        if let Some(age) = self.age(today.year()) {
            map.insert("age".into(), (age as f64).into());
        }
        if let Some(diff) = self.time_diff_years(today) {
            map.insert("time_diff".into(), diff.into());
        }
        map
    }
}

/// A comparable transaction exactly as the external store holds it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RawComparableRecord {
    /// Room configuration, e.g. "2室1厅1厨1卫".
    pub house_type: String,
    /// Floor label, e.g. "低楼层(共6层)".
    pub house_floor: String,
    pub house_direction: Option<String>,
    pub house_area: f64,
    pub house_structure: String,
    pub transaction_type: i32,
    /// Transaction date as stored, "%Y-%m-%d" text.
    pub transaction_time: String,
    pub house_decoration: String,
    pub is_elevator: Option<String>,
    /// Built year as stored; may be absent or hold a non-numeric marker.
    pub house_year: Option<String>,
    /// Percentage text ("35%") or plain fraction.
    pub green_rate: String,
    pub house_loc: String,
    pub house_position: Option<String>,
    pub u_price: f64,
    pub t_price: Option<f64>,
    pub detail_url: Option<String>,
}

impl RawComparableRecord {
    /// Coerces the stored row into a [`PropertyCase`] for the pricing
    /// arithmetic. Unparseable fields become `None` rather than errors.
    pub fn to_case(&self) -> PropertyCase {
        let floor = match utils::approximate_floor_level(&self.house_floor) {
            Some(level) => FeatureValue::Number(level as f64),
            None => FeatureValue::Label(self.house_floor.clone()),
        };
        let built_time = self
            .house_year
            .as_deref()
            .and_then(|y| y.trim().parse::<i32>().ok())
            .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1));

        PropertyCase {
            price: Some(self.u_price),
            transaction_type: Some(self.transaction_type),
            transaction_time: NaiveDate::parse_from_str(&self.transaction_time, "%Y-%m-%d").ok(),
            green_rate: utils::parse_green_rate(&self.green_rate),
            built_time,
            floor: Some(floor),
            size: Some(self.house_area),
            fitment: Some(FeatureValue::Label(self.house_decoration.clone())),
            structure: Some(self.house_structure.clone()),
            location: Some(self.house_loc.clone()),
            address: Some(self.house_loc.clone()),
            distance_km: None,
        }
    }
}

/// The target descriptor driving comparable selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionTarget {
    /// Community / location name; coarse filter matches on this prefix.
    pub location: String,
    /// Structure type, e.g. "平层" or "复式". Must match exactly.
    pub structure: String,
    pub built_year: i32,
    /// Floor band label, e.g. "中楼层".
    pub floor: String,
    /// Room configuration, e.g. "2室1厅1厨2卫".
    pub room_layout: String,
    /// Decoration label, e.g. "精装".
    pub decoration: String,
    /// Floor area in square metres.
    pub area: f64,
}

/// One selector result row: the record plus its scored distance columns.
#[derive(Debug, Clone)]
pub struct RankedComparable {
    pub record: RawComparableRecord,
    pub distances: DistanceBreakdown,
    /// Sum of the six min-max normalized distance columns.
    pub total_distance: f64,
}

/// The six normalized distance columns backing a ranking decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceBreakdown {
    pub floor: f64,
    pub area: f64,
    pub layout: f64,
    pub decoration: f64,
    pub built_year: f64,
    pub recency: f64,
}

/// Per-category similarity between the target and one comparable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimilarityScore {
    pub time: f64,
    pub location: f64,
    pub physical: f64,
    pub environment: f64,
    pub legal: f64,
    pub transaction: f64,
    /// Category-weighted combination of the six scores.
    pub total: f64,
}

/// The multiplicative correction applied to one comparable's price.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdjustmentBreakdown {
    /// Individual factor (or rule score) per component, keyed by name.
    pub components: BTreeMap<String, f64>,
    pub total: f64,
}

/// Everything the aggregator derived for one comparable case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseBreakdown {
    pub similarity: SimilarityScore,
    pub adjustment: AdjustmentBreakdown,
    /// Softmax weight over the priced cases; `None` when the case carried
    /// no price and was excluded from averaging.
    pub weight: Option<f64>,
    pub adjusted_price: Option<f64>,
}

/// Outcome of one estimation run. Constructed per call, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationResult {
    /// `None` when no comparable carried a usable price.
    pub estimated_price: Option<f64>,
    /// Entropy-derived weight concentration in 0-1.
    pub confidence: f64,
    /// One breakdown per input case, in input order.
    pub cases: Vec<CaseBreakdown>,
}
