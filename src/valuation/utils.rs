//! Parsers and coercions for the loosely-typed fields comparables arrive
//! with: floor band labels, room-layout strings, decoration ladders and
//! percentage text.

use std::sync::OnceLock;

use regex::Regex;

use crate::valuation::types::FeatureValue;

fn layout_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)室(\d+)厅(\d+)厨(\d+)卫").expect("valid layout pattern"))
}

fn digits_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+").expect("valid digits pattern"))
}

/// Floor band rank: 低 0, 中 1, 高 2. `None` when the label names no band.
pub fn floor_band(label: &str) -> Option<u32> {
    if label.contains('低') {
        Some(0)
    } else if label.contains('中') {
        Some(1)
    } else if label.contains('高') {
        Some(2)
    } else {
        None
    }
}

/// Distance between two floor labels on the band ladder: 0 same band,
/// 1 adjacent, 2 opposite extremes, 3 when either label is unparseable.
pub fn floor_band_distance(a: &str, b: &str) -> u32 {
    match (floor_band(a), floor_band(b)) {
        (Some(ra), Some(rb)) => ra.abs_diff(rb),
        _ => 3,
    }
}

/// Decoration rank on the 毛坯/简装/精装 ladder. Exact label match only.
pub fn decoration_rank(label: &str) -> Option<u32> {
    match label {
        "毛坯" => Some(0),
        "简装" => Some(1),
        "精装" => Some(2),
        _ => None,
    }
}

/// Distance between two decoration labels, tiered like floor bands.
pub fn decoration_distance(a: &str, b: &str) -> u32 {
    match (decoration_rank(a), decoration_rank(b)) {
        (Some(ra), Some(rb)) => ra.abs_diff(rb),
        _ => 3,
    }
}

/// Parses "X室Y厅Z厨W卫" into its four components.
pub fn parse_room_layout(layout: &str) -> Option<[u32; 4]> {
    let caps = layout_pattern().captures(layout)?;
    let mut parts = [0u32; 4];
    for (i, part) in parts.iter_mut().enumerate() {
        *part = caps.get(i + 1)?.as_str().parse().ok()?;
    }
    Some(parts)
}

/// Room-layout distance: equal-weighted sum of absolute component
/// differences. `None` when either side fails to parse.
pub fn layout_distance(a: &str, b: &str) -> Option<u32> {
    let pa = parse_room_layout(a)?;
    let pb = parse_room_layout(b)?;
    Some(
        pa.iter()
            .zip(pb.iter())
            .map(|(x, y)| x.abs_diff(*y))
            .sum(),
    )
}

/// Approximates a storey number from a labelled floor string such as
/// "低楼层(共12层)": the band places the storey within the extracted
/// building height (低 n/6, 中 n/2, 高 5n/6). `None` without a storey count.
pub fn approximate_floor_level(label: &str) -> Option<i32> {
    let total: i32 = digits_pattern()
        .find(label)
        .and_then(|m| m.as_str().parse().ok())?;
    let band = floor_band(label)?;
    Some(match band {
        0 => total / 6,
        1 => total / 2,
        _ => 5 * total / 6,
    })
}

/// Parses a green-coverage value from percentage text ("35%") or a plain
/// fraction ("0.35").
pub fn parse_green_rate(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if let Some(stripped) = trimmed.strip_suffix('%') {
        return stripped.trim().parse::<f64>().ok().map(|v| v / 100.0);
    }
    trimmed.parse::<f64>().ok()
}

/// Resolves a floor value to its ordinal: numbers pass through, band
/// labels map onto 0/1/2.
pub fn floor_ordinal(value: &FeatureValue) -> Option<f64> {
    match value {
        FeatureValue::Number(n) => Some(*n),
        FeatureValue::Label(label) => match label.as_str() {
            "低楼层" => Some(0.0),
            "中楼层" => Some(1.0),
            "高楼层" => Some(2.0),
            _ => None,
        },
    }
}

/// Resolves a fitment value to its ordinal: numbers pass through,
/// decoration labels map onto 0/1/2.
pub fn fitment_ordinal(value: &FeatureValue) -> Option<f64> {
    match value {
        FeatureValue::Number(n) => Some(*n),
        FeatureValue::Label(label) => decoration_rank(label).map(f64::from),
    }
}
