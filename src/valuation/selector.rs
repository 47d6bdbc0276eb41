//! Candidate selection - narrows a coarse-filtered record set down to the
//! closest comparables by multi-feature distance.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::valuation::types::{DistanceBreakdown, RankedComparable, RawComparableRecord, SelectionTarget};
use crate::valuation::utils;

/// Marker some scraped sources use for an absent field.
const NO_DATA_MARKER: &str = "暂无数据";

/// Selector output is capped at this many records.
const MAX_COMPARABLES: usize = 3;

/// Ranks coarse-filtered records against the target and returns the top
/// three by total normalized distance. An empty input (or one with no
/// scoreable rows) yields an empty ranking, never an error.
pub fn rank_comparables(
    target: &SelectionTarget,
    records: &[RawComparableRecord],
    today: NaiveDate,
) -> Vec<RankedComparable> {
    let usable: Vec<&RawComparableRecord> = records
        .iter()
        .filter(|r| !has_missing_markers(r))
        .collect();
    if usable.is_empty() {
        debug!("no scoreable records after coarse filtering");
        return Vec::new();
    }

    let imputed_year = mean_built_year(&usable).unwrap_or(target.built_year);

    // raw distance columns, one row per record
    let mut columns = [
        Vec::with_capacity(usable.len()), // floor
        Vec::with_capacity(usable.len()), // area
        Vec::with_capacity(usable.len()), // layout
        Vec::with_capacity(usable.len()), // decoration
        Vec::with_capacity(usable.len()), // built year
        Vec::with_capacity(usable.len()), // recency
    ];
    for record in &usable {
        columns[0].push(utils::floor_band_distance(&record.house_floor, &target.floor) as f64);
        columns[1].push((record.house_area - target.area).abs());
        columns[2].push(
            utils::layout_distance(&record.house_type, &target.room_layout)
                .map(f64::from)
                .unwrap_or(0.0),
        );
        columns[3]
            .push(utils::decoration_distance(&record.house_decoration, &target.decoration) as f64);
        let year = record
            .house_year
            .as_deref()
            .and_then(|y| y.trim().parse::<i32>().ok())
            .unwrap_or(imputed_year);
        columns[4].push((year - target.built_year).abs() as f64);
        columns[5].push(recency_distance(&record.transaction_time, today));
    }

    for column in &mut columns {
        min_max_normalize(column);
    }

    let mut ranked: Vec<RankedComparable> = usable
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let distances = DistanceBreakdown {
                floor: columns[0][i],
                area: columns[1][i],
                layout: columns[2][i],
                decoration: columns[3][i],
                built_year: columns[4][i],
                recency: columns[5][i],
            };
            let total_distance = distances.floor
                + distances.area
                + distances.layout
                + distances.decoration
                + distances.built_year
                + distances.recency;
            RankedComparable {
                record: (*record).clone(),
                distances,
                total_distance,
            }
        })
        .collect();

    ranked.sort_by(|a, b| a.total_distance.total_cmp(&b.total_distance));
    ranked.truncate(MAX_COMPARABLES);

    info!(
        candidates = usable.len(),
        selected = ranked.len(),
        "ranked comparable candidates"
    );
    ranked
}

/// In-place min-max scaling into `[0, 1]`. A constant column scales to 0
/// for every row.
pub fn min_max_normalize(column: &mut [f64]) {
    let Some(min) = column.iter().copied().reduce(f64::min) else {
        return;
    };
    let max = column.iter().copied().reduce(f64::max).unwrap_or(min);
    let range = max - min;
    if range <= 0.0 {
        column.fill(0.0);
        return;
    }
    for value in column.iter_mut() {
        *value = (*value - min) / range;
    }
}

fn has_missing_markers(record: &RawComparableRecord) -> bool {
    record.house_floor.contains(NO_DATA_MARKER)
        || record.house_type.contains(NO_DATA_MARKER)
        || record.house_decoration.contains(NO_DATA_MARKER)
        || record.transaction_time.contains(NO_DATA_MARKER)
}

/// Mean built year over records with a known numeric year, truncated the
/// way the repair step expects.
fn mean_built_year(records: &[&RawComparableRecord]) -> Option<i32> {
    let known: Vec<i32> = records
        .iter()
        .filter_map(|r| r.house_year.as_deref())
        .filter_map(|y| y.trim().parse::<i32>().ok())
        .collect();
    if known.is_empty() {
        return None;
    }
    Some((known.iter().map(|&y| y as i64).sum::<i64>() / known.len() as i64) as i32)
}

/// Absolute day distance between a stored transaction date and today.
/// Unparseable dates contribute neutral distance 0.
fn recency_distance(transaction_time: &str, today: NaiveDate) -> f64 {
    match NaiveDate::parse_from_str(transaction_time.trim(), "%Y-%m-%d") {
        Ok(date) => (today - date).num_days().abs() as f64,
        Err(_) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        floor: &str,
        area: f64,
        layout: &str,
        decoration: &str,
        year: Option<&str>,
        transaction: &str,
        price: f64,
    ) -> RawComparableRecord {
        RawComparableRecord {
            house_type: layout.to_string(),
            house_floor: floor.to_string(),
            house_direction: None,
            house_area: area,
            house_structure: "平层".to_string(),
            transaction_type: 1,
            transaction_time: transaction.to_string(),
            house_decoration: decoration.to_string(),
            is_elevator: None,
            house_year: year.map(|y| y.to_string()),
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

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn test_empty_input_yields_empty_ranking() {
        assert!(rank_comparables(&target(), &[], today()).is_empty());
    }

    #[test]
    fn test_returns_at_most_three_sorted_records() {
        let records = vec![
            record("中楼层", 91.0, "2室1厅1厨1卫", "精装", Some("2013"), "2025-01-01", 50_000.0),
            record("低楼层", 70.0, "1室1厅1厨1卫", "简装", Some("2010"), "2023-06-01", 45_000.0),
            record("高楼层", 120.0, "4室2厅1厨2卫", "毛坯", Some("2016"), "2024-01-01", 55_000.0),
            record("中楼层", 95.0, "2室1厅1厨1卫", "精装", Some("2014"), "2024-12-01", 52_000.0),
        ];

        let ranked = rank_comparables(&target(), &records, today());

        assert_eq!(ranked.len(), 3);
        for pair in ranked.windows(2) {
            assert!(pair[0].total_distance <= pair[1].total_distance);
        }
        // the near-identical first record must rank first
        assert_eq!(ranked[0].record.house_area, 91.0);
    }

    #[test]
    fn test_identical_floor_labels_collapse_the_column() {
        let records = vec![
            record("中楼层", 80.0, "2室1厅1厨1卫", "精装", Some("2013"), "2025-01-01", 50_000.0),
            record("中楼层", 100.0, "3室1厅1厨1卫", "简装", Some("2011"), "2024-01-01", 45_000.0),
            record("中楼层", 95.0, "2室2厅1厨1卫", "毛坯", Some("2015"), "2023-01-01", 55_000.0),
        ];

        let ranked = rank_comparables(&target(), &records, today());

        assert_eq!(ranked.len(), 3);
        for r in &ranked {
            assert_eq!(r.distances.floor, 0.0);
        }
    }

    #[test]
    fn test_unknown_year_is_imputed_from_known_years() {
        let records = vec![
            record("中楼层", 90.0, "2室1厅1厨1卫", "精装", Some("2010"), "2024-01-01", 50_000.0),
            record("中楼层", 90.0, "2室1厅1厨1卫", "精装", Some("2016"), "2024-01-01", 50_000.0),
            record("中楼层", 90.0, "2室1厅1厨1卫", "精装", Some("未知"), "2024-01-01", 50_000.0),
        ];

        let ranked = rank_comparables(&target(), &records, today());

        // imputed mean year (2013) equals the target year, so the unknown-year
        // record is the closest of the three on the year column
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].record.house_year.as_deref(), Some("未知"));
        assert_eq!(ranked[0].distances.built_year, 0.0);
    }

    #[test]
    fn test_no_data_rows_are_dropped() {
        let records = vec![
            record("暂无数据", 90.0, "2室1厅1厨1卫", "精装", Some("2013"), "2024-01-01", 50_000.0),
            record("中楼层", 90.0, "2室1厅1厨1卫", "精装", Some("2013"), "2024-01-01", 50_000.0),
        ];

        let ranked = rank_comparables(&target(), &records, today());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].record.house_floor, "中楼层");
    }

    #[test]
    fn test_min_max_constant_column_scales_to_zero() {
        let mut column = vec![4.2, 4.2, 4.2];
        min_max_normalize(&mut column);
        assert_eq!(column, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_min_max_scales_into_unit_interval() {
        let mut column = vec![10.0, 20.0, 30.0];
        min_max_normalize(&mut column);
        assert_eq!(column, vec![0.0, 0.5, 1.0]);
    }
}
