//! Stock demonstration data: a target descriptor and three comparable
//! cases used when a caller has nothing better to offer, and by tests.

use chrono::NaiveDate;

use crate::valuation::types::PropertyCase;

fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

/// A representative valuation target: a 90 m² mid-floor, basic-fitment
/// unit built in 2015.
pub fn sample_target() -> PropertyCase {
    PropertyCase {
        size: Some(90.0),
        floor: Some("中楼层".into()),
        fitment: Some("简装".into()),
        built_time: date(2015, 1, 1),
        green_rate: Some(0.3),
        transaction_type: Some(1),
        ..Default::default()
    }
}

/// Three demonstration comparables spanning the floor and fitment ladders.
pub fn default_comparables() -> Vec<PropertyCase> {
    vec![
        PropertyCase {
            price: Some(50_000.0),
            size: Some(90.0),
            floor: Some("中楼层".into()),
            fitment: Some("精装".into()),
            built_time: date(2015, 1, 1),
            transaction_time: date(2023, 1, 1),
            green_rate: Some(0.3),
            address: Some("示例小区A".to_string()),
            transaction_type: Some(1),
            ..Default::default()
        },
        PropertyCase {
            price: Some(45_000.0),
            size: Some(120.0),
            floor: Some("低楼层".into()),
            fitment: Some("简装".into()),
            built_time: date(2010, 1, 1),
            transaction_time: date(2023, 3, 1),
            green_rate: Some(0.25),
            address: Some("示例小区B".to_string()),
            transaction_type: Some(1),
            ..Default::default()
        },
        PropertyCase {
            price: Some(55_000.0),
            size: Some(75.0),
            floor: Some("高楼层".into()),
            fitment: Some("精装".into()),
            built_time: date(2018, 1, 1),
            transaction_time: date(2023, 2, 1),
            green_rate: Some(0.35),
            address: Some("示例小区C".to_string()),
            transaction_type: Some(1),
            ..Default::default()
        },
    ]
}
