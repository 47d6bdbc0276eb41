//! Comparable-case store boundary - read-only access to the per-city
//! transaction tables, plus the coarse filter that runs inside Postgres.

use anyhow::Context;
use chrono::{Duration, NaiveDate};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::valuation::types::{RawComparableRecord, SelectionTarget};

/// Known city partitions and their backing tables.
const CITY_TABLES: &[(&str, &str)] = &[("上海", "shanghai"), ("北京", "beijing")];

/// Coarse filter keeps transactions within this many days of today.
const TRANSACTION_WINDOW_DAYS: i64 = 2 * 365;

/// Built year must lie within this many years of the target's.
const BUILT_YEAR_TOLERANCE: i32 = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no comparable table configured for city '{0}'")]
    UnknownCity(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Resolves a city key to its transaction table.
pub fn city_table(city: &str) -> Result<&'static str, StoreError> {
    CITY_TABLES
        .iter()
        .find(|(key, _)| *key == city)
        .map(|(_, table)| *table)
        .ok_or_else(|| StoreError::UnknownCity(city.to_string()))
}

/// Connects to the comparable-case database configured via `DATABASE_URL`.
pub async fn connect_from_env() -> anyhow::Result<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    info!("Database connected");
    Ok(pool)
}

/// Runs the coarse filter against the city's table: same location prefix,
/// same structure type, built year within tolerance (rows with an unknown
/// year pass through so the selector can impute them), and a transaction
/// inside the rolling two-year window ending today.
pub async fn fetch_coarse_candidates(
    db: &PgPool,
    city: &str,
    target: &SelectionTarget,
    today: NaiveDate,
) -> Result<Vec<RawComparableRecord>, StoreError> {
    let table = city_table(city)?;
    let window_start = (today - Duration::days(TRANSACTION_WINDOW_DAYS))
        .format("%Y-%m-%d")
        .to_string();

    // table names come from the static registry above, never from input
    let query = format!(
        r#"
        SELECT house_type, house_floor, house_direction, house_area,
               house_structure, transaction_type, transaction_time,
               house_decoration, is_elevator, house_year, green_rate,
               house_loc, house_position, u_price, t_price, detail_url
        FROM {table}
        WHERE house_loc LIKE $1
          AND house_structure = $2
          AND (CASE WHEN house_year ~ '^\d+$'
                    THEN ABS(house_year::int - $3) <= $4
                    ELSE TRUE END)
          AND transaction_time >= $5
        "#
    );

    let records = sqlx::query_as::<_, RawComparableRecord>(&query)
        .bind(format!("{}%", target.location))
        .bind(&target.structure)
        .bind(target.built_year)
        .bind(BUILT_YEAR_TOLERANCE)
        .bind(window_start)
        .fetch_all(db)
        .await?;

    info!(
        city,
        location = %target.location,
        candidates = records.len(),
        "coarse-filtered comparable records"
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_table_lookup() {
        assert_eq!(city_table("上海").unwrap(), "shanghai");
        assert_eq!(city_table("北京").unwrap(), "beijing");
    }

    #[test]
    fn test_unknown_city_is_a_typed_error() {
        match city_table("广州") {
            Err(StoreError::UnknownCity(city)) => assert_eq!(city, "广州"),
            other => panic!("expected UnknownCity, got {:?}", other),
        }
    }
}
