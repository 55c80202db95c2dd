//! Synthetic measurement generation.
//!
//! Used as the ingestion fallback when the upstream API is unavailable or
//! returns nothing usable. Values follow plausible urban ranges with a
//! daily sinusoidal component; rows step backwards from `now` at hourly
//! intervals and de-duplicate against existing rows like real ingests.

use chrono::{DateTime, Duration, Utc};
use diesel::PgConnection;
use log::{error, info};
use rand::Rng;
use rand::rngs::SmallRng;
use std::f64::consts::PI;

use crate::db::models::{NewMeasurement, data_source};
use crate::geo::round_to;
use crate::store;

pub const MAX_SYNTHETIC_ROWS: usize = 20;

#[derive(Debug, Default)]
pub struct SyntheticOutcome {
    pub inserted: usize,
    pub skipped_duplicates: usize,
    pub failed: usize,
}

/// Builds the candidate rows without touching the store.
pub fn synthetic_rows(
    center_lat: f64,
    center_lng: f64,
    limit: usize,
    now: DateTime<Utc>,
    rng: &mut SmallRng,
) -> Vec<NewMeasurement> {
    let count = limit.min(MAX_SYNTHETIC_ROWS);
    let day_phase = ((now.timestamp_millis() as f64 / 86_400_000.0) * PI).sin() * 5.0;

    (0..count)
        .map(|i| {
            let lat = center_lat + rng.random_range(-0.05..=0.05);
            let lng = center_lng + rng.random_range(-0.05..=0.05);
            let base_pm25 = 15.0 + rng.random_range(0.0..30.0);
            let pm25 = (base_pm25 + day_phase + rng.random_range(-5.0..=5.0)).max(5.0);

            let mut row = NewMeasurement::new(lat, lng, round_to(pm25, 1), data_source::SYNTHETIC);
            row.measurement_date = Some(now - Duration::hours(i as i64));
            row.aod_value = Some(0.1 + rng.random_range(0.0..0.3));
            row.no2_value = Some(0.00001 + rng.random_range(0.0..0.00005));
            row.temperature = Some(15.0 + rng.random_range(0.0..20.0));
            row.humidity = Some(40.0 + rng.random_range(0.0..40.0));
            row.wind_speed = Some(2.0 + rng.random_range(0.0..6.0));
            row
        })
        .collect()
}

/// Generates and inserts synthetic rows around the given center.
/// Per-row failures are counted and do not abort the batch.
pub fn generate(
    conn: &mut PgConnection,
    center_lat: f64,
    center_lng: f64,
    limit: usize,
    now: DateTime<Utc>,
    rng: &mut SmallRng,
) -> SyntheticOutcome {
    let rows = synthetic_rows(center_lat, center_lng, limit, now, rng);
    let mut outcome = SyntheticOutcome::default();

    for row in &rows {
        let date = row.measurement_date.unwrap_or(now);
        match store::duplicate_exists(conn, row.latitude, row.longitude, date, &row.data_source) {
            Ok(true) => {
                outcome.skipped_duplicates += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Synthetic duplicate check failed: {}", e);
                outcome.failed += 1;
                continue;
            }
        }
        match store::insert_measurement(conn, row) {
            Ok(_) => outcome.inserted += 1,
            Err(e) => {
                error!("Synthetic insert failed: {}", e);
                outcome.failed += 1;
            }
        }
    }

    info!(
        "Synthetic data: generated {} row(s) (inserted={}, duplicates={}, failed={})",
        rows.len(),
        outcome.inserted,
        outcome.skipped_duplicates,
        outcome.failed
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;

    #[test]
    fn row_count_is_capped_at_twenty() {
        let mut rng = SmallRng::seed_from_u64(1);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(synthetic_rows(40.7, -74.0, 100, now, &mut rng).len(), 20);
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(synthetic_rows(40.7, -74.0, 5, now, &mut rng).len(), 5);
    }

    #[test]
    fn rows_step_backwards_hourly_from_now() {
        let mut rng = SmallRng::seed_from_u64(2);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let rows = synthetic_rows(40.7, -74.0, 3, now, &mut rng);
        assert_eq!(rows[0].measurement_date, Some(now));
        assert_eq!(rows[1].measurement_date, Some(now - Duration::hours(1)));
        assert_eq!(rows[2].measurement_date, Some(now - Duration::hours(2)));
    }

    #[test]
    fn generated_values_stay_in_plausible_ranges() {
        let now = Utc.with_ymd_and_hms(2024, 8, 15, 6, 0, 0).unwrap();
        for seed in 0..30u64 {
            let mut rng = SmallRng::seed_from_u64(seed);
            for row in synthetic_rows(40.7128, -74.006, 20, now, &mut rng) {
                assert!((row.latitude - 40.7128).abs() <= 0.05 + 1e-9);
                assert!((row.longitude - -74.006).abs() <= 0.05 + 1e-9);
                assert!(row.pm25_value >= 5.0 && row.pm25_value < 60.0);
                let aod = row.aod_value.unwrap();
                assert!((0.1..0.4).contains(&aod));
                let no2 = row.no2_value.unwrap();
                assert!((0.00001..0.00006).contains(&no2));
                let temp = row.temperature.unwrap();
                assert!((15.0..35.0).contains(&temp));
                let hum = row.humidity.unwrap();
                assert!((40.0..80.0).contains(&hum));
                let wind = row.wind_speed.unwrap();
                assert!((2.0..8.0).contains(&wind));
                assert!(!row.is_prediction);
                assert_eq!(row.data_source, "synthetic");
            }
        }
    }

    #[test]
    fn same_seed_generates_identical_rows() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut rng_a = SmallRng::seed_from_u64(9);
        let mut rng_b = SmallRng::seed_from_u64(9);
        let a = synthetic_rows(40.7, -74.0, 10, now, &mut rng_a);
        let b = synthetic_rows(40.7, -74.0, 10, now, &mut rng_b);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.latitude, y.latitude);
            assert_eq!(x.pm25_value, y.pm25_value);
        }
    }
}
