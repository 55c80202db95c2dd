//! Data-quality scoring for measurement records.
//!
//! The score is binary: 1.0 when every present field sits inside its
//! physically plausible range, 0.0 otherwise. It is computed at query time
//! and never stored. The pm25 band here is exclusive (0, 500), stricter
//! than the inclusive [0, 500] accepted by the write path.

use crate::db::models::Measurement;

fn optional_in_range(value: Option<f64>, ok: impl Fn(f64) -> bool) -> bool {
    value.map(ok).unwrap_or(true)
}

/// Binary plausibility score over a record's field ranges.
pub fn score(record: &Measurement) -> f64 {
    let plausible = record.pm25_value > 0.0
        && record.pm25_value < 500.0
        && optional_in_range(record.aod_value, |v| (0.0..=5.0).contains(&v))
        && optional_in_range(record.no2_value, |v| (0.0..=0.001).contains(&v))
        && optional_in_range(record.temperature, |v| v > -50.0 && v < 60.0)
        && optional_in_range(record.humidity, |v| (0.0..=100.0).contains(&v))
        && optional_in_range(record.wind_speed, |v| v >= 0.0 && v < 50.0);

    if plausible { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(pm25: f64) -> Measurement {
        Measurement {
            id: 1,
            latitude: 40.0,
            longitude: -74.0,
            pm25_value: pm25,
            aod_value: None,
            no2_value: None,
            temperature: None,
            humidity: None,
            wind_speed: None,
            measurement_date: Utc::now(),
            data_source: "manual".to_string(),
            is_prediction: false,
            model_version: None,
            prediction_accuracy: None,
            validation_status: "pending".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn absent_optionals_score_full() {
        assert_eq!(score(&record(25.5)), 1.0);
    }

    #[test]
    fn pm25_band_is_exclusive() {
        assert_eq!(score(&record(0.0)), 0.0);
        assert_eq!(score(&record(500.0)), 0.0);
        assert_eq!(score(&record(499.9)), 1.0);
    }

    #[test]
    fn each_out_of_band_field_zeroes_the_score() {
        let mut m = record(25.0);
        m.aod_value = Some(5.5);
        assert_eq!(score(&m), 0.0);

        let mut m = record(25.0);
        m.no2_value = Some(0.002);
        assert_eq!(score(&m), 0.0);

        let mut m = record(25.0);
        m.temperature = Some(-50.0);
        assert_eq!(score(&m), 0.0);

        let mut m = record(25.0);
        m.humidity = Some(100.5);
        assert_eq!(score(&m), 0.0);

        let mut m = record(25.0);
        m.wind_speed = Some(50.0);
        assert_eq!(score(&m), 0.0);
    }

    #[test]
    fn boundary_values_inside_bands_score_full() {
        let mut m = record(25.0);
        m.aod_value = Some(5.0);
        m.no2_value = Some(0.001);
        m.humidity = Some(100.0);
        m.wind_speed = Some(49.9);
        m.temperature = Some(59.9);
        assert_eq!(score(&m), 1.0);
    }

    #[test]
    fn score_is_binary() {
        for pm25 in [-1.0, 0.0, 12.5, 250.0, 500.0, 600.0] {
            let s = score(&record(pm25));
            assert!(s == 0.0 || s == 1.0);
        }
    }
}
