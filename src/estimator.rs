//! Spatial estimation of environmental covariates.
//!
//! Values come from an inverse-distance weighted average over nearby
//! measurements; when a covariate has no measured sources and fallback is
//! enabled, a parametric climate model built from latitude, longitude, and
//! month-of-year fills the gap. Fallback values carry bounded random
//! jitter, so only their shape and physical bounds are contractual; the
//! measured-data path is fully deterministic.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::rngs::SmallRng;
use serde::Serialize;
use std::f64::consts::PI;

use crate::db::models::Measurement;
use crate::geo::{distance_km, round_to};

pub const METHOD_MEASURED: &str = "measured_data";
pub const METHOD_AOD_MODEL: &str = "geographic_seasonal_model";
pub const METHOD_NO2_MODEL: &str = "urban_proximity_model";
pub const METHOD_TEMPERATURE_MODEL: &str = "latitude_seasonal_model";
pub const METHOD_HUMIDITY_MODEL: &str = "coastal_seasonal_model";
pub const METHOD_WIND_MODEL: &str = "geographic_climate_model";

/// A neighborhood row with its precomputed distance from the query point.
#[derive(Debug, Clone)]
pub struct RegionRow {
    pub latitude: f64,
    pub longitude: f64,
    pub aod_value: Option<f64>,
    pub no2_value: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub measurement_date: DateTime<Utc>,
    pub data_source: String,
    pub distance_km: f64,
}

impl RegionRow {
    pub fn from_measurement(m: &Measurement, query_lat: f64, query_lng: f64) -> Self {
        RegionRow {
            latitude: m.latitude,
            longitude: m.longitude,
            aod_value: m.aod_value,
            no2_value: m.no2_value,
            temperature: m.temperature,
            humidity: m.humidity,
            wind_speed: m.wind_speed,
            measurement_date: m.measurement_date,
            data_source: m.data_source.clone(),
            distance_km: distance_km(query_lat, query_lng, m.latitude, m.longitude),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnvironmentalData {
    pub aod_value: Option<f64>,
    pub no2_value: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
}

/// Per-covariate count of measured rows that contributed to the average.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceCounts {
    pub aod_sources: usize,
    pub no2_sources: usize,
    pub temperature_sources: usize,
    pub humidity_sources: usize,
    pub wind_speed_sources: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EstimationMethods {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aod_value: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no2_value: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<&'static str>,
}

#[derive(Debug)]
pub struct Estimate {
    pub data: EnvironmentalData,
    pub sources: SourceCounts,
    pub methods: EstimationMethods,
}

/// Estimate all five covariates from an already-fetched, radius-filtered
/// neighborhood. `month` is 1-based.
pub fn estimate(
    lat: f64,
    lng: f64,
    rows: &[RegionRow],
    month: u32,
    fallback_to_estimates: bool,
    rng: &mut SmallRng,
) -> Estimate {
    let mut sources = SourceCounts::default();

    let aod = weighted_average(rows, |r| r.aod_value, 6, &mut sources.aod_sources);
    let no2 = weighted_average(rows, |r| r.no2_value, 6, &mut sources.no2_sources);
    let temperature = weighted_average(rows, |r| r.temperature, 1, &mut sources.temperature_sources);
    let humidity = weighted_average(rows, |r| r.humidity, 1, &mut sources.humidity_sources);
    let wind_speed = weighted_average(rows, |r| r.wind_speed, 1, &mut sources.wind_speed_sources);

    let mut data = EnvironmentalData {
        aod_value: aod,
        no2_value: no2,
        temperature,
        humidity,
        wind_speed,
    };

    if fallback_to_estimates {
        if data.aod_value.is_none() {
            data.aod_value = Some(fallback_aod(lat, month, rng));
        }
        if data.no2_value.is_none() {
            data.no2_value = Some(fallback_no2(lat, month, rng));
        }
        if data.temperature.is_none() {
            data.temperature = Some(fallback_temperature(lat, month, rng));
        }
        if data.humidity.is_none() {
            data.humidity = Some(fallback_humidity(lng, month, rng));
        }
        if data.wind_speed.is_none() {
            data.wind_speed = Some(fallback_wind_speed(lat, lng, month, rng));
        }
    }

    let methods = EstimationMethods {
        aod_value: method_for(data.aod_value, sources.aod_sources, METHOD_AOD_MODEL),
        no2_value: method_for(data.no2_value, sources.no2_sources, METHOD_NO2_MODEL),
        temperature: method_for(data.temperature, sources.temperature_sources, METHOD_TEMPERATURE_MODEL),
        humidity: method_for(data.humidity, sources.humidity_sources, METHOD_HUMIDITY_MODEL),
        wind_speed: method_for(data.wind_speed, sources.wind_speed_sources, METHOD_WIND_MODEL),
    };

    Estimate { data, sources, methods }
}

fn method_for(value: Option<f64>, source_count: usize, model_name: &'static str) -> Option<&'static str> {
    match value {
        Some(_) if source_count > 0 => Some(METHOD_MEASURED),
        Some(_) => Some(model_name),
        None => None,
    }
}

/// Inverse-distance weighted average of one covariate. The +1 in the
/// weight denominator avoids the singularity at distance 0.
fn weighted_average(
    rows: &[RegionRow],
    covariate: impl Fn(&RegionRow) -> Option<f64>,
    decimals: u32,
    source_count: &mut usize,
) -> Option<f64> {
    let mut total_weight = 0.0;
    let mut weighted_sum = 0.0;
    let mut count = 0usize;

    for row in rows {
        let Some(value) = covariate(row) else { continue };
        let weight = 1.0 / (row.distance_km + 1.0);
        total_weight += weight;
        weighted_sum += weight * value;
        count += 1;
    }

    if count == 0 {
        return None;
    }
    *source_count = count;
    Some(round_to(weighted_sum / total_weight, decimals))
}

fn seasonal(month: u32, phase_shift: f64, amplitude: f64) -> f64 {
    ((month as f64 + phase_shift) / 12.0 * 2.0 * PI).sin() * amplitude
}

fn fallback_aod(lat: f64, month: u32, rng: &mut SmallRng) -> f64 {
    let latitude_effect = lat.abs() * 0.002;
    let jitter = rng.random_range(-0.05..=0.05);
    let value = (0.15 + latitude_effect + seasonal(month, 0.0, 0.05) + jitter).clamp(0.05, 1.0);
    round_to(value, 6)
}

fn fallback_no2(lat: f64, month: u32, rng: &mut SmallRng) -> f64 {
    let urban_effect = ((lat - 40.7).abs() * 0.000001).min(0.00005);
    let jitter = rng.random_range(-0.0000025..=0.0000025);
    let value = (0.000025 + urban_effect + seasonal(month, 3.0, 0.00001) + jitter).clamp(0.000005, 0.0001);
    round_to(value, 9)
}

fn fallback_temperature(lat: f64, month: u32, rng: &mut SmallRng) -> f64 {
    let latitude_effect = (90.0 - lat.abs()) * 0.3;
    let seasonal_effect = seasonal(month, -1.0, 15.0);
    // Seasons are inverted in the southern hemisphere.
    let hemisphere_adjustment = if lat < 0.0 { -seasonal_effect } else { seasonal_effect };
    let jitter = rng.random_range(-2.5..=2.5);
    let value = (15.0 + latitude_effect + hemisphere_adjustment + jitter).clamp(-30.0, 45.0);
    round_to(value, 1)
}

fn fallback_humidity(lng: f64, month: u32, rng: &mut SmallRng) -> f64 {
    let coastal_effect = (20.0 - (lng + 95.0).abs() * 0.2).max(0.0);
    let jitter = rng.random_range(-7.5..=7.5);
    let value = (60.0 + coastal_effect + seasonal(month, 6.0, 10.0) + jitter).clamp(20.0, 90.0);
    round_to(value, 1)
}

fn fallback_wind_speed(lat: f64, lng: f64, month: u32, rng: &mut SmallRng) -> f64 {
    let coastal_effect = (15.0 - (lng + 80.0).abs() * 0.1).max(0.0);
    let latitude_effect = lat.abs() * 0.05;
    let jitter = rng.random_range(-1.0..=1.0);
    let value = (4.0 + coastal_effect + latitude_effect + seasonal(month, 9.0, 2.0) + jitter).clamp(0.5, 15.0);
    round_to(value, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::SeedableRng;

    fn row(distance_km: f64) -> RegionRow {
        RegionRow {
            latitude: 40.0,
            longitude: -74.0,
            aod_value: None,
            no2_value: None,
            temperature: None,
            humidity: None,
            wind_speed: None,
            measurement_date: Utc::now(),
            data_source: "manual".to_string(),
            distance_km,
        }
    }

    #[test]
    fn no_rows_and_no_fallback_leaves_everything_null() {
        let mut rng = SmallRng::seed_from_u64(1);
        let est = estimate(40.0, -74.0, &[], 6, false, &mut rng);
        assert!(est.data.aod_value.is_none());
        assert!(est.data.no2_value.is_none());
        assert!(est.data.temperature.is_none());
        assert!(est.data.humidity.is_none());
        assert!(est.data.wind_speed.is_none());
        assert!(est.methods.aod_value.is_none());
        assert!(est.methods.wind_speed.is_none());
        assert_eq!(est.sources.aod_sources, 0);
    }

    #[test]
    fn single_source_at_distance_zero_is_exact() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut r = row(0.0);
        r.aod_value = Some(0.2);
        let est = estimate(40.0, -74.0, &[r], 6, false, &mut rng);
        assert_eq!(est.data.aod_value, Some(0.2));
        assert_eq!(est.sources.aod_sources, 1);
        assert_eq!(est.methods.aod_value, Some(METHOD_MEASURED));
    }

    #[test]
    fn nearer_rows_dominate_the_average() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut near = row(0.0);
        near.temperature = Some(10.0);
        let mut far = row(99.0);
        far.temperature = Some(30.0);
        let est = estimate(40.0, -74.0, &[near, far], 6, false, &mut rng);
        // Weights are 1 and 0.01, so the average stays close to 10.
        let value = est.data.temperature.unwrap();
        assert!(value < 11.0, "expected near-dominated average, got {value}");
        assert_eq!(est.sources.temperature_sources, 2);
    }

    #[test]
    fn measured_path_is_deterministic() {
        let mut r = row(3.0);
        r.aod_value = Some(0.31);
        r.humidity = Some(44.0);
        let rows = [r];
        let mut rng_a = SmallRng::seed_from_u64(7);
        let mut rng_b = SmallRng::seed_from_u64(999);
        let a = estimate(40.0, -74.0, &rows, 6, false, &mut rng_a);
        let b = estimate(40.0, -74.0, &rows, 6, false, &mut rng_b);
        assert_eq!(a.data.aod_value, b.data.aod_value);
        assert_eq!(a.data.humidity, b.data.humidity);
    }

    #[test]
    fn fallback_fills_gaps_and_tags_the_model() {
        let mut rng = SmallRng::seed_from_u64(42);
        let est = estimate(40.7128, -74.006, &[], 7, true, &mut rng);
        assert_eq!(est.methods.aod_value, Some(METHOD_AOD_MODEL));
        assert_eq!(est.methods.no2_value, Some(METHOD_NO2_MODEL));
        assert_eq!(est.methods.temperature, Some(METHOD_TEMPERATURE_MODEL));
        assert_eq!(est.methods.humidity, Some(METHOD_HUMIDITY_MODEL));
        assert_eq!(est.methods.wind_speed, Some(METHOD_WIND_MODEL));
        assert_eq!(est.sources.aod_sources, 0);
    }

    #[test]
    fn fallback_values_stay_within_physical_bounds() {
        // Jitter is random, so sweep seeds, months, and extreme coordinates.
        for seed in 0..50u64 {
            let mut rng = SmallRng::seed_from_u64(seed);
            for (lat, lng) in [(89.9, 179.9), (-89.9, -179.9), (0.0, 0.0), (40.7, -74.0)] {
                for month in 1..=12u32 {
                    let aod = fallback_aod(lat, month, &mut rng);
                    assert!((0.05..=1.0).contains(&aod));
                    let no2 = fallback_no2(lat, month, &mut rng);
                    assert!((0.000005..=0.0001).contains(&no2));
                    let temp = fallback_temperature(lat, month, &mut rng);
                    assert!((-30.0..=45.0).contains(&temp));
                    let hum = fallback_humidity(lng, month, &mut rng);
                    assert!((20.0..=90.0).contains(&hum));
                    let wind = fallback_wind_speed(lat, lng, month, &mut rng);
                    assert!((0.5..=15.0).contains(&wind));
                }
            }
        }
    }

    #[test]
    fn southern_hemisphere_flips_the_seasonal_term() {
        // April puts the seasonal sine at its +15 peak; with jitter bounded
        // at ±2.5 the hemisphere flip must dominate.
        let mut rng = SmallRng::seed_from_u64(11);
        let north: f64 = fallback_temperature(45.0, 4, &mut rng);
        let south: f64 = fallback_temperature(-45.0, 4, &mut rng);
        assert!(north > south, "north {north} should exceed south {south}");
    }

    #[test]
    fn rounding_precision_differs_per_covariate() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut r = row(1.0);
        r.no2_value = Some(0.0000251234567);
        r.wind_speed = Some(4.4444);
        let est = estimate(40.0, -74.0, &[r], 6, false, &mut rng);
        // no2 keeps 6 decimals, wind one.
        assert_eq!(est.data.no2_value, Some(0.000025));
        assert_eq!(est.data.wind_speed, Some(4.4));
    }
}
