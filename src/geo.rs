//! Shared geographic and numeric helpers.
//!
//! Distances use a flat-earth approximation: Euclidean distance in degrees
//! scaled by 111.32 km/degree. Radius thresholds and weight formulas were
//! tuned against this approximation; do not swap in haversine.

use chrono::{DateTime, Datelike, TimeZone, Utc};

pub const KM_PER_DEGREE: f64 = 111.32;

/// Lat/lng bounding box used as an index-friendly prefilter before the
/// exact radius check.
#[derive(Debug, Clone, Copy)]
pub struct GeoBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl GeoBounds {
    pub fn around(lat: f64, lng: f64, radius_km: f64) -> Self {
        let degree_radius = radius_km / KM_PER_DEGREE;
        GeoBounds {
            lat_min: lat - degree_radius,
            lat_max: lat + degree_radius,
            lng_min: lng - degree_radius,
            lng_max: lng + degree_radius,
        }
    }
}

pub fn distance_km(lat_a: f64, lng_a: f64, lat_b: f64, lng_b: f64) -> f64 {
    let dlat = lat_a - lat_b;
    let dlng = lng_a - lng_b;
    (dlat * dlat + dlng * dlng).sqrt() * KM_PER_DEGREE
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Half-open window covering the calendar month of `ts`.
pub fn month_window(ts: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(ts.year(), ts.month(), 1, 0, 0, 0)
        .single()
        .expect("valid month start");
    let (next_year, next_month) = if ts.month() == 12 {
        (ts.year() + 1, 1)
    } else {
        (ts.year(), ts.month() + 1)
    };
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .expect("valid month end");
    (start, end)
}

/// Half-open window covering the calendar day of `ts`.
pub fn day_window(ts: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(ts.year(), ts.month(), ts.day(), 0, 0, 0)
        .single()
        .expect("valid day start");
    let end = start + chrono::Duration::days(1);
    (start, end)
}
