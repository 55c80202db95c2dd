//! Environmental covariate estimation over a geographic neighborhood.
//!
//! Fetches the neighborhood snapshot, hands it to the estimator core, and
//! reports per-covariate source counts and estimation methods alongside
//! summary statistics.

use chrono::{DateTime, Datelike, Utc};
use diesel::PgConnection;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::db::models::Measurement;
use crate::error::ServiceError;
use crate::estimator::{self, EnvironmentalData, EstimationMethods, RegionRow, SourceCounts};
use crate::geo::{self, GeoBounds};
use crate::store::{self, REGION_ROW_LIMIT};
use crate::validate;

const DEFAULT_RADIUS_KM: f64 = 100.0;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentalRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Search radius in km; defaults to 100.
    pub radius: Option<f64>,
    /// Reference date; defaults to now.
    pub date: Option<DateTime<Utc>>,
    /// Widen the date window from the reference day to its calendar month.
    #[serde(default = "default_true")]
    pub include_historical: bool,
    /// Fill covariates with the parametric climate model when no measured
    /// data is available.
    #[serde(default = "default_true")]
    pub fallback_to_estimates: bool,
}

impl Default for EnvironmentalRequest {
    fn default() -> Self {
        EnvironmentalRequest {
            latitude: None,
            longitude: None,
            radius: None,
            date: None,
            include_historical: true,
            fallback_to_estimates: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LocationInfo {
    pub latitude: f64,
    pub longitude: f64,
    pub date: DateTime<Utc>,
    pub season: u32,
    pub month: u32,
}

#[derive(Debug, Serialize)]
pub struct EnvironmentalStatistics {
    pub total_measurements: usize,
    pub search_radius_km: f64,
    pub avg_distance: f64,
    pub data_sources: Vec<String>,
    pub time_range: super::measurements::TimeRange,
}

#[derive(Debug, Serialize)]
pub struct EnvironmentalResponse {
    pub success: bool,
    pub location: LocationInfo,
    pub environmental_data: EnvironmentalData,
    pub data_quality: SourceCounts,
    pub statistics: EnvironmentalStatistics,
    pub estimation_methods: EstimationMethods,
}

/// Runs the estimate for `now` as the default reference date.
pub fn get_environmental_estimate(
    conn: &mut PgConnection,
    req: &EnvironmentalRequest,
    rng: &mut SmallRng,
) -> Result<EnvironmentalResponse, ServiceError> {
    let (Some(lat), Some(lng)) = (req.latitude, req.longitude) else {
        return Err(ServiceError::Validation("Latitude and longitude are required".to_string()));
    };
    if validate::coordinates(lat, lng).is_err() {
        return Err(ServiceError::Validation("Invalid coordinates provided".to_string()));
    }
    let radius = req.radius.unwrap_or(DEFAULT_RADIUS_KM);
    let target_date = req.date.unwrap_or_else(Utc::now);
    let month = target_date.month();

    let window = if req.include_historical {
        geo::month_window(target_date)
    } else {
        geo::day_window(target_date)
    };

    let rows = store::query_region(conn, GeoBounds::around(lat, lng, radius), window)
        .map_err(|e| ServiceError::Store(format!("environmental query failed: {}", e)))?;
    let neighborhood = select_neighborhood(&rows, lat, lng, radius);

    let estimate = estimator::estimate(lat, lng, &neighborhood, month, req.fallback_to_estimates, rng);
    let statistics = summarize(&neighborhood, radius);

    Ok(EnvironmentalResponse {
        success: true,
        location: LocationInfo {
            latitude: lat,
            longitude: lng,
            date: target_date,
            season: (month - 1) / 3 + 1,
            month,
        },
        environmental_data: estimate.data,
        data_quality: estimate.sources,
        statistics,
        estimation_methods: estimate.methods,
    })
}

/// Exact-radius filter, distance/date ordering, and the row cap over the
/// box-prefiltered rows.
fn select_neighborhood(rows: &[Measurement], lat: f64, lng: f64, radius: f64) -> Vec<RegionRow> {
    let mut region: Vec<RegionRow> = rows
        .iter()
        .map(|m| RegionRow::from_measurement(m, lat, lng))
        .filter(|r| r.distance_km <= radius)
        .collect();
    region.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| b.measurement_date.cmp(&a.measurement_date))
    });
    region.truncate(REGION_ROW_LIMIT as usize);
    region
}

fn summarize(rows: &[RegionRow], radius: f64) -> EnvironmentalStatistics {
    let mut data_sources: Vec<String> = Vec::new();
    for row in rows {
        if !data_sources.contains(&row.data_source) {
            data_sources.push(row.data_source.clone());
        }
    }
    let avg_distance = if rows.is_empty() {
        0.0
    } else {
        geo::round_to(rows.iter().map(|r| r.distance_km).sum::<f64>() / rows.len() as f64, 2)
    };
    EnvironmentalStatistics {
        total_measurements: rows.len(),
        search_radius_km: radius,
        avg_distance,
        data_sources,
        time_range: super::measurements::TimeRange {
            earliest: rows.iter().map(|r| r.measurement_date).min(),
            latest: rows.iter().map(|r| r.measurement_date).max(),
        },
    }
}
