//! Create, update, and spatial-query operations for measurements.
//!
//! Validation runs before any store mutation and short-circuits on the
//! first failing field. The query path scores every row with the binary
//! data-quality score and filters on the caller's threshold.

use chrono::{DateTime, Utc};
use diesel::PgConnection;
use serde::{Deserialize, Serialize};

use crate::db::models::{Measurement, MeasurementPatch, NewMeasurement, data_source};
use crate::error::ServiceError;
use crate::geo::{self, GeoBounds};
use crate::quality;
use crate::store::{self, MeasurementFilter};
use crate::validate;

/// Row cap applied after distance filtering and sorting.
const QUERY_ROW_LIMIT: usize = 500;
const DEFAULT_RADIUS_KM: f64 = 50.0;
const DEFAULT_MIN_DATA_QUALITY: f64 = 0.8;

fn validation(msg: String) -> ServiceError {
    ServiceError::Validation(msg)
}

// ---------------------------------------------------------------------------
// Create

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMeasurementRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pm25_value: Option<f64>,
    pub aod_value: Option<f64>,
    pub no2_value: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub measurement_date: Option<DateTime<Utc>>,
    pub data_source: Option<String>,
    pub is_prediction: Option<bool>,
    pub model_version: Option<String>,
    pub prediction_accuracy: Option<f64>,
    pub validation_status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateMeasurementResponse {
    pub success: bool,
    pub message: String,
    pub data: Measurement,
}

/// Validates the request and builds the row to insert; no store access.
pub fn validate_create(req: &CreateMeasurementRequest) -> Result<NewMeasurement, ServiceError> {
    let (Some(lat), Some(lng), Some(pm25)) = (req.latitude, req.longitude, req.pm25_value) else {
        return Err(validation("Latitude, longitude, and pm25_value are required".to_string()));
    };

    validate::coordinates(lat, lng).map_err(validation)?;
    validate::pm25_value(pm25).map_err(validation)?;

    let mut row = NewMeasurement::new(lat, lng, pm25, data_source::MANUAL);
    row.measurement_date = req.measurement_date;

    if let Some(aod) = req.aod_value {
        validate::aod_value(aod).map_err(validation)?;
        row.aod_value = Some(aod);
    }
    if let Some(no2) = req.no2_value {
        validate::no2_value(no2).map_err(validation)?;
        row.no2_value = Some(no2);
    }
    if let Some(temp) = req.temperature {
        validate::temperature(temp).map_err(validation)?;
        row.temperature = Some(temp);
    }
    if let Some(hum) = req.humidity {
        validate::humidity(hum).map_err(validation)?;
        row.humidity = Some(hum);
    }
    if let Some(wind) = req.wind_speed {
        validate::wind_speed(wind).map_err(validation)?;
        row.wind_speed = Some(wind);
    }
    if let Some(accuracy) = req.prediction_accuracy {
        validate::prediction_accuracy(accuracy).map_err(validation)?;
        row.prediction_accuracy = Some(accuracy);
    }
    if let Some(source) = &req.data_source {
        row.data_source = source.clone();
    }
    if let Some(is_prediction) = req.is_prediction {
        row.is_prediction = is_prediction;
    }
    if let Some(version) = &req.model_version {
        row.model_version = Some(version.clone());
    }
    if let Some(status) = &req.validation_status {
        validate::status(status).map_err(validation)?;
        row.validation_status = status.clone();
    }

    Ok(row)
}

pub fn create_measurement(
    conn: &mut PgConnection,
    req: &CreateMeasurementRequest,
) -> Result<CreateMeasurementResponse, ServiceError> {
    let row = validate_create(req)?;
    let created = store::insert_measurement(conn, &row)
        .map_err(|e| ServiceError::Store(format!("insert measurement failed: {}", e)))?;

    Ok(CreateMeasurementResponse {
        success: true,
        message: "PM2.5 measurement created successfully".to_string(),
        data: created,
    })
}

// ---------------------------------------------------------------------------
// Update

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMeasurementRequest {
    pub id: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub pm25_value: Option<f64>,
    pub aod_value: Option<f64>,
    pub no2_value: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub data_source: Option<String>,
    pub is_prediction: Option<bool>,
    pub model_version: Option<String>,
    pub prediction_accuracy: Option<f64>,
    pub validation_status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateMeasurementResponse {
    pub success: bool,
    pub message: String,
    pub data: Measurement,
    pub updated_fields: usize,
}

/// Validates the request and builds the patch; no store access.
pub fn validate_update(req: &UpdateMeasurementRequest) -> Result<(i64, MeasurementPatch), ServiceError> {
    let Some(id) = req.id else {
        return Err(validation("ID is required to update measurement".to_string()));
    };

    let mut patch = MeasurementPatch::default();
    if let Some(lat) = req.latitude {
        validate::latitude(lat).map_err(validation)?;
        patch.latitude = Some(lat);
    }
    if let Some(lng) = req.longitude {
        validate::longitude(lng).map_err(validation)?;
        patch.longitude = Some(lng);
    }
    if let Some(pm25) = req.pm25_value {
        validate::pm25_value(pm25).map_err(validation)?;
        patch.pm25_value = Some(pm25);
    }
    if let Some(aod) = req.aod_value {
        validate::aod_value(aod).map_err(validation)?;
        patch.aod_value = Some(aod);
    }
    if let Some(no2) = req.no2_value {
        validate::no2_value(no2).map_err(validation)?;
        patch.no2_value = Some(no2);
    }
    if let Some(temp) = req.temperature {
        validate::temperature(temp).map_err(validation)?;
        patch.temperature = Some(temp);
    }
    if let Some(hum) = req.humidity {
        validate::humidity(hum).map_err(validation)?;
        patch.humidity = Some(hum);
    }
    if let Some(wind) = req.wind_speed {
        validate::wind_speed(wind).map_err(validation)?;
        patch.wind_speed = Some(wind);
    }
    if let Some(accuracy) = req.prediction_accuracy {
        validate::prediction_accuracy(accuracy).map_err(validation)?;
        patch.prediction_accuracy = Some(accuracy);
    }
    if let Some(status) = &req.validation_status {
        validate::status(status).map_err(validation)?;
        patch.validation_status = Some(status.clone());
    }
    patch.data_source = req.data_source.clone();
    patch.is_prediction = req.is_prediction;
    patch.model_version = req.model_version.clone();

    if patch.field_count() == 0 {
        return Err(validation("No valid fields provided for update".to_string()));
    }
    Ok((id, patch))
}

pub fn update_measurement(
    conn: &mut PgConnection,
    req: &UpdateMeasurementRequest,
) -> Result<UpdateMeasurementResponse, ServiceError> {
    let (id, patch) = validate_update(req)?;
    let updated_fields = patch.field_count();

    let updated = store::update_measurement(conn, id, &patch).map_err(|e| match e {
        diesel::result::Error::NotFound => ServiceError::NotFound("Measurement record not found".to_string()),
        other => ServiceError::Store(format!("update measurement failed: {}", other)),
    })?;

    Ok(UpdateMeasurementResponse {
        success: true,
        message: "PM2.5 measurement updated successfully".to_string(),
        data: updated,
        updated_fields,
    })
}

// ---------------------------------------------------------------------------
// Spatial query

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetMeasurementsRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Search radius in km; defaults to 50.
    pub radius: Option<f64>,
    #[serde(default)]
    pub include_predictions: bool,
    /// Soft-deleted rows are excluded unless explicitly requested.
    #[serde(default)]
    pub include_deleted: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// Minimum binary quality score; defaults to 0.8.
    pub min_data_quality: Option<f64>,
}

/// A measurement with its query-time derived fields, rounded for output.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMeasurement {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub pm25_value: f64,
    pub aod_value: Option<f64>,
    pub no2_value: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub measurement_date: DateTime<Utc>,
    pub data_source: String,
    pub is_prediction: bool,
    pub model_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub data_quality_score: f64,
    pub distance_km: f64,
}

impl ScoredMeasurement {
    fn new(m: &Measurement, distance_km: f64, score: f64) -> Self {
        ScoredMeasurement {
            id: m.id,
            latitude: geo::round_to(m.latitude, 6),
            longitude: geo::round_to(m.longitude, 6),
            pm25_value: geo::round_to(m.pm25_value, 2),
            aod_value: m.aod_value.map(|v| geo::round_to(v, 6)),
            no2_value: m.no2_value.map(|v| geo::round_to(v, 9)),
            temperature: m.temperature.map(|v| geo::round_to(v, 1)),
            humidity: m.humidity.map(|v| geo::round_to(v, 1)),
            wind_speed: m.wind_speed.map(|v| geo::round_to(v, 1)),
            measurement_date: m.measurement_date,
            data_source: m.data_source.clone(),
            is_prediction: m.is_prediction,
            model_version: m.model_version.clone(),
            created_at: m.created_at,
            data_quality_score: geo::round_to(score, 2),
            distance_km: geo::round_to(distance_km, 2),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TimeRange {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct QueryStatistics {
    pub total_measurements: usize,
    pub real_measurements: usize,
    pub predictions: usize,
    pub avg_distance: f64,
    pub avg_pm25: f64,
    pub min_pm25: f64,
    pub max_pm25: f64,
    pub avg_data_quality: f64,
    pub data_sources: Vec<String>,
    pub time_range: TimeRange,
}

#[derive(Debug, Serialize)]
pub struct DataCompleteness {
    pub pm25_complete: usize,
    pub aod_complete: usize,
    pub no2_complete: usize,
    pub temperature_complete: usize,
    pub humidity_complete: usize,
    pub wind_speed_complete: usize,
}

#[derive(Debug, Serialize)]
pub struct QualityBuckets {
    pub high_quality_measurements: usize,
    pub medium_quality_measurements: usize,
    pub low_quality_measurements: usize,
}

#[derive(Debug, Serialize)]
pub struct QueryCenter {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct QueryParameters {
    pub center: QueryCenter,
    pub radius_km: f64,
    pub include_predictions: bool,
    pub include_deleted: bool,
    pub min_data_quality: f64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct GetMeasurementsResponse {
    pub success: bool,
    pub data: Vec<ScoredMeasurement>,
    pub query_parameters: QueryParameters,
    pub statistics: QueryStatistics,
    pub data_completeness: DataCompleteness,
    pub data_quality: QualityBuckets,
}

pub fn get_measurements(
    conn: &mut PgConnection,
    req: &GetMeasurementsRequest,
) -> Result<GetMeasurementsResponse, ServiceError> {
    let (Some(lat), Some(lng)) = (req.latitude, req.longitude) else {
        return Err(validation("Latitude and longitude are required".to_string()));
    };
    if validate::coordinates(lat, lng).is_err() {
        return Err(validation("Invalid coordinates provided".to_string()));
    }
    let radius = req.radius.unwrap_or(DEFAULT_RADIUS_KM);
    let min_quality = req.min_data_quality.unwrap_or(DEFAULT_MIN_DATA_QUALITY);

    let filter = MeasurementFilter {
        include_predictions: req.include_predictions,
        include_deleted: req.include_deleted,
        start_date: req.start_date,
        end_date: req.end_date,
    };
    let rows = store::query_measurements(conn, GeoBounds::around(lat, lng, radius), &filter)
        .map_err(|e| ServiceError::Store(format!("measurement query failed: {}", e)))?;

    let scored = score_and_rank(&rows, lat, lng, radius, min_quality);
    let (statistics, data_completeness, data_quality) = summarize(&scored);

    Ok(GetMeasurementsResponse {
        success: true,
        data: scored,
        query_parameters: QueryParameters {
            center: QueryCenter {
                latitude: lat,
                longitude: lng,
            },
            radius_km: radius,
            include_predictions: req.include_predictions,
            include_deleted: req.include_deleted,
            min_data_quality: min_quality,
            start_date: req.start_date,
            end_date: req.end_date,
        },
        statistics,
        data_completeness,
        data_quality,
    })
}

/// Exact-radius and quality filtering, ordering, and the row cap. The box
/// query over-fetches; this applies the precise predicate.
fn score_and_rank(rows: &[Measurement], lat: f64, lng: f64, radius: f64, min_quality: f64) -> Vec<ScoredMeasurement> {
    let mut scored: Vec<ScoredMeasurement> = rows
        .iter()
        .filter_map(|m| {
            let distance = geo::distance_km(lat, lng, m.latitude, m.longitude);
            if distance > radius {
                return None;
            }
            let score = quality::score(m);
            if score < min_quality {
                return None;
            }
            Some(ScoredMeasurement::new(m, distance, score))
        })
        .collect();

    scored.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| b.measurement_date.cmp(&a.measurement_date))
            .then_with(|| b.data_quality_score.total_cmp(&a.data_quality_score))
    });
    scored.truncate(QUERY_ROW_LIMIT);
    scored
}

fn summarize(rows: &[ScoredMeasurement]) -> (QueryStatistics, DataCompleteness, QualityBuckets) {
    let count = rows.len();
    let mut data_sources: Vec<String> = Vec::new();
    for row in rows {
        if !data_sources.contains(&row.data_source) {
            data_sources.push(row.data_source.clone());
        }
    }

    let avg = |sum: f64| if count > 0 { geo::round_to(sum / count as f64, 2) } else { 0.0 };
    let statistics = QueryStatistics {
        total_measurements: count,
        real_measurements: rows.iter().filter(|r| !r.is_prediction).count(),
        predictions: rows.iter().filter(|r| r.is_prediction).count(),
        avg_distance: avg(rows.iter().map(|r| r.distance_km).sum()),
        avg_pm25: avg(rows.iter().map(|r| r.pm25_value).sum()),
        min_pm25: if count > 0 {
            rows.iter().map(|r| r.pm25_value).fold(f64::INFINITY, f64::min)
        } else {
            0.0
        },
        max_pm25: if count > 0 {
            rows.iter().map(|r| r.pm25_value).fold(f64::NEG_INFINITY, f64::max)
        } else {
            0.0
        },
        avg_data_quality: avg(rows.iter().map(|r| r.data_quality_score).sum()),
        data_sources,
        time_range: TimeRange {
            earliest: rows.iter().map(|r| r.measurement_date).min(),
            latest: rows.iter().map(|r| r.measurement_date).max(),
        },
    };

    let data_completeness = DataCompleteness {
        pm25_complete: count,
        aod_complete: rows.iter().filter(|r| r.aod_value.is_some()).count(),
        no2_complete: rows.iter().filter(|r| r.no2_value.is_some()).count(),
        temperature_complete: rows.iter().filter(|r| r.temperature.is_some()).count(),
        humidity_complete: rows.iter().filter(|r| r.humidity.is_some()).count(),
        wind_speed_complete: rows.iter().filter(|r| r.wind_speed.is_some()).count(),
    };

    let data_quality = QualityBuckets {
        high_quality_measurements: rows.iter().filter(|r| r.data_quality_score >= 0.9).count(),
        medium_quality_measurements: rows
            .iter()
            .filter(|r| r.data_quality_score >= 0.7 && r.data_quality_score < 0.9)
            .count(),
        low_quality_measurements: rows.iter().filter(|r| r.data_quality_score < 0.7).count(),
    };

    (statistics, data_completeness, data_quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn measurement(id: i64, lat: f64, lng: f64, pm25: f64) -> Measurement {
        Measurement {
            id,
            latitude: lat,
            longitude: lng,
            pm25_value: pm25,
            aod_value: None,
            no2_value: None,
            temperature: None,
            humidity: None,
            wind_speed: None,
            measurement_date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            data_source: "manual".to_string(),
            is_prediction: false,
            model_version: None,
            prediction_accuracy: None,
            validation_status: "pending".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn create_requires_the_three_core_fields() {
        let req = CreateMeasurementRequest {
            latitude: Some(40.0),
            longitude: Some(-74.0),
            ..Default::default()
        };
        let err = validate_create(&req).unwrap_err();
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn create_rejects_out_of_range_pm25() {
        let req = CreateMeasurementRequest {
            latitude: Some(40.7128),
            longitude: Some(-74.006),
            pm25_value: Some(600.0),
            ..Default::default()
        };
        let err = validate_create(&req).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("PM2.5 value must be between 0 and 500"));
    }

    #[test]
    fn create_rejects_bad_coordinates_before_covariates() {
        let req = CreateMeasurementRequest {
            latitude: Some(91.0),
            longitude: Some(-74.0),
            pm25_value: Some(25.0),
            aod_value: Some(99.0),
            ..Default::default()
        };
        let err = validate_create(&req).unwrap_err();
        assert!(err.to_string().contains("Invalid coordinates"));
    }

    #[test]
    fn create_defaults_source_and_status() {
        let req = CreateMeasurementRequest {
            latitude: Some(40.0),
            longitude: Some(-74.0),
            pm25_value: Some(25.5),
            ..Default::default()
        };
        let row = validate_create(&req).unwrap();
        assert_eq!(row.data_source, "manual");
        assert_eq!(row.validation_status, "pending");
        assert!(!row.is_prediction);
        assert!(row.measurement_date.is_none());
    }

    #[test]
    fn create_rejects_unknown_validation_status() {
        let req = CreateMeasurementRequest {
            latitude: Some(40.0),
            longitude: Some(-74.0),
            pm25_value: Some(25.5),
            validation_status: Some("archived".to_string()),
            ..Default::default()
        };
        assert!(validate_create(&req).is_err());
    }

    #[test]
    fn update_requires_id_and_at_least_one_field() {
        let err = validate_update(&UpdateMeasurementRequest::default()).unwrap_err();
        assert!(err.to_string().contains("ID is required"));

        let req = UpdateMeasurementRequest {
            id: Some(7),
            ..Default::default()
        };
        let err = validate_update(&req).unwrap_err();
        assert!(err.to_string().contains("No valid fields"));
    }

    #[test]
    fn update_validates_each_supplied_field() {
        let req = UpdateMeasurementRequest {
            id: Some(7),
            humidity: Some(140.0),
            ..Default::default()
        };
        let err = validate_update(&req).unwrap_err();
        assert!(err.to_string().contains("Humidity"));

        let req = UpdateMeasurementRequest {
            id: Some(7),
            pm25_value: Some(10.0),
            validation_status: Some("deleted".to_string()),
            ..Default::default()
        };
        let (id, patch) = validate_update(&req).unwrap();
        assert_eq!(id, 7);
        assert_eq!(patch.field_count(), 2);
    }

    #[test]
    fn ranking_filters_radius_and_quality_then_sorts_by_distance() {
        let rows = vec![
            measurement(1, 40.0, -74.0, 25.5),  // distance 0
            measurement(2, 40.3, -74.0, 30.0),  // ~33 km
            measurement(3, 42.0, -74.0, 30.0),  // ~222 km, outside
            {
                let mut m = measurement(4, 40.1, -74.0, 30.0);
                m.aod_value = Some(9.0); // quality 0.0, below threshold
                m
            },
        ];
        let scored = score_and_rank(&rows, 40.0, -74.0, 50.0, 0.8);
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].id, 1);
        assert_eq!(scored[1].id, 2);
        assert!((scored[0].distance_km - 0.0).abs() < 1e-9);
    }

    #[test]
    fn roundtrip_point_query_returns_the_created_row_shape() {
        let rows = vec![measurement(1, 40.0, -74.0, 25.5)];
        let scored = score_and_rank(&rows, 40.0, -74.0, 1.0, 0.8);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].pm25_value, 25.5);
        assert_eq!(scored[0].distance_km, 0.0);
        assert_eq!(scored[0].data_quality_score, 1.0);
    }

    #[test]
    fn summary_counts_sources_and_buckets() {
        let mut rows = vec![measurement(1, 40.0, -74.0, 20.0), measurement(2, 40.01, -74.0, 30.0)];
        rows[1].data_source = "openaq".to_string();
        rows[1].aod_value = Some(0.3);
        let scored = score_and_rank(&rows, 40.0, -74.0, 50.0, 0.0);
        let (stats, completeness, buckets) = summarize(&scored);
        assert_eq!(stats.total_measurements, 2);
        assert_eq!(stats.real_measurements, 2);
        assert_eq!(stats.predictions, 0);
        assert_eq!(stats.avg_pm25, 25.0);
        assert_eq!(stats.min_pm25, 20.0);
        assert_eq!(stats.max_pm25, 30.0);
        assert_eq!(stats.data_sources, vec!["manual".to_string(), "openaq".to_string()]);
        assert_eq!(completeness.pm25_complete, 2);
        assert_eq!(completeness.aod_complete, 1);
        assert_eq!(buckets.high_quality_measurements, 2);
        assert_eq!(buckets.low_quality_measurements, 0);
    }

    #[test]
    fn empty_result_set_summarizes_to_zeroes() {
        let (stats, completeness, _) = summarize(&[]);
        assert_eq!(stats.total_measurements, 0);
        assert_eq!(stats.avg_pm25, 0.0);
        assert_eq!(stats.avg_distance, 0.0);
        assert!(stats.time_range.earliest.is_none());
        assert_eq!(completeness.pm25_complete, 0);
    }
}
