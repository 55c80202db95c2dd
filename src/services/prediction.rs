//! PM2.5 prediction operation.
//!
//! Fetches the training snapshot, runs the ensemble, and persists the
//! result as a new prediction-flagged measurement. The write happens after
//! the numeric result is ready; a failed write is reported but does not
//! discard the computed prediction.

use diesel::PgConnection;
use log::warn;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::db::models::{NewMeasurement, data_source};
use crate::error::ServiceError;
use crate::geo::round_to;
use crate::predictor::{
    self, EnsembleStatistics, ModelPerformance, Prediction, QueryFeatures, TrainingRow,
};
use crate::store::{self, TRAINING_ROW_LIMIT};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub aod_value: Option<f64>,
    pub no2_value: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PredictionPayload {
    pub pm25_value: f64,
    pub confidence: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub model_version: &'static str,
    /// Id of the persisted prediction record; absent when the write failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_id: Option<i64>,
    pub statistics: EnsembleStatistics,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub prediction: PredictionPayload,
    pub training_samples: usize,
    pub model_performance: ModelPerformance,
    /// Present when the prediction could not be persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

pub fn predict(
    conn: &mut PgConnection,
    req: &PredictRequest,
    rng: &mut SmallRng,
) -> Result<PredictResponse, ServiceError> {
    let (Some(lat), Some(lng)) = (req.latitude, req.longitude) else {
        return Err(ServiceError::Validation("Latitude and longitude are required".to_string()));
    };

    let rows = store::training_set(conn, TRAINING_ROW_LIMIT)
        .map_err(|e| ServiceError::Store(format!("training query failed: {}", e)))?;
    let training: Vec<TrainingRow> = rows.iter().filter_map(TrainingRow::from_measurement).collect();

    if training.len() < predictor::MIN_TRAINING_SAMPLES {
        return Err(ServiceError::InsufficientData {
            required: predictor::MIN_TRAINING_SAMPLES,
            available: training.len(),
        });
    }

    let features = QueryFeatures::new(
        lat,
        lng,
        req.aod_value,
        req.no2_value,
        req.temperature,
        req.humidity,
        req.wind_speed,
    );
    let prediction = predictor::run_ensemble(&features, &training, rng)
        .ok_or_else(|| ServiceError::Computation("Unable to generate reliable prediction".to_string()))?;

    let (prediction_id, store_error) = match persist(conn, &features, &prediction) {
        Ok(id) => (Some(id), None),
        Err(e) => {
            warn!("Prediction computed but could not be persisted: {}", e);
            (None, Some(e))
        }
    };

    Ok(PredictResponse {
        success: true,
        prediction: PredictionPayload {
            pm25_value: round_to(prediction.pm25_value, 2),
            confidence: round_to(prediction.confidence, 2),
            latitude: lat,
            longitude: lng,
            model_version: predictor::MODEL_VERSION,
            prediction_id,
            statistics: EnsembleStatistics {
                mean: round_to(prediction.statistics.mean, 2),
                median: round_to(prediction.statistics.median, 2),
                std_deviation: round_to(prediction.statistics.std_deviation, 2),
                predictions_used: prediction.statistics.predictions_used,
                outliers_removed: prediction.statistics.outliers_removed,
            },
        },
        training_samples: training.len(),
        model_performance: ModelPerformance {
            data_quality_score: round_to(prediction.performance.data_quality_score, 2),
            prediction_stability: round_to(prediction.performance.prediction_stability, 2),
            spatial_coverage: round_to(prediction.performance.spatial_coverage, 2),
        },
        store_error,
    })
}

fn persist(conn: &mut PgConnection, features: &QueryFeatures, prediction: &Prediction) -> Result<i64, String> {
    let row = prediction_record(features, prediction);
    store::insert_measurement(conn, &row)
        .map(|created| created.id)
        .map_err(|e| format!("insert prediction failed: {}", e))
}

/// The persisted side effect of a successful prediction: the clamped value
/// plus the input covariates, flagged as a prediction.
pub fn prediction_record(features: &QueryFeatures, prediction: &Prediction) -> NewMeasurement {
    let mut row = NewMeasurement::new(
        features.latitude,
        features.longitude,
        prediction.pm25_value,
        data_source::ML_PREDICTION,
    );
    row.aod_value = Some(features.aod_value);
    row.no2_value = Some(features.no2_value);
    row.temperature = Some(features.temperature);
    row.humidity = Some(features.humidity);
    row.wind_speed = Some(features.wind_speed);
    row.is_prediction = true;
    row.model_version = Some(predictor::MODEL_VERSION.to_string());
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_record_is_flagged_and_tagged() {
        let features = QueryFeatures::new(40.7128, -74.006, Some(0.2), None, None, None, None);
        let prediction = Prediction {
            pm25_value: 27.43,
            confidence: 0.88,
            statistics: EnsembleStatistics {
                mean: 27.5,
                median: 27.3,
                std_deviation: 1.1,
                predictions_used: 14,
                outliers_removed: 1,
            },
            performance: ModelPerformance {
                data_quality_score: 1.0,
                prediction_stability: 0.9,
                spatial_coverage: 0.93,
            },
        };
        let row = prediction_record(&features, &prediction);
        assert!(row.is_prediction);
        assert_eq!(row.data_source, "ml_prediction");
        assert_eq!(row.model_version.as_deref(), Some(predictor::MODEL_VERSION));
        assert_eq!(row.pm25_value, 27.43);
        assert_eq!(row.aod_value, Some(0.2));
        // Defaulted covariates are persisted with the record.
        assert_eq!(row.no2_value, Some(predictor::DEFAULT_NO2));
        assert_eq!(row.wind_speed, Some(predictor::DEFAULT_WIND_SPEED));
        assert!(row.measurement_date.is_none());
    }
}
