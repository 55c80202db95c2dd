//! Diesel model structs for measurements and model metrics.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema;

// Well-known `data_source` tags. The column is free-form; these are the
// values this service writes itself.
pub mod data_source {
    pub const MANUAL: &str = "manual";
    pub const OPENAQ: &str = "openaq";
    pub const SYNTHETIC: &str = "synthetic";
    pub const ML_PREDICTION: &str = "ml_prediction";
}

pub mod validation_status {
    pub const PENDING: &str = "pending";
    pub const VALIDATED: &str = "validated";
    pub const REJECTED: &str = "rejected";
    /// Soft-delete marker; rows are never physically removed.
    pub const DELETED: &str = "deleted";

    pub const ALL: [&str; 4] = [PENDING, VALIDATED, REJECTED, DELETED];
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::pm25_measurements)]
pub struct Measurement {
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
    pub prediction_accuracy: Option<f64>,
    pub validation_status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::pm25_measurements)]
pub struct NewMeasurement {
    pub latitude: f64,
    pub longitude: f64,
    pub pm25_value: f64,
    pub aod_value: Option<f64>,
    pub no2_value: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    /// `None` lets the store assign its default (now()).
    pub measurement_date: Option<DateTime<Utc>>,
    pub data_source: String,
    pub is_prediction: bool,
    pub model_version: Option<String>,
    pub prediction_accuracy: Option<f64>,
    pub validation_status: String,
}

impl NewMeasurement {
    pub fn new(latitude: f64, longitude: f64, pm25_value: f64, source: &str) -> Self {
        NewMeasurement {
            latitude,
            longitude,
            pm25_value,
            aod_value: None,
            no2_value: None,
            temperature: None,
            humidity: None,
            wind_speed: None,
            measurement_date: None,
            data_source: source.to_string(),
            is_prediction: false,
            model_version: None,
            prediction_accuracy: None,
            validation_status: validation_status::PENDING.to_string(),
        }
    }
}

/// Partial field patch; `None` fields are left untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = schema::pm25_measurements)]
pub struct MeasurementPatch {
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

impl MeasurementPatch {
    /// Number of fields this patch would touch.
    pub fn field_count(&self) -> usize {
        let MeasurementPatch {
            latitude,
            longitude,
            pm25_value,
            aod_value,
            no2_value,
            temperature,
            humidity,
            wind_speed,
            data_source,
            is_prediction,
            model_version,
            prediction_accuracy,
            validation_status,
        } = self;
        [
            latitude.is_some(),
            longitude.is_some(),
            pm25_value.is_some(),
            aod_value.is_some(),
            no2_value.is_some(),
            temperature.is_some(),
            humidity.is_some(),
            wind_speed.is_some(),
            data_source.is_some(),
            is_prediction.is_some(),
            model_version.is_some(),
            prediction_accuracy.is_some(),
            validation_status.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::model_metrics)]
pub struct ModelMetric {
    pub id: i64,
    pub model_name: String,
    pub rmse: Option<f64>,
    pub r_squared: Option<f64>,
    pub mae: Option<f64>,
    pub validation_score: Option<f64>,
    pub training_samples: Option<i32>,
    pub feature_importance: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::model_metrics)]
pub struct NewModelMetric {
    pub model_name: String,
    pub rmse: Option<f64>,
    pub r_squared: Option<f64>,
    pub mae: Option<f64>,
    pub validation_score: Option<f64>,
    pub training_samples: Option<i32>,
    pub feature_importance: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_field_count_counts_only_set_fields() {
        let mut patch = MeasurementPatch::default();
        assert_eq!(patch.field_count(), 0);
        patch.pm25_value = Some(10.0);
        patch.validation_status = Some(validation_status::VALIDATED.to_string());
        assert_eq!(patch.field_count(), 2);
    }
}
