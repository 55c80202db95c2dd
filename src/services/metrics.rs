//! Model-performance metric records.

use diesel::PgConnection;
use serde::{Deserialize, Serialize};

use crate::db::models::{ModelMetric, NewModelMetric};
use crate::error::ServiceError;
use crate::store;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateModelMetricsRequest {
    pub model_name: Option<String>,
    pub rmse: Option<f64>,
    pub r_squared: Option<f64>,
    pub mae: Option<f64>,
    pub validation_score: Option<f64>,
    pub training_samples: Option<i64>,
    pub feature_importance: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct CreateModelMetricsResponse {
    pub success: bool,
    pub message: String,
    pub data: ModelMetric,
}

fn validation(msg: &str) -> ServiceError {
    ServiceError::Validation(msg.to_string())
}

/// Validates the request and builds the row to insert; no store access.
pub fn validate_metrics(req: &CreateModelMetricsRequest) -> Result<NewModelMetric, ServiceError> {
    let Some(model_name) = req.model_name.clone().filter(|name| !name.is_empty()) else {
        return Err(validation("model_name is required"));
    };

    if let Some(rmse) = req.rmse {
        let ok = rmse >= 0.0;
        if !ok {
            return Err(validation("RMSE must be a non-negative number"));
        }
    }
    if let Some(r2) = req.r_squared {
        let ok = r2 >= 0.0 && r2 <= 1.0;
        if !ok {
            return Err(validation("R-squared must be between 0 and 1"));
        }
    }
    if let Some(mae) = req.mae {
        let ok = mae >= 0.0;
        if !ok {
            return Err(validation("MAE must be a non-negative number"));
        }
    }
    if let Some(score) = req.validation_score {
        let ok = score >= 0.0 && score <= 1.0;
        if !ok {
            return Err(validation("Validation score must be between 0 and 1"));
        }
    }
    let training_samples = match req.training_samples {
        Some(samples) if samples < 1 || samples > i32::MAX as i64 => {
            return Err(validation("Training samples must be a positive integer"));
        }
        Some(samples) => Some(samples as i32),
        None => None,
    };
    if let Some(importance) = &req.feature_importance {
        if !importance.is_object() {
            return Err(validation("Feature importance must be a JSON object"));
        }
    }

    Ok(NewModelMetric {
        model_name,
        rmse: req.rmse,
        r_squared: req.r_squared,
        mae: req.mae,
        validation_score: req.validation_score,
        training_samples,
        feature_importance: req.feature_importance.clone(),
    })
}

pub fn create_model_metrics(
    conn: &mut PgConnection,
    req: &CreateModelMetricsRequest,
) -> Result<CreateModelMetricsResponse, ServiceError> {
    let row = validate_metrics(req)?;
    let created = store::insert_model_metric(conn, &row)
        .map_err(|e| ServiceError::Store(format!("insert model metrics failed: {}", e)))?;

    Ok(CreateModelMetricsResponse {
        success: true,
        message: "Model metrics record created successfully".to_string(),
        data: created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_name_is_required() {
        let err = validate_metrics(&CreateModelMetricsRequest::default()).unwrap_err();
        assert!(err.to_string().contains("model_name"));
    }

    #[test]
    fn bounded_scores_are_checked() {
        let req = CreateModelMetricsRequest {
            model_name: Some("enhanced_rf_v2.0".to_string()),
            r_squared: Some(1.2),
            ..Default::default()
        };
        assert!(validate_metrics(&req).is_err());

        let req = CreateModelMetricsRequest {
            model_name: Some("enhanced_rf_v2.0".to_string()),
            rmse: Some(-0.1),
            ..Default::default()
        };
        assert!(validate_metrics(&req).is_err());
    }

    #[test]
    fn feature_importance_must_be_an_object() {
        let req = CreateModelMetricsRequest {
            model_name: Some("enhanced_rf_v2.0".to_string()),
            feature_importance: Some(serde_json::json!([1, 2, 3])),
            ..Default::default()
        };
        assert!(validate_metrics(&req).is_err());

        let req = CreateModelMetricsRequest {
            model_name: Some("enhanced_rf_v2.0".to_string()),
            feature_importance: Some(serde_json::json!({"aod_value": 0.4})),
            training_samples: Some(150),
            ..Default::default()
        };
        let row = validate_metrics(&req).unwrap();
        assert_eq!(row.training_samples, Some(150));
    }
}
