//! Ensemble PM2.5 prediction.
//!
//! Bootstrap rounds draw with replacement from the training snapshot; each
//! round blends a kernel-weighted average over a combined
//! geographic/atmospheric/meteorological distance with a k-nearest-neighbor
//! estimate, and the per-round predictions are aggregated with IQR outlier
//! trimming. Confidence blends training-set size, round-to-round stability,
//! and the fraction of rounds surviving the trim.

use rand::Rng;
use rand::rngs::SmallRng;
use serde::Serialize;

use crate::db::models::Measurement;

pub const MODEL_VERSION: &str = "enhanced_rf_v2.0";
pub const MIN_TRAINING_SAMPLES: usize = 20;
pub const NUM_ENSEMBLES: usize = 15;
const MAX_SAMPLE_SIZE: usize = 200;
const KNN_NEIGHBORS: usize = 20;

// Covariate defaults applied when the caller supplies no value.
pub const DEFAULT_AOD: f64 = 0.15;
pub const DEFAULT_NO2: f64 = 0.000025;
pub const DEFAULT_TEMPERATURE: f64 = 20.0;
pub const DEFAULT_HUMIDITY: f64 = 50.0;
pub const DEFAULT_WIND_SPEED: f64 = 5.0;

/// A training row with every covariate present; rows failing the strict
/// validity bands never reach the predictor.
#[derive(Debug, Clone)]
pub struct TrainingRow {
    pub latitude: f64,
    pub longitude: f64,
    pub pm25_value: f64,
    pub aod_value: f64,
    pub no2_value: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
}

impl TrainingRow {
    /// `None` when the row is missing a covariate (the store filters should
    /// make that impossible; such rows are skipped, not defaulted).
    pub fn from_measurement(m: &Measurement) -> Option<Self> {
        Some(TrainingRow {
            latitude: m.latitude,
            longitude: m.longitude,
            pm25_value: m.pm25_value,
            aod_value: m.aod_value?,
            no2_value: m.no2_value?,
            temperature: m.temperature?,
            humidity: m.humidity?,
            wind_speed: m.wind_speed?,
        })
    }
}

/// The query point's feature vector, with unspecified covariates defaulted.
#[derive(Debug, Clone, Copy)]
pub struct QueryFeatures {
    pub latitude: f64,
    pub longitude: f64,
    pub aod_value: f64,
    pub no2_value: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
}

impl QueryFeatures {
    pub fn new(
        latitude: f64,
        longitude: f64,
        aod_value: Option<f64>,
        no2_value: Option<f64>,
        temperature: Option<f64>,
        humidity: Option<f64>,
        wind_speed: Option<f64>,
    ) -> Self {
        QueryFeatures {
            latitude,
            longitude,
            aod_value: aod_value.unwrap_or(DEFAULT_AOD),
            no2_value: no2_value.unwrap_or(DEFAULT_NO2),
            temperature: temperature.unwrap_or(DEFAULT_TEMPERATURE),
            humidity: humidity.unwrap_or(DEFAULT_HUMIDITY),
            wind_speed: wind_speed.unwrap_or(DEFAULT_WIND_SPEED),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsembleStatistics {
    pub mean: f64,
    pub median: f64,
    pub std_deviation: f64,
    pub predictions_used: usize,
    pub outliers_removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelPerformance {
    pub data_quality_score: f64,
    pub prediction_stability: f64,
    pub spatial_coverage: f64,
}

#[derive(Debug, Clone)]
pub struct Prediction {
    /// Final estimate, clamped to [1, 500].
    pub pm25_value: f64,
    /// Multi-factor confidence, in [0, 1].
    pub confidence: f64,
    pub statistics: EnsembleStatistics,
    pub performance: ModelPerformance,
}

/// Runs the full ensemble. `None` when no round produced a usable
/// prediction.
pub fn run_ensemble(features: &QueryFeatures, training: &[TrainingRow], rng: &mut SmallRng) -> Option<Prediction> {
    if training.is_empty() {
        return None;
    }

    let sample_size = MAX_SAMPLE_SIZE.min((training.len() as f64 * 0.9).floor() as usize);
    let mut predictions = Vec::with_capacity(NUM_ENSEMBLES);

    for _ in 0..NUM_ENSEMBLES {
        if let Some(round) = ensemble_round(features, training, sample_size, rng) {
            predictions.push(round);
        }
    }

    aggregate(predictions, training.len())
}

/// One bootstrap round: sample with replacement, then blend the
/// kernel-weighted average (0.7) with the kNN estimate (0.3).
fn ensemble_round(
    features: &QueryFeatures,
    training: &[TrainingRow],
    sample_size: usize,
    rng: &mut SmallRng,
) -> Option<f64> {
    let mut sample = Vec::with_capacity(sample_size);
    for _ in 0..sample_size {
        let index = rng.random_range(0..training.len());
        sample.push(&training[index]);
    }

    let mut total_weight = 0.0;
    let mut weighted_sum = 0.0;
    for point in &sample {
        let weight = kernel_weight(features, point);
        total_weight += weight;
        weighted_sum += weight * point.pm25_value;
    }

    // The ε-floor keeps weights strictly positive, but a degenerate round
    // must be excluded rather than counted as zero.
    if total_weight <= 0.0 || sample.is_empty() {
        return None;
    }
    let weighted_prediction = weighted_sum / total_weight;

    let mut by_knn_distance: Vec<(f64, f64)> = sample
        .iter()
        .map(|point| (knn_distance(features, point), point.pm25_value))
        .collect();
    by_knn_distance.sort_by(|a, b| a.0.total_cmp(&b.0));
    let k = KNN_NEIGHBORS.min(by_knn_distance.len());
    let knn_prediction = by_knn_distance[..k].iter().map(|(_, pm25)| pm25).sum::<f64>() / k as f64;

    Some(weighted_prediction * 0.7 + knn_prediction * 0.3)
}

/// Combined distance: geographic in raw degrees, atmospheric and
/// meteorological deltas scaled into comparable magnitudes.
fn combined_distance(features: &QueryFeatures, point: &TrainingRow) -> f64 {
    let geo = ((features.latitude - point.latitude).powi(2) + (features.longitude - point.longitude).powi(2)).sqrt();

    let atmospheric = (((features.aod_value - point.aod_value) * 200.0).powi(2)
        + ((features.no2_value - point.no2_value) * 50000.0).powi(2))
    .sqrt();

    let meteorological = (((features.temperature - point.temperature) * 0.1).powi(2)
        + ((features.humidity - point.humidity) * 0.01).powi(2)
        + ((features.wind_speed - point.wind_speed) * 0.2).powi(2))
    .sqrt();

    geo * 1.0 + atmospheric * 0.8 + meteorological * 0.6
}

fn kernel_weight(features: &QueryFeatures, point: &TrainingRow) -> f64 {
    (-combined_distance(features, point) * 2.0).exp() + 0.001
}

/// Simplified three-feature distance used only for neighbor ranking.
fn knn_distance(features: &QueryFeatures, point: &TrainingRow) -> f64 {
    ((features.latitude - point.latitude).powi(2)
        + (features.longitude - point.longitude).powi(2)
        + ((features.aod_value - point.aod_value) * 100.0).powi(2))
    .sqrt()
}

/// Deterministic reduction over the per-round predictions: quartiles by
/// floor index (not interpolated), IQR trim, mean of survivors.
fn aggregate(mut predictions: Vec<f64>, training_len: usize) -> Option<Prediction> {
    if predictions.is_empty() {
        return None;
    }

    predictions.sort_by(f64::total_cmp);
    let count = predictions.len();
    let mean = predictions.iter().sum::<f64>() / count as f64;
    let median = predictions[count / 2];
    let q1 = predictions[(count as f64 * 0.25).floor() as usize];
    let q3 = predictions[(count as f64 * 0.75).floor() as usize];

    let iqr = q3 - q1;
    let lower_bound = q1 - 1.5 * iqr;
    let upper_bound = q3 + 1.5 * iqr;
    let filtered: Vec<f64> = predictions
        .iter()
        .copied()
        .filter(|p| *p >= lower_bound && *p <= upper_bound)
        .collect();

    let final_prediction = if filtered.is_empty() {
        mean
    } else {
        filtered.iter().sum::<f64>() / filtered.len() as f64
    };

    let variance = predictions.iter().map(|p| (p - final_prediction).powi(2)).sum::<f64>() / count as f64;
    let std_deviation = variance.sqrt();
    let coefficient_of_variation = if final_prediction > 0.0 {
        std_deviation / final_prediction
    } else {
        f64::INFINITY
    };

    let data_quality_score = (training_len as f64 / 100.0).min(1.0);
    let prediction_stability = (1.0 - coefficient_of_variation).max(0.0);
    let spatial_coverage = (filtered.len() as f64 / count as f64).min(1.0);
    let confidence = data_quality_score * 0.3 + prediction_stability * 0.5 + spatial_coverage * 0.2;

    Some(Prediction {
        pm25_value: final_prediction.clamp(1.0, 500.0),
        confidence,
        statistics: EnsembleStatistics {
            mean,
            median,
            std_deviation,
            predictions_used: filtered.len(),
            outliers_removed: count - filtered.len(),
        },
        performance: ModelPerformance {
            data_quality_score,
            prediction_stability,
            spatial_coverage,
        },
    })
}
