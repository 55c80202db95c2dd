//! External ingestion from OpenAQ with synthetic fallback.
//!
//! Upstream failure is non-fatal: any transport/HTTP error, an empty page,
//! or a page with no usable records falls back to the synthetic generator.
//! Per-item insert failures are counted and never abort the batch.

use chrono::{DateTime, Utc};
use diesel::PgConnection;
use log::{error, info, warn};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::client::{MeasurementsQuery, OpenAqClient};
use crate::db::models::{NewMeasurement, data_source};
use crate::error::ServiceError;
use crate::models::openaq::MeasurementsPage;
use crate::services::synthetic;
use crate::store;

const DEFAULT_FETCH_LIMIT: usize = 100;
// Center used by the synthetic fallback when the request has no
// coordinates.
const FALLBACK_CENTER: (f64, f64) = (40.7128, -74.006);
pub const SYNTHETIC_SOURCE: &str = "synthetic_data_generator";

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IngestCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestRequest {
    pub country: Option<String>,
    pub city: Option<String>,
    pub coordinates: Option<IngestCoordinates>,
    /// Radius in km around `coordinates`.
    pub radius: Option<f64>,
    /// Upstream page size; defaults to 100, capped by the client at 1000.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub message: String,
    pub inserted: usize,
    pub total_fetched: usize,
    pub valid_measurements: usize,
    pub skipped_duplicates: usize,
    pub failed: usize,
    /// The upstream request URL, or the synthetic-generator marker.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

pub fn ingest_external(
    conn: &mut PgConnection,
    client: &OpenAqClient,
    req: &IngestRequest,
    now: DateTime<Utc>,
    rng: &mut SmallRng,
) -> Result<IngestResponse, ServiceError> {
    let limit = req.limit.unwrap_or(DEFAULT_FETCH_LIMIT);
    let query = MeasurementsQuery {
        country: req.country.clone(),
        city: req.city.clone(),
        coordinates: req.coordinates.map(|c| (c.latitude, c.longitude)),
        radius_km: req.radius,
        limit,
    };

    let page = match client.fetch_measurements(&query) {
        Ok(page) => page,
        Err(e) => {
            warn!("OpenAQ fetch failed, falling back to synthetic data: {}", e);
            return synthetic_fallback(conn, req, limit, now, rng, format!("OpenAQ API unavailable: {}", e));
        }
    };

    let (total_fetched, candidates) = candidate_rows(&page);
    if candidates.is_empty() {
        warn!("OpenAQ returned {} record(s), none usable; falling back to synthetic data", total_fetched);
        return synthetic_fallback(conn, req, limit, now, rng, "OpenAQ returned no usable records".to_string());
    }

    let valid_measurements = candidates.len();
    let mut inserted = 0usize;
    let mut skipped_duplicates = 0usize;
    let mut failed = 0usize;

    for row in &candidates {
        let date = row.measurement_date.unwrap_or(now);
        match store::duplicate_exists(conn, row.latitude, row.longitude, date, &row.data_source) {
            Ok(true) => {
                skipped_duplicates += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Ingest duplicate check failed: {}", e);
                failed += 1;
                continue;
            }
        }
        match store::insert_measurement(conn, row) {
            Ok(_) => inserted += 1,
            Err(e) => {
                error!("Ingest insert failed: {}", e);
                failed += 1;
            }
        }
    }

    info!(
        "Ingest: fetched={} valid={} inserted={} duplicates={} failed={}",
        total_fetched, valid_measurements, inserted, skipped_duplicates, failed
    );

    Ok(IngestResponse {
        success: true,
        message: "Successfully fetched and stored PM2.5 data from OpenAQ".to_string(),
        inserted,
        total_fetched,
        valid_measurements,
        skipped_duplicates,
        failed,
        source: query.describe(client.base_url()),
        note: None,
    })
}

/// Filters the upstream page down to insertable rows. Returns the raw
/// fetched count alongside the candidates.
pub fn candidate_rows(page: &MeasurementsPage) -> (usize, Vec<NewMeasurement>) {
    let results = page.results.as_deref().unwrap_or_default();
    let candidates = results
        .iter()
        .filter(|r| r.is_usable())
        .filter_map(|r| {
            let value = r.value?;
            let coords = r.coordinates?;
            let mut row = NewMeasurement::new(coords.latitude?, coords.longitude?, value, data_source::OPENAQ);
            row.measurement_date = Some(r.date?.utc?);
            Some(row)
        })
        .collect();
    (results.len(), candidates)
}

fn synthetic_fallback(
    conn: &mut PgConnection,
    req: &IngestRequest,
    limit: usize,
    now: DateTime<Utc>,
    rng: &mut SmallRng,
    reason: String,
) -> Result<IngestResponse, ServiceError> {
    let (lat, lng) = req
        .coordinates
        .map(|c| (c.latitude, c.longitude))
        .unwrap_or(FALLBACK_CENTER);

    let outcome = synthetic::generate(conn, lat, lng, limit, now, rng);
    Ok(IngestResponse {
        success: true,
        message: format!(
            "Generated {} synthetic PM2.5 measurements (OpenAQ API unavailable)",
            outcome.inserted
        ),
        inserted: outcome.inserted,
        total_fetched: outcome.inserted,
        valid_measurements: outcome.inserted,
        skipped_duplicates: outcome.skipped_duplicates,
        failed: outcome.failed,
        source: SYNTHETIC_SOURCE.to_string(),
        note: Some(reason),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::openaq::{Coordinates, MeasurementDate, RawMeasurement};
    use chrono::TimeZone;

    fn raw(value: Option<f64>, with_coords: bool, with_date: bool) -> RawMeasurement {
        RawMeasurement {
            value,
            coordinates: with_coords.then_some(Coordinates {
                latitude: Some(40.7),
                longitude: Some(-74.0),
            }),
            date: with_date.then_some(MeasurementDate {
                utc: Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            }),
        }
    }

    #[test]
    fn candidates_keep_only_usable_records() {
        let page = MeasurementsPage {
            results: Some(vec![
                raw(Some(12.5), true, true),
                raw(None, true, true),
                raw(Some(8.0), false, true),
                raw(Some(8.0), true, false),
            ]),
        };
        let (total, candidates) = candidate_rows(&page);
        assert_eq!(total, 4);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].pm25_value, 12.5);
        assert_eq!(candidates[0].data_source, "openaq");
        assert!(!candidates[0].is_prediction);
        assert!(candidates[0].measurement_date.is_some());
    }

    #[test]
    fn empty_or_missing_results_produce_no_candidates() {
        let (total, candidates) = candidate_rows(&MeasurementsPage { results: None });
        assert_eq!(total, 0);
        assert!(candidates.is_empty());

        let (total, candidates) = candidate_rows(&MeasurementsPage { results: Some(vec![]) });
        assert_eq!(total, 0);
        assert!(candidates.is_empty());
    }
}
