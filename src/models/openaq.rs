//! Wire models for the OpenAQ v3 measurements endpoint.
//!
//! Scope: types only, no client code. Every field is optional; upstream
//! payloads are filtered for usability before ingestion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementsPage {
    #[serde(default)]
    pub results: Option<Vec<RawMeasurement>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMeasurement {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub date: Option<MeasurementDate>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MeasurementDate {
    #[serde(default)]
    pub utc: Option<DateTime<Utc>>,
}

impl RawMeasurement {
    /// A record is usable when it carries a finite value, coordinates, and
    /// a UTC timestamp.
    pub fn is_usable(&self) -> bool {
        let value_ok = self.value.map(f64::is_finite).unwrap_or(false);
        let coords_ok = self
            .coordinates
            .map(|c| c.latitude.is_some() && c.longitude.is_some())
            .unwrap_or(false);
        let date_ok = self.date.map(|d| d.utc.is_some()).unwrap_or(false);
        value_ok && coords_ok && date_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usability_requires_value_coordinates_and_date() {
        let json = r#"{
            "results": [
                {
                    "value": 12.5,
                    "coordinates": {"latitude": 40.7, "longitude": -74.0},
                    "date": {"utc": "2024-05-01T12:00:00Z"}
                },
                {
                    "value": null,
                    "coordinates": {"latitude": 40.7, "longitude": -74.0},
                    "date": {"utc": "2024-05-01T12:00:00Z"}
                },
                {
                    "value": 9.0,
                    "coordinates": {"latitude": 40.7},
                    "date": {"utc": "2024-05-01T12:00:00Z"}
                },
                {"value": 9.0}
            ]
        }"#;
        let page: MeasurementsPage = serde_json::from_str(json).expect("parse page");
        let results = page.results.expect("results");
        let usable: Vec<_> = results.iter().filter(|r| r.is_usable()).collect();
        assert_eq!(results.len(), 4);
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].value, Some(12.5));
    }

    #[test]
    fn missing_results_field_parses_to_none() {
        let page: MeasurementsPage = serde_json::from_str(r#"{"meta": {"found": 0}}"#).expect("parse page");
        assert!(page.results.is_none());
    }
}
