//! Standalone HTTP client for the OpenAQ API (v3 measurements endpoint).
//!
//! - Blocking client using `ureq` (no async).
//! - Uses the wire models in `crate::models::openaq`.
//! - PM2.5 is OpenAQ parameter id 2; results are requested newest-first.
//! - An API key is optional; when configured it is sent as `X-API-Key`.

use std::time::Duration;

use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::models::openaq::MeasurementsPage;

pub const DEFAULT_BASE_URL: &str = "https://api.openaq.org/v3";
const PM25_PARAMETER_ID: u32 = 2;
const MAX_PAGE_LIMIT: usize = 1000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum OpenAqError {
    Transport(String),
    Http { status: u16, message: String },
    Json(serde_path_to_error::Error<serde_json::Error>),
}

impl core::fmt::Display for OpenAqError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            OpenAqError::Transport(s) => write!(f, "transport error: {}", s),
            OpenAqError::Http { status, message } => write!(f, "http {}: {}", status, message),
            OpenAqError::Json(e) => write!(f, "json error: {}", e),
        }
    }
}

impl std::error::Error for OpenAqError {}

/// Parameters for one measurements page fetch.
#[derive(Debug, Clone, Default)]
pub struct MeasurementsQuery {
    pub country: Option<String>,
    pub city: Option<String>,
    /// (latitude, longitude) center for a radius search.
    pub coordinates: Option<(f64, f64)>,
    pub radius_km: Option<f64>,
    pub limit: usize,
}

impl MeasurementsQuery {
    /// Query-string pairs in the order the API documents them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("parameters_id", PM25_PARAMETER_ID.to_string()),
            ("order_by", "datetime".to_string()),
            ("sort", "desc".to_string()),
            ("limit", self.limit.min(MAX_PAGE_LIMIT).to_string()),
        ];
        if let Some(country) = &self.country {
            pairs.push(("countries_id", country.clone()));
        }
        if let Some(city) = &self.city {
            pairs.push(("cities_id", city.clone()));
        }
        if let Some((lat, lng)) = self.coordinates {
            pairs.push(("coordinates", format!("{},{}", lat, lng)));
            if let Some(radius_km) = self.radius_km {
                // The API takes meters.
                pairs.push(("radius", format!("{}", (radius_km * 1000.0) as i64)));
            }
        }
        pairs
    }

    /// Human-readable request URL for logs and ingestion reports.
    pub fn describe(&self, base_url: &str) -> String {
        let query = self
            .query_pairs()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/measurements?{}", base_url, query)
    }
}

pub struct OpenAqClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAqClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();
        OpenAqClient {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.into(),
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn fetch_measurements(&self, query: &MeasurementsQuery) -> Result<MeasurementsPage, OpenAqError> {
        self.get_json("/measurements", &query.query_pairs())
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, OpenAqError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .agent
            .get(&url)
            .header("Accept", "application/json")
            .header("User-Agent", "PM25-Monitor/1.0");
        if let Some(key) = &self.api_key {
            req = req.header("X-API-Key", key);
        }
        for (k, v) in query {
            req = req.query(*k, v);
        }

        let mut resp = req.call().map_err(|e| OpenAqError::Transport(e.to_string()))?;
        if resp.status() != StatusCode::OK {
            let status = resp.status().as_u16();
            let message = resp
                .body_mut()
                .read_to_string()
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(OpenAqError::Http { status, message });
        }

        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| OpenAqError::Transport(e.to_string()))?;
        let mut deserializer = serde_json::Deserializer::from_str(&body);
        serde_path_to_error::deserialize(&mut deserializer).map_err(OpenAqError::Json)
    }
}
