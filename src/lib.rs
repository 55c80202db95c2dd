pub mod models {
    pub mod openaq;
}

pub mod client;
pub mod config;
pub mod db {
    pub mod models;
}
pub mod error;
pub mod estimator;
pub mod geo;
pub mod predictor;
pub mod quality;
pub mod schema;
pub mod store;
pub mod validate;
pub mod services {
    pub mod environmental;
    pub mod ingest;
    pub mod measurements;
    pub mod metrics;
    pub mod prediction;
    pub mod synthetic;
}

use crate::client::OpenAqClient;
use crate::config::Config;
use crate::services::ingest::{self, IngestCoordinates, IngestRequest};
use chrono::Utc;
use diesel::PgConnection;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::thread;
use std::time::Instant;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| format!("Applying database migrations failed: {}", e))?;
    if applied.is_empty() {
        info!("Database schema is up to date; no migrations were applied");
    } else {
        let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
        info!("Applied {} database migration(s): {}", applied.len(), names);
    }
    Ok(())
}

fn ingest_request_from_config(cfg: &Config) -> IngestRequest {
    IngestRequest {
        country: cfg.ingest_country.clone(),
        city: cfg.ingest_city.clone(),
        coordinates: cfg.ingest_center.map(|(latitude, longitude)| IngestCoordinates {
            latitude,
            longitude,
        }),
        radius: cfg.ingest_radius_km,
        limit: Some(cfg.ingest_limit),
    }
}

fn run_ingest_cycle(conn: &mut PgConnection, client: &OpenAqClient, req: &IngestRequest, rng: &mut SmallRng) {
    match ingest::ingest_external(conn, client, req, Utc::now(), rng) {
        Ok(report) => info!(
            "Ingest cycle complete: source={} inserted={} duplicates={} failed={}",
            report.source, report.inserted, report.skipped_duplicates, report.failed
        ),
        Err(e) => warn!("Ingest cycle failed ({}): {}", e.kind(), e),
    }
}

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (ingest_enabled={}, ingest_interval={}s, ingest_limit={}, center={})",
        cfg.ingest_enabled,
        cfg.ingest_interval.as_secs(),
        cfg.ingest_limit,
        cfg.ingest_center
            .map(|(lat, lng)| format!("{},{}", lat, lng))
            .unwrap_or_else(|| "-".to_string()),
    );

    // 2) Connect DB
    let mut conn = PgConnection::establish(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");

    // 3) Apply pending database migrations
    apply_database_migrations(&mut conn)?;

    // 4) Init OpenAQ client
    let client = OpenAqClient::new(cfg.openaq_base_url.clone(), cfg.openaq_api_key.clone());
    let ingest_req = ingest_request_from_config(&cfg);
    let mut rng = SmallRng::from_os_rng();

    // 5) Ingestion loop (steady cadence); one immediate cycle either way
    if !cfg.ingest_enabled {
        run_ingest_cycle(&mut conn, &client, &ingest_req, &mut rng);
        info!("Ingestion loop disabled via INGEST_ENABLED; exiting after initial cycle");
        return Ok(());
    }
    loop {
        let tick_start = Instant::now();
        run_ingest_cycle(&mut conn, &client, &ingest_req, &mut rng);

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < cfg.ingest_interval {
            thread::sleep(cfg.ingest_interval - elapsed);
        }
    }
}
