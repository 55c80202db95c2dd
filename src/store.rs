//! Query and mutation plumbing for the measurement store.
//!
//! Distance is computed caller-side; these queries only apply the
//! index-friendly bounding-box prefilter plus field-level predicates.
//! Diesel errors propagate as `QueryResult` and are converted to
//! `ServiceError::Store` at the operation boundary.

use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;

use crate::db::models::{
    Measurement, MeasurementPatch, ModelMetric, NewMeasurement, NewModelMetric, validation_status,
};
use crate::geo::GeoBounds;
use crate::schema;

/// Row cap for the environmental neighborhood query.
pub const REGION_ROW_LIMIT: i64 = 200;
/// Row cap for the training-set query.
pub const TRAINING_ROW_LIMIT: i64 = 2000;

#[derive(Debug, Clone, Default)]
pub struct MeasurementFilter {
    pub include_predictions: bool,
    pub include_deleted: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Rows inside `bounds` within the half-open date `window` carrying at
/// least one non-null environmental covariate.
pub fn query_region(
    conn: &mut PgConnection,
    bounds: GeoBounds,
    window: (DateTime<Utc>, DateTime<Utc>),
) -> QueryResult<Vec<Measurement>> {
    use schema::pm25_measurements::dsl as M;

    M::pm25_measurements
        .filter(M::latitude.between(bounds.lat_min, bounds.lat_max))
        .filter(M::longitude.between(bounds.lng_min, bounds.lng_max))
        .filter(M::measurement_date.ge(window.0))
        .filter(M::measurement_date.lt(window.1))
        .filter(
            M::aod_value
                .is_not_null()
                .or(M::no2_value.is_not_null())
                .or(M::temperature.is_not_null())
                .or(M::humidity.is_not_null())
                .or(M::wind_speed.is_not_null()),
        )
        .select(Measurement::as_select())
        .load(conn)
}

/// Rows inside `bounds` passing the pm25 validity band plus the optional
/// prediction/date/soft-delete filters.
pub fn query_measurements(
    conn: &mut PgConnection,
    bounds: GeoBounds,
    filter: &MeasurementFilter,
) -> QueryResult<Vec<Measurement>> {
    use schema::pm25_measurements::dsl as M;

    let mut query = M::pm25_measurements
        .filter(M::latitude.between(bounds.lat_min, bounds.lat_max))
        .filter(M::longitude.between(bounds.lng_min, bounds.lng_max))
        .filter(M::pm25_value.gt(0.0))
        .filter(M::pm25_value.lt(500.0))
        .select(Measurement::as_select())
        .into_boxed();

    if !filter.include_predictions {
        query = query.filter(M::is_prediction.eq(false));
    }
    if !filter.include_deleted {
        query = query.filter(M::validation_status.ne(validation_status::DELETED));
    }
    if let Some(start) = filter.start_date {
        query = query.filter(M::measurement_date.ge(start));
    }
    if let Some(end) = filter.end_date {
        query = query.filter(M::measurement_date.le(end));
    }

    query.load(conn)
}

/// Most-recent non-prediction rows passing every strict covariate validity
/// band, newest first.
pub fn training_set(conn: &mut PgConnection, limit: i64) -> QueryResult<Vec<Measurement>> {
    use schema::pm25_measurements::dsl as M;

    M::pm25_measurements
        .filter(M::pm25_value.gt(0.0))
        .filter(M::pm25_value.lt(500.0))
        .filter(M::aod_value.is_not_null())
        .filter(M::no2_value.is_not_null())
        .filter(M::temperature.is_not_null())
        .filter(M::temperature.gt(-50.0))
        .filter(M::temperature.lt(60.0))
        .filter(M::humidity.is_not_null())
        .filter(M::humidity.ge(0.0))
        .filter(M::humidity.le(100.0))
        .filter(M::wind_speed.is_not_null())
        .filter(M::wind_speed.ge(0.0))
        .filter(M::wind_speed.lt(50.0))
        .filter(M::is_prediction.eq(false))
        .order(M::measurement_date.desc())
        .limit(limit)
        .select(Measurement::as_select())
        .load(conn)
}

pub fn insert_measurement(conn: &mut PgConnection, row: &NewMeasurement) -> QueryResult<Measurement> {
    use schema::pm25_measurements::dsl as M;

    diesel::insert_into(M::pm25_measurements)
        .values(row)
        .returning(Measurement::as_returning())
        .get_result(conn)
}

/// Applies a partial patch; `Err(NotFound)` when the id does not exist.
pub fn update_measurement(
    conn: &mut PgConnection,
    id: i64,
    patch: &MeasurementPatch,
) -> QueryResult<Measurement> {
    use schema::pm25_measurements::dsl as M;

    diesel::update(M::pm25_measurements.find(id))
        .set(patch)
        .returning(Measurement::as_returning())
        .get_result(conn)
}

/// De-duplication probe used by ingestion: an existing row with the same
/// location, timestamp, and source makes a candidate a duplicate.
pub fn duplicate_exists(
    conn: &mut PgConnection,
    latitude: f64,
    longitude: f64,
    measurement_date: DateTime<Utc>,
    source: &str,
) -> QueryResult<bool> {
    use schema::pm25_measurements::dsl as M;

    diesel::select(exists(
        M::pm25_measurements
            .filter(M::latitude.eq(latitude))
            .filter(M::longitude.eq(longitude))
            .filter(M::measurement_date.eq(measurement_date))
            .filter(M::data_source.eq(source)),
    ))
    .get_result(conn)
}

pub fn insert_model_metric(conn: &mut PgConnection, row: &NewModelMetric) -> QueryResult<ModelMetric> {
    use schema::model_metrics::dsl as MM;

    diesel::insert_into(MM::model_metrics)
        .values(row)
        .returning(ModelMetric::as_returning())
        .get_result(conn)
}
