//! Handwritten Diesel schema declarations used by model structs.
//!
//! Migrations define the actual tables and constraints. This module only
//! provides `diesel::table!` declarations so we can derive
//! Insertable/Queryable in a type-safe way without running
//! `diesel print-schema`.

diesel::table! {
    pm25_measurements (id) {
        id -> BigInt,
        latitude -> Double,
        longitude -> Double,
        pm25_value -> Double,
        aod_value -> Nullable<Double>,
        no2_value -> Nullable<Double>,
        temperature -> Nullable<Double>,
        humidity -> Nullable<Double>,
        wind_speed -> Nullable<Double>,
        measurement_date -> Timestamptz,
        data_source -> Text, // manual | openaq | synthetic | ml_prediction | ...
        is_prediction -> Bool,
        model_version -> Nullable<Text>,
        prediction_accuracy -> Nullable<Double>,
        validation_status -> Text, // pending | validated | rejected | deleted
        created_at -> Timestamptz,
    }
}

diesel::table! {
    model_metrics (id) {
        id -> BigInt,
        model_name -> Text,
        rmse -> Nullable<Double>,
        r_squared -> Nullable<Double>,
        mae -> Nullable<Double>,
        validation_score -> Nullable<Double>,
        training_samples -> Nullable<Integer>,
        feature_importance -> Nullable<Jsonb>,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(pm25_measurements, model_metrics);
