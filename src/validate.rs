//! Field validators shared by the create/update/metrics write paths.
//!
//! Each validator returns the user-facing message for its field; the first
//! failing field short-circuits the operation. NaN never passes a range
//! check because the comparisons are written positively.

use crate::db::models::validation_status;

pub fn latitude(value: f64) -> Result<(), String> {
    if value >= -90.0 && value <= 90.0 {
        Ok(())
    } else {
        Err("Latitude must be between -90 and 90".to_string())
    }
}

pub fn longitude(value: f64) -> Result<(), String> {
    if value >= -180.0 && value <= 180.0 {
        Ok(())
    } else {
        Err("Longitude must be between -180 and 180".to_string())
    }
}

pub fn coordinates(lat: f64, lng: f64) -> Result<(), String> {
    if lat >= -90.0 && lat <= 90.0 && lng >= -180.0 && lng <= 180.0 {
        Ok(())
    } else {
        Err("Invalid coordinates: latitude must be -90 to 90, longitude must be -180 to 180".to_string())
    }
}

pub fn pm25_value(value: f64) -> Result<(), String> {
    if value >= 0.0 && value <= 500.0 {
        Ok(())
    } else {
        Err("PM2.5 value must be between 0 and 500 μg/m³".to_string())
    }
}

pub fn aod_value(value: f64) -> Result<(), String> {
    if value >= 0.0 && value <= 5.0 {
        Ok(())
    } else {
        Err("AOD value must be between 0 and 5".to_string())
    }
}

pub fn no2_value(value: f64) -> Result<(), String> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err("NO2 value must be non-negative".to_string())
    }
}

pub fn temperature(value: f64) -> Result<(), String> {
    if value >= -50.0 && value <= 60.0 {
        Ok(())
    } else {
        Err("Temperature must be between -50°C and 60°C".to_string())
    }
}

pub fn humidity(value: f64) -> Result<(), String> {
    if value >= 0.0 && value <= 100.0 {
        Ok(())
    } else {
        Err("Humidity must be between 0% and 100%".to_string())
    }
}

pub fn wind_speed(value: f64) -> Result<(), String> {
    if value >= 0.0 && value <= 50.0 {
        Ok(())
    } else {
        Err("Wind speed must be between 0 and 50 m/s".to_string())
    }
}

pub fn prediction_accuracy(value: f64) -> Result<(), String> {
    if value >= 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err("Prediction accuracy must be between 0 and 1".to_string())
    }
}

pub fn status(value: &str) -> Result<(), String> {
    if validation_status::ALL.contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "Validation status must be one of {}",
            validation_status::ALL.join(", ")
        ))
    }
}
