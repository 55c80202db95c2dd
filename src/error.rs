//! Service-level error taxonomy.
//!
//! Every operation returns `Result<Response, ServiceError>`; no error is
//! allowed to propagate past an operation boundary as a panic. Validation
//! runs before any store mutation and short-circuits on the first failing
//! field.

use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum ServiceError {
    /// Out-of-range or missing required field.
    Validation(String),
    /// Reference to an unknown record id.
    NotFound(String),
    /// Training set below the minimum usable size.
    InsufficientData { required: usize, available: usize },
    /// The ensemble produced zero usable predictions.
    Computation(String),
    /// Underlying persistence failure.
    Store(String),
    /// Third-party API failure during ingestion.
    Upstream(String),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InsufficientData { .. } => "insufficient_data",
            ServiceError::Computation(_) => "computation",
            ServiceError::Store(_) => "store",
            ServiceError::Upstream(_) => "upstream",
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Validation(msg) => write!(f, "{}", msg),
            ServiceError::NotFound(msg) => write!(f, "{}", msg),
            ServiceError::InsufficientData { required, available } => write!(
                f,
                "Insufficient high-quality training data available (required {}, available {})",
                required, available
            ),
            ServiceError::Computation(msg) => write!(f, "{}", msg),
            ServiceError::Store(msg) => write!(f, "store error: {}", msg),
            ServiceError::Upstream(msg) => write!(f, "upstream error: {}", msg),
        }
    }
}

impl Error for ServiceError {}

/// JSON failure envelope, the `success: false` half of every operation's
/// tagged result.
#[derive(Debug, serde::Serialize)]
pub struct FailureBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<usize>,
}

impl From<&ServiceError> for FailureBody {
    fn from(err: &ServiceError) -> Self {
        let (required, available) = match err {
            ServiceError::InsufficientData { required, available } => (Some(*required), Some(*available)),
            _ => (None, None),
        };
        FailureBody {
            success: false,
            error: err.to_string(),
            required,
            available,
        }
    }
}
