// models/src/errors.rs

use std::collections::BTreeMap;
use std::fmt;
use std::io;

pub use thiserror::Error;
use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeJsonError;
use serde_yaml::Error as SerdeYamlError;
use tokio::time::error::Elapsed;

/// Coarse failure classes shared with the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    BadRequest,
    NotFound,
    Forbidden,
    Unauthorized,
    Cancelled,
    StorageError,
    PartialFailure,
    Internal,
}

impl ErrorCategory {
    /// Status code a handler should answer with for this category.
    /// Partial batch results answer 207 Multi-Status with the outcome as body.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCategory::BadRequest => 400,
            ErrorCategory::Unauthorized => 401,
            ErrorCategory::Forbidden => 403,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Cancelled => 499,
            ErrorCategory::PartialFailure => 207,
            ErrorCategory::StorageError | ErrorCategory::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::BadRequest => "bad_request",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Forbidden => "forbidden",
            ErrorCategory::Unauthorized => "unauthorized",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::StorageError => "storage_error",
            ErrorCategory::PartialFailure => "partial_failure",
            ErrorCategory::Internal => "internal",
        };
        write!(f, "{}", name)
    }
}

/// One item of a bulk operation that did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub id: String,
    pub reason: String,
}

/// Per-item bookkeeping for bulk operations (reminders, balancing, broadcasts).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: Vec<ItemFailure>,
}

impl BatchOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, id: impl ToString, reason: impl Into<String>) {
        self.failed.push(ItemFailure {
            id: id.to_string(),
            reason: reason.into(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.id.as_str()).collect()
    }

    /// Turns an outcome with any failed item into `PlannerError::PartialFailure`.
    pub fn into_result(self) -> PlannerResult<BatchOutcome> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(PlannerError::PartialFailure(self))
        }
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded, self.failed.len())
    }
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("{entity} {id} was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Partial failure: {0}")]
    PartialFailure(BatchOutcome),
    #[error("An internal error occurred: {0}")]
    InternalError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl PlannerError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        PlannerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PlannerError::BadRequest(_) | PlannerError::Validation(_) => ErrorCategory::BadRequest,
            PlannerError::NotFound { .. } => ErrorCategory::NotFound,
            PlannerError::Forbidden(_) => ErrorCategory::Forbidden,
            PlannerError::Unauthorized(_) => ErrorCategory::Unauthorized,
            PlannerError::Cancelled(_) => ErrorCategory::Cancelled,
            PlannerError::StorageError(_) => ErrorCategory::StorageError,
            PlannerError::PartialFailure(_) => ErrorCategory::PartialFailure,
            PlannerError::InternalError(_) | PlannerError::ConfigurationError(_) => ErrorCategory::Internal,
        }
    }

    /// Structured details a handler may attach to the response body.
    pub fn context(&self) -> BTreeMap<String, String> {
        let mut context = BTreeMap::new();
        match self {
            PlannerError::NotFound { entity, id } => {
                context.insert("entity".to_string(), entity.to_string());
                context.insert("id".to_string(), id.clone());
            }
            PlannerError::PartialFailure(outcome) => {
                context.insert("succeeded".to_string(), outcome.succeeded.to_string());
                for failure in &outcome.failed {
                    context.insert(format!("failed.{}", failure.id), failure.reason.clone());
                }
            }
            _ => {}
        }
        context
    }
}

impl From<Elapsed> for PlannerError {
    fn from(_: Elapsed) -> Self {
        PlannerError::Cancelled("deadline exceeded".to_string())
    }
}

impl From<SerdeJsonError> for PlannerError {
    fn from(err: SerdeJsonError) -> Self {
        PlannerError::StorageError(format!("JSON processing error: {}", err))
    }
}

impl From<SerdeYamlError> for PlannerError {
    fn from(err: SerdeYamlError) -> Self {
        PlannerError::ConfigurationError(format!("YAML processing error: {}", err))
    }
}

impl From<io::Error> for PlannerError {
    fn from(err: io::Error) -> Self {
        PlannerError::StorageError(format!("I/O error: {}", err))
    }
}

impl From<AnyhowError> for PlannerError {
    fn from(err: AnyhowError) -> Self {
        PlannerError::StorageError(format!("Underlying storage operation failed: {}", err))
    }
}

/// A validation error.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// Latitude outside [-90, 90] or longitude outside [-180, 180].
    #[error("invalid coordinate ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
    /// A polygon needs at least three vertices.
    #[error("boundary needs at least 3 points, got {0}")]
    TooFewBoundaryPoints(usize),
    /// A route needs at least an origin and a destination.
    #[error("route needs at least 2 points, got {0}")]
    TooFewRoutePoints(usize),
    /// A health metric without any vital sign.
    #[error("health metric must contain at least one vital sign")]
    NoVitalSigns,
    #[error("previous deliveries ({deliveries}) exceed previous pregnancies ({pregnancies})")]
    DeliveriesExceedPregnancies { deliveries: u32, pregnancies: u32 },
    /// An identifier is invalid (e.g., malformed string).
    #[error("identifier '{0}' is invalid")]
    InvalidIdentifier(String),
}

/// A type alias for a `Result` that returns a `PlannerError` on failure.
pub type PlannerResult<T> = Result<T, PlannerError>;

/// A type alias for a `Result` that returns a `ValidationError` on failure.
pub type ValidationResult<T> = Result<T, ValidationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_status_codes() {
        assert_eq!(PlannerError::BadRequest("x".into()).category().http_status(), 400);
        assert_eq!(PlannerError::not_found("visit", "abc").category().http_status(), 404);
        assert_eq!(PlannerError::Cancelled("late".into()).category().http_status(), 499);
        assert_eq!(PlannerError::StorageError("db".into()).category().http_status(), 500);
        assert_eq!(
            PlannerError::PartialFailure(BatchOutcome::new()).category().http_status(),
            207
        );
        assert_eq!(
            PlannerError::from(ValidationError::NoVitalSigns).category(),
            ErrorCategory::BadRequest
        );
    }

    #[test]
    fn partial_failure_keeps_per_item_reasons() {
        let mut outcome = BatchOutcome::new();
        outcome.record_success();
        outcome.record_failure("v-3", "provider rejected");

        let err = outcome.into_result().unwrap_err();
        let context = err.context();
        assert_eq!(context.get("succeeded").map(String::as_str), Some("1"));
        assert_eq!(context.get("failed.v-3").map(String::as_str), Some("provider rejected"));
    }

    #[test]
    fn complete_outcome_is_ok() {
        let mut outcome = BatchOutcome::new();
        outcome.record_success();
        assert_eq!(outcome.into_result().unwrap().succeeded, 1);
    }
}
