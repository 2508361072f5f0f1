use mongodb::error::{ErrorKind, WriteFailure};
use service_core::error::AppError;
use thiserror::Error;

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] mongodb::bson::ser::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),
}

impl ServiceError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        ServiceError::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        ServiceError::BadRequest(msg.into())
    }

    /// Caller-side problems that a batch records and moves past.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ServiceError::NotFound(_) | ServiceError::BadRequest(_) | ServiceError::Conflict(_)
        )
    }

    /// Database errors caused by a unique index are reported as conflicts.
    pub fn normalize(self) -> Self {
        match self {
            ServiceError::Database(e) if is_duplicate_key(&e) => {
                ServiceError::Conflict(format!("Duplicate record: {}", e))
            }
            other => other,
        }
    }
}

pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(ce) => ce.code == DUPLICATE_KEY_CODE,
        ErrorKind::BulkWrite(bwf) => bwf
            .write_errors
            .as_ref()
            .map(|errors| errors.iter().any(|e| e.code == DUPLICATE_KEY_CODE))
            .unwrap_or(false),
        _ => false,
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err.normalize() {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Serialization(e) => AppError::InternalError(anyhow::anyhow!(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            ServiceError::BadRequest(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn validation_errors_are_recoverable() {
        assert!(ServiceError::not_found("Student not found").is_validation());
        assert!(ServiceError::bad_request("Invalid class id").is_validation());
        assert!(!ServiceError::Internal(anyhow::anyhow!("boom")).is_validation());
    }

    #[test]
    fn maps_to_http_status() {
        let not_found: AppError = ServiceError::not_found("Enrollment not found").into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let conflict: AppError = ServiceError::Conflict("taken".to_string()).into();
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);

        let bad: AppError = ServiceError::bad_request("nope").into();
        assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);
    }
}
