// src/errors.rs
// DOCUMENTATION: Custom error types and HTTP responses
// PURPOSE: Centralized error handling for entire application

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

/// Application-specific error types
/// DOCUMENTATION: Comprehensive error enum for all possible failures
/// Each variant maps to appropriate HTTP status code and error response
#[derive(Error, Debug)]
pub enum CrmError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("Forbidden access")]
    Forbidden,

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Service temporarily unavailable")]
    ServiceUnavailable,
}

impl CrmError {
    /// Map a sqlx error, logging it with the failing operation
    /// DOCUMENTATION: unique violations become AlreadyExists, missing rows NotFound
    pub fn from_db(context: &str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => {
                log::warn!("{}: row not found", context);
                CrmError::NotFound(context.to_string())
            }
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                log::warn!("{}: unique violation: {}", context, db_err);
                CrmError::AlreadyExists(db_err.message().to_string())
            }
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23503") => {
                log::warn!("{}: foreign key violation: {}", context, db_err);
                CrmError::InvalidInput(format!("{}: referenced record does not exist", context))
            }
            _ => {
                log::error!("{}: {}", context, err);
                CrmError::DatabaseError(format!("{}: {}", context, err))
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            CrmError::NotFound(_) => "NOT_FOUND",
            CrmError::AlreadyExists(_) => "ALREADY_EXISTS",
            CrmError::Conflict(_) => "CONFLICT",
            CrmError::DatabaseError(_) => "DATABASE_ERROR",
            CrmError::InvalidInput(_) => "INVALID_INPUT",
            CrmError::ValidationError(_) => "VALIDATION_ERROR",
            CrmError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CrmError::Unauthorized => "UNAUTHORIZED",
            CrmError::Forbidden => "FORBIDDEN",
            CrmError::InternalError(_) => "INTERNAL_ERROR",
            CrmError::ExternalApiError(_) => "EXTERNAL_API_ERROR",
            CrmError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            CrmError::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

impl From<validator::ValidationErrors> for CrmError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CrmError::ValidationError(errors.to_string())
    }
}

/// Convert CrmError to HTTP response
/// DOCUMENTATION: Maps error types to HTTP status codes and JSON responses
impl ResponseError for CrmError {
    fn error_response(&self) -> HttpResponse {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        });

        HttpResponse::build(self.status_code()).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            CrmError::NotFound(_) => StatusCode::NOT_FOUND,
            CrmError::AlreadyExists(_) | CrmError::Conflict(_) => StatusCode::CONFLICT,
            CrmError::DatabaseError(_) | CrmError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CrmError::InvalidInput(_) | CrmError::ValidationError(_) => StatusCode::BAD_REQUEST,
            CrmError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CrmError::Unauthorized => StatusCode::UNAUTHORIZED,
            CrmError::Forbidden => StatusCode::FORBIDDEN,
            CrmError::ExternalApiError(_) => StatusCode::BAD_GATEWAY,
            CrmError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            CrmError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn test_status_codes() {
        assert_eq!(CrmError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(CrmError::AlreadyExists("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            CrmError::InvalidTransition { from: "proposed".into(), to: "active".into() }.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(CrmError::RateLimitExceeded.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(CrmError::ExternalApiError("x".into()).status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = CrmError::from_db("Person 42", sqlx::Error::RowNotFound);
        assert!(matches!(err, CrmError::NotFound(ref m) if m == "Person 42"));
    }

    #[actix_rt::test]
    async fn test_error_body_shape() {
        let resp = CrmError::Forbidden.error_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let bytes = to_bytes(resp.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "FORBIDDEN");
        assert_eq!(body["error"]["message"], "Forbidden access");
        assert!(body["error"]["timestamp"].is_string());
    }
}
