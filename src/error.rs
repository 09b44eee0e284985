//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::analysis::AnalysisError;

pub type AppResult<T> = Result<T, AppError>;

/// Attached to 403 responses so the auth layer can audit the denial
#[derive(Debug, Clone)]
pub struct AccessDenied(pub String);

#[derive(Debug)]
pub enum AppError {
    // Auth errors
    InvalidCredentials,
    InactiveAccount,
    TokenExpired,
    TokenInvalid,
    Unauthorized,
    Forbidden(String),

    // Resource errors
    NotFound(String),
    AlreadyExists(String),

    // Validation / workflow errors
    ValidationError(String),
    InvalidState(String),

    // Analysis engine disabled
    ServiceUnavailable(String),

    // Database errors
    DatabaseError(String),

    // Generic errors
    InternalError(String),
}

impl AppError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        AppError::Forbidden(reason.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials
            | AppError::InactiveAccount
            | AppError::TokenExpired
            | AppError::TokenInvalid
            | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::ValidationError(_) | AppError::InvalidState(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError(_) | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::InvalidCredentials => "Invalid matricule or password",
            AppError::InactiveAccount => "User account is inactive",
            AppError::TokenExpired => "Token has expired",
            AppError::TokenInvalid => "Invalid token",
            AppError::Unauthorized => "Authentication required",
            AppError::Forbidden(msg) => msg.as_str(),
            AppError::NotFound(msg) => msg.as_str(),
            AppError::AlreadyExists(msg) => msg.as_str(),
            AppError::ValidationError(msg) => msg.as_str(),
            AppError::InvalidState(msg) => msg.as_str(),
            AppError::ServiceUnavailable(msg) => msg.as_str(),
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                "Database error occurred"
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error"
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        let mut response = (status, body).into_response();
        if let AppError::Forbidden(reason) = self {
            response.extensions_mut().insert(AccessDenied(reason));
        }
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // unique_violation
            if db_err.code().as_deref() == Some("23505") {
                return AppError::AlreadyExists(
                    db_err.constraint().map(|c| format!("Duplicate value ({})", c))
                        .unwrap_or_else(|| "Resource already exists".to_string()),
                );
            }
        }
        AppError::DatabaseError(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::TokenInvalid,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Disabled => AppError::ServiceUnavailable(err.to_string()),
            _ => AppError::ValidationError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::forbidden("no").status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::InvalidState("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::ServiceUnavailable("x".into()).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(AppError::DatabaseError("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_analysis_error_conversion() {
        let err: AppError = AnalysisError::Disabled.into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err: AppError = AnalysisError::EmptyInput("coordinates").into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_forbidden_carries_denial_reason() {
        let response = AppError::forbidden("Insufficient clearance").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let denied = response.extensions().get::<AccessDenied>().unwrap();
        assert_eq!(denied.0, "Insufficient clearance");

        let response = AppError::NotFound("Report not found".into()).into_response();
        assert!(response.extensions().get::<AccessDenied>().is_none());
    }
}
