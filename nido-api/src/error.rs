/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers return `Result<T, ApiError>` which automatically converts
/// to appropriate HTTP status codes.
///
/// Library errors from `nido-shared` convert through `From` impls so that
/// controllers match on variants, never on error message text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nido_shared::auth::provider::IdentityError;
use nido_shared::geo::GeoError;
use nido_shared::images::ImageError;
use nido_shared::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409) - e.g., duplicate email or agency name
    Conflict(String),

    /// Unprocessable entity (422) - validation errors
    ValidationError(Vec<ValidationErrorDetail>),

    /// Too many requests (429)
    RateLimitExceeded { retry_after: u64, message: String },

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

impl ApiError {
    /// Validation error for a single field
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: field.to_string(),
            message: message.into(),
        }])
    }
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::RateLimitExceeded { message, .. } => {
                write!(f, "Rate limit exceeded: {}", message)
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Handle rate limit separately to add Retry-After header
        if let ApiError::RateLimitExceeded {
            retry_after,
            message,
        } = &self
        {
            let body = Json(ErrorResponse {
                error: "rate_limit_exceeded".to_string(),
                message: message.clone(),
                details: None,
            });

            let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", value);
            }
            return response;
        }

        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::RateLimitExceeded { message, .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
                message,
                None,
            ),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg,
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                // Unique constraint violations surface as conflicts
                if db_err.is_unique_violation() {
                    if let Some(constraint) = db_err.constraint() {
                        if constraint.contains("email") {
                            return ApiError::Conflict("Email already exists".to_string());
                        }
                        if constraint.contains("agencies_name") {
                            return ApiError::Conflict("Agency name already exists".to_string());
                        }
                        return ApiError::Conflict(format!(
                            "Constraint violation: {}",
                            constraint
                        ));
                    }
                    return ApiError::Conflict("Duplicate resource".to_string());
                }

                ApiError::InternalError(format!("Database error: {}", db_err))
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert request-DTO validation failures to API errors
impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        let errors: Vec<ValidationErrorDetail> = e
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();

        ApiError::ValidationError(errors)
    }
}

/// Convert identity-provider errors to API errors
impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::UserExists => {
                ApiError::Conflict("An account with this email already exists".to_string())
            }
            IdentityError::InvalidCredentials => {
                ApiError::Unauthorized("Invalid email or password".to_string())
            }
            IdentityError::NotConfirmed => {
                ApiError::Forbidden("Account is not confirmed".to_string())
            }
            IdentityError::CodeMismatch => ApiError::BadRequest("Invalid code".to_string()),
            IdentityError::CodeExpired => ApiError::BadRequest("Code has expired".to_string()),
            IdentityError::PasswordPolicy(msg) => ApiError::invalid_field("password", msg),
            IdentityError::RateLimited => ApiError::RateLimitExceeded {
                retry_after: 60,
                message: "Too many requests, try again later".to_string(),
            },
            IdentityError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

/// Convert auth middleware errors to API errors
impl From<nido_shared::auth::middleware::AuthError> for ApiError {
    fn from(err: nido_shared::auth::middleware::AuthError) -> Self {
        use nido_shared::auth::middleware::AuthError;

        match err {
            AuthError::MissingCredentials => {
                ApiError::Unauthorized("Missing credentials".to_string())
            }
            AuthError::InvalidFormat(msg) => ApiError::BadRequest(msg),
            AuthError::InvalidToken(msg) => ApiError::Unauthorized(msg),
        }
    }
}

/// Convert JWT errors to API errors
impl From<nido_shared::auth::jwt::JwtError> for ApiError {
    fn from(err: nido_shared::auth::jwt::JwtError) -> Self {
        use nido_shared::auth::jwt::JwtError;

        match err {
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer { .. } => {
                ApiError::Unauthorized("Invalid token issuer".to_string())
            }
            _ => ApiError::Unauthorized(format!("Invalid token: {}", err)),
        }
    }
}

/// Convert password errors to API errors
impl From<nido_shared::auth::password::PasswordError> for ApiError {
    fn from(err: nido_shared::auth::password::PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

/// Convert storage errors to API errors
impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => ApiError::NotFound(format!("Object not found: {}", key)),
            StorageError::Backend(msg) => {
                tracing::error!("Storage backend error: {}", msg);
                ApiError::ServiceUnavailable("Storage backend unavailable".to_string())
            }
        }
    }
}

/// Convert image pipeline errors to API errors
///
/// Everything the validator rejects maps to a field-level validation error;
/// processing and storage failures stay server-side.
impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::UnsupportedFormat(_)
            | ImageError::InvalidImage(_)
            | ImageError::DimensionsTooLarge { .. }
            | ImageError::TooManyPixels { .. }
            | ImageError::SuspiciousCompression => {
                ApiError::invalid_field("image", err.to_string())
            }
            ImageError::Encode(msg) | ImageError::Task(msg) => ApiError::InternalError(msg),
            ImageError::Storage(e) => e.into(),
        }
    }
}

/// Convert geographic validation errors to API errors
impl From<GeoError> for ApiError {
    fn from(err: GeoError) -> Self {
        let field = match err {
            GeoError::PolygonSize(_) => "polygon",
            GeoError::RadiusOutOfRange(_) => "radius_km",
            _ => "location",
        };

        ApiError::invalid_field(field, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("Property not found".to_string());
        assert_eq!(err.to_string(), "Not found: Property not found");
    }

    #[test]
    fn test_validation_error() {
        let errors = vec![
            ValidationErrorDetail {
                field: "email".to_string(),
                message: "Invalid email format".to_string(),
            },
            ValidationErrorDetail {
                field: "password".to_string(),
                message: "Password too short".to_string(),
            },
        ];

        let err = ApiError::ValidationError(errors);
        assert_eq!(err.to_string(), "Validation failed: 2 errors");
    }

    #[test]
    fn test_identity_error_mapping() {
        assert!(matches!(
            ApiError::from(IdentityError::UserExists),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(IdentityError::NotConfirmed),
            ApiError::Forbidden(_)
        ));
        assert!(matches!(
            ApiError::from(IdentityError::InvalidCredentials),
            ApiError::Unauthorized(_)
        ));
        assert!(matches!(
            ApiError::from(IdentityError::RateLimited),
            ApiError::RateLimitExceeded { .. }
        ));
    }

    #[test]
    fn test_image_error_maps_to_validation() {
        let err = ApiError::from(ImageError::SuspiciousCompression);
        match err {
            ApiError::ValidationError(details) => {
                assert_eq!(details[0].field, "image");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_geo_error_field_names() {
        let err = ApiError::from(GeoError::PolygonSize(2));
        match err {
            ApiError::ValidationError(details) => assert_eq!(details[0].field, "polygon"),
            other => panic!("expected validation error, got {:?}", other),
        }

        let err = ApiError::from(GeoError::LongitudeOutOfRange(200.0));
        match err {
            ApiError::ValidationError(details) => assert_eq!(details[0].field, "location"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
