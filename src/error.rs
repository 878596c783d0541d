/// Error Handling Module
///
/// One classified error type per concern, all converging on `AuthError`.
/// 1. Field-level input validation errors
/// 2. Token verification rejections (stateless checks)
/// 3. Storage errors from the user and credential stores
/// 4. The service-level taxonomy and its HTTP mapping
///
/// Client-facing bodies never carry internal error text. Every failure is
/// logged together with the `error_id` returned to the client.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for client input, tagged with the offending field
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("{0} is too short (minimum {1} characters)")]
    TooShort(&'static str, usize),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(&'static str, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(&'static str),
    #[error("{0} contains suspicious content")]
    SuspiciousContent(&'static str),
    #[error("request body is invalid: {0}")]
    Body(String),
}

impl ValidationError {
    /// Name of the field that failed validation, if any
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::EmptyField(field)
            | ValidationError::TooShort(field, _)
            | ValidationError::TooLong(field, _)
            | ValidationError::InvalidFormat(field)
            | ValidationError::SuspiciousContent(field) => Some(field),
            ValidationError::Body(_) => None,
        }
    }
}

/// Why a token failed stateless verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    #[error("token has expired")]
    Expired,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token is malformed")]
    Malformed,
}

/// Storage errors shared by the user and credential stores
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let unique_violation = err
            .as_database_error()
            .and_then(|db| db.code())
            .map(|code| code == "23505")
            .unwrap_or(false);

        if unique_violation {
            StoreError::Conflict
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

/// ============================================================================
/// 2. SERVICE-LEVEL ERROR TYPE
/// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already registered")]
    Conflict,
    #[error("token rejected: {0}")]
    Token(#[from] TokenRejection),
    #[error("refresh token revoked")]
    Revoked,
    #[error("dependency unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AuthError::Conflict,
            StoreError::Unavailable(msg) => AuthError::Unavailable(msg),
        }
    }
}

impl AuthError {
    /// Whether the client may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Unavailable(_))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Correlation id, also present in the server log line for this failure
    pub error_id: String,
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    pub status: u16,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: Option<&str>) -> Self {
        self.field = field.map(str::to_string);
        self
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, error_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, error_id: &str);
}

impl ErrorHandler for AuthError {
    fn error_response(&self, error_id: &str) -> (StatusCode, ErrorResponse) {
        let (code, message) = match self {
            AuthError::InvalidInput(e) => ("VALIDATION_ERROR", e.to_string()),
            // Same body for unknown email and wrong password
            AuthError::InvalidCredentials => {
                ("INVALID_CREDENTIALS", "Invalid credentials".to_string())
            }
            AuthError::Conflict => ("DUPLICATE_ENTRY", "Email already registered".to_string()),
            // Expired, BadSignature and Malformed collapse to one answer
            AuthError::Token(_) => ("TOKEN_INVALID", "Invalid or expired token".to_string()),
            AuthError::Revoked => ("TOKEN_REVOKED", "Refresh token has been revoked".to_string()),
            // Storage outages answer like any other server fault
            AuthError::Unavailable(_) => ("SERVICE_UNAVAILABLE", "Internal server error".to_string()),
            AuthError::Internal(_) => ("INTERNAL_ERROR", "Internal server error".to_string()),
        };

        let status = ResponseError::status_code(self);
        let field = match self {
            AuthError::InvalidInput(e) => e.field(),
            _ => None,
        };

        let body = ErrorResponse::new(
            error_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        )
        .with_field(field);

        (status, body)
    }

    fn log_error(&self, error_id: &str) {
        match self {
            AuthError::InvalidInput(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Validation error");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!(error_id = error_id, "Invalid credentials attempt");
            }
            AuthError::Conflict => {
                tracing::warn!(error_id = error_id, "Duplicate registration attempt");
            }
            AuthError::Token(reason) => {
                tracing::warn!(error_id = error_id, reason = %reason, "Token rejected");
            }
            AuthError::Revoked => {
                tracing::warn!(error_id = error_id, "Revoked refresh token presented");
            }
            AuthError::Unavailable(msg) => {
                tracing::error!(error_id = error_id, error = %msg, "Storage unavailable");
            }
            AuthError::Internal(msg) => {
                tracing::error!(error_id = error_id, error = %msg, "Internal error");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AuthError {
    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&error_id);

        let (status, body) = <Self as ErrorHandler>::error_response(self, &error_id);

        let mut response = HttpResponse::build(status);
        if self.is_retryable() {
            response.insert_header(("Retry-After", "1"));
        }
        response.json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::Token(_) | AuthError::Revoked => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Conflict => StatusCode::CONFLICT,
            AuthError::Unavailable(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
