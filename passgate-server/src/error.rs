//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use webauthn_rs::prelude::WebauthnError;

use crate::store::StorageError;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// A required credential field (username/password) was absent or empty
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// No user exists for the supplied username
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// The username is already taken
    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    /// No pending ceremony challenge is bound to this session
    #[error("No challenge found in session")]
    NoActiveChallenge,

    /// The claimed credential does not belong to the resolved user
    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    /// The verification library rejected the signed response
    #[error("Verification rejected: {0}")]
    VerificationRejected(#[from] WebauthnError),

    /// Password comparison failed
    #[error("Invalid password")]
    InvalidPassword,

    /// The account has no password hash on file
    #[error("No password set for this account")]
    NoPasswordSet,

    /// Credential store failure
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Create a missing credentials error
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingCredentials(field.into())
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingCredentials(_)
            | Self::NoActiveChallenge
            | Self::VerificationRejected(_)
            | Self::NoPasswordSet
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UserNotFound(_) | Self::CredentialNotFound(_) => StatusCode::NOT_FOUND,
            Self::UserAlreadyExists(_) => StatusCode::CONFLICT,
            Self::InvalidPassword => StatusCode::UNAUTHORIZED,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for programmatic error handling
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingCredentials(_) => "MISSING_CREDENTIALS",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::UserAlreadyExists(_) => "USER_ALREADY_EXISTS",
            Self::NoActiveChallenge => "NO_ACTIVE_CHALLENGE",
            Self::CredentialNotFound(_) => "CREDENTIAL_NOT_FOUND",
            Self::VerificationRejected(_) => "VERIFICATION_REJECTED",
            Self::InvalidPassword => "INVALID_PASSWORD",
            Self::NoPasswordSet => "NO_PASSWORD_SET",
            Self::Storage(_) => "STORAGE_FAILURE",
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            // Don't leak storage internals (SQL, connection strings) to clients
            Self::Storage(_) => "Storage failure".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        match &self {
            Self::Storage(_) | Self::Internal(_) => {
                tracing::error!(
                    status = %status,
                    code = code,
                    error = %internal_message,
                    "Server error"
                );
            }
            Self::VerificationRejected(_) | Self::InvalidPassword => {
                tracing::warn!(
                    status = %status,
                    code = code,
                    error = %internal_message,
                    "Authentication error"
                );
            }
            _ => {
                tracing::warn!(
                    status = %status,
                    code = code,
                    error = %internal_message,
                    "Client error"
                );
            }
        }

        // All error responses include a `code` field for programmatic error handling
        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
