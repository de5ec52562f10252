//! Request/response types for the authentication API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::User;

/// Request to provision a user with a password
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterUserRequest {
    /// Unique username
    #[serde(default)]
    #[schema(example = "alice")]
    pub username: String,
    /// Plaintext password, hashed server-side before storage
    #[serde(default)]
    pub password: String,
}

/// Request to begin a registration or authentication ceremony
#[derive(Debug, Deserialize, ToSchema)]
pub struct CeremonyStartRequest {
    /// Username the ceremony is for
    #[serde(default)]
    #[schema(example = "alice")]
    pub username: String,
}

/// Request for password fallback login
#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordLoginRequest {
    #[serde(default)]
    #[schema(example = "alice")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// User response DTO (excludes the password hash)
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    /// User unique identifier
    #[schema(value_type = String, example = "550e8400-e29b-41d4-a716-446655440000")]
    pub id: Uuid,
    /// Username
    #[schema(example = "alice")]
    pub username: String,
    /// Account creation timestamp
    #[schema(value_type = String, example = "2026-01-08T10:00:00Z")]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            created_at: user.created_at,
        }
    }
}

/// Response for successful user provisioning
#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterUserResponse {
    pub success: bool,
    pub user: UserResponse,
}

/// Response for successful password login
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordLoginResponse {
    pub success: bool,
    /// Identifier of the authenticated user
    #[schema(value_type = String, example = "550e8400-e29b-41d4-a716-446655440000")]
    pub user_id: Uuid,
}

/// Outcome of a complete-ceremony call
#[derive(Debug, Serialize, ToSchema)]
pub struct VerifiedResponse {
    /// Whether the signed response passed verification
    pub verified: bool,
}
