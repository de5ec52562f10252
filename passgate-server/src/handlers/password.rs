//! Password fallback handlers
//!
//! `/register-user` provisions an account with an Argon2 password hash;
//! `/login/password` verifies a plaintext password against it. Neither path
//! touches the challenge session.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::HeaderMap, Json};

use crate::error::ApiError;
use crate::handlers::client_info;
use crate::state::AppState;
use crate::store::{NewLoginAudit, StorageError};
use crate::types::{
    PasswordLoginRequest, PasswordLoginResponse, RegisterUserRequest, RegisterUserResponse,
};

/// POST /register-user
///
/// Provision a user account with a password. Distinct from the passkey
/// registration ceremony and does not touch credentials.
#[utoipa::path(
    post,
    path = "/register-user",
    tag = "Password",
    request_body = RegisterUserRequest,
    responses(
        (status = 200, description = "User created", body = RegisterUserResponse),
        (status = 400, description = "Missing username or password"),
        (status = 409, description = "Username already taken"),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<Json<RegisterUserResponse>, ApiError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::missing("username and password are required"));
    }

    if state.store.find_user_by_username(username).await?.is_some() {
        return Err(ApiError::UserAlreadyExists(username.to_string()));
    }

    let password_hash = hash_password(&req.password)?;

    // The unique constraint closes the race between the check above and the
    // insert; a concurrent winner surfaces as the same error
    let user = state
        .store
        .create_user_with_password(username, &password_hash)
        .await
        .map_err(|e| match e {
            StorageError::Conflict(_) => ApiError::UserAlreadyExists(username.to_string()),
            other => ApiError::Storage(other),
        })?;

    tracing::info!(username = %user.username, user_id = %user.id, "User provisioned with password");

    Ok(Json(RegisterUserResponse {
        success: true,
        user: user.into(),
    }))
}

/// POST /login/password
///
/// Password fallback login. Verifies the plaintext against the stored
/// Argon2 hash and appends an audit entry with no credential id.
#[utoipa::path(
    post,
    path = "/login/password",
    tag = "Password",
    request_body = PasswordLoginRequest,
    responses(
        (status = 200, description = "Login succeeded", body = PasswordLoginResponse),
        (status = 400, description = "Missing fields, or no password set for this account"),
        (status = 401, description = "Invalid password"),
        (status = 404, description = "Unknown user"),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn password_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PasswordLoginRequest>,
) -> Result<Json<PasswordLoginResponse>, ApiError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::missing("username and password are required"));
    }

    let user = state
        .store
        .find_user_by_username(username)
        .await?
        .ok_or_else(|| ApiError::UserNotFound(username.to_string()))?;

    // A passkey-only account is not an invalid password, it has no password
    let password_hash = user.password_hash.as_deref().ok_or(ApiError::NoPasswordSet)?;

    if !verify_password(&req.password, password_hash)? {
        return Err(ApiError::InvalidPassword);
    }

    let (client_addr, user_agent) = client_info(&headers);
    if let Err(e) = state
        .store
        .record_login(NewLoginAudit {
            user_id: user.id,
            credential_id: None,
            client_addr,
            user_agent,
        })
        .await
    {
        tracing::warn!(error = %e, user_id = %user.id, "Failed to record login audit entry");
    }

    tracing::info!(username = %user.username, user_id = %user.id, "Password login succeeded");

    Ok(Json(PasswordLoginResponse {
        success: true,
        user_id: user.id,
    }))
}

/// Hash a password using Argon2
fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::internal(format!("Password hashing failed: {e}")))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against a stored hash
fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| ApiError::internal(format!("Invalid password hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!verify_password("incorrect horse", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("same-password").unwrap();
        let second = hash_password("same-password").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_garbage_hash_is_an_error_not_a_mismatch() {
        assert!(verify_password("whatever", "not-a-phc-string").is_err());
    }
}
