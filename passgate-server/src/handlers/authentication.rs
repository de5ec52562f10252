//! Authentication ceremony handlers
//!
//! Two-step passkey login: `/login` issues a challenge over the user's
//! registered credentials, `/login/complete` verifies the signed assertion,
//! reconciles the signature counter, and records the login.

use axum::{extract::State, http::HeaderMap, Json};
use axum_extra::extract::cookie::CookieJar;
use webauthn_rs::prelude::*;

use crate::error::ApiError;
use crate::handlers::client_info;
use crate::session::{self, PendingCeremony};
use crate::state::AppState;
use crate::store::{credential_id_str, NewLoginAudit, PasskeyRecord};
use crate::types::{CeremonyStartRequest, VerifiedResponse};

/// POST /login
///
/// Begin passkey authentication for a username. Returns the credential
/// request options for `navigator.credentials.get()` with an allow-list of
/// the user's registered credentials.
#[utoipa::path(
    post,
    path = "/login",
    tag = "Authentication",
    request_body = CeremonyStartRequest,
    responses(
        (status = 200, description = "Credential request options (JSON with publicKey)"),
        (status = 400, description = "Missing username"),
        (status = 404, description = "Unknown user, or user has no passkeys"),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn login_start(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<CeremonyStartRequest>,
) -> Result<(CookieJar, Json<RequestChallengeResponse>), ApiError> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::missing("username is required"));
    }

    // Unknown users get no challenge and no session entry
    let user = state
        .store
        .find_user_by_username(username)
        .await?
        .ok_or_else(|| ApiError::UserNotFound(username.to_string()))?;

    let records = state.store.passkeys_for_user(user.id).await?;
    if records.is_empty() {
        return Err(ApiError::CredentialNotFound(format!(
            "user {} has no registered passkeys",
            user.id
        )));
    }

    let passkeys = decode_passkeys(&records)?;
    let (rcr, auth_state) = state.webauthn.start_passkey_authentication(&passkeys)?;

    let (jar, handle) = session::ensure_session(jar, state.config.cookie_secure);
    state.sessions.store(
        &handle,
        PendingCeremony::Authentication {
            user_id: user.id,
            state: auth_state,
        },
    );

    tracing::info!(username = %user.username, user_id = %user.id, "Authentication ceremony started");

    Ok((jar, Json(rcr)))
}

/// POST /login/complete
///
/// Verify the authenticator's signed assertion against the challenge stored
/// for this session. On success the credential's counter is set to exactly
/// the value the verifier approved and a login audit entry is appended
/// (best-effort). The pending challenge is consumed either way.
#[utoipa::path(
    post,
    path = "/login/complete",
    tag = "Authentication",
    request_body(content_type = "application/json", description = "WebAuthn assertion response from the browser"),
    responses(
        (status = 200, description = "Authentication verified", body = VerifiedResponse),
        (status = 400, description = "No active challenge, or verification rejected"),
        (status = 404, description = "Claimed credential does not belong to the user"),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn login_finish(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(response): Json<PublicKeyCredential>,
) -> Result<Json<VerifiedResponse>, ApiError> {
    let handle = session::session_handle(&jar).ok_or(ApiError::NoActiveChallenge)?;
    let PendingCeremony::Authentication {
        user_id,
        state: auth_state,
    } = state.sessions.take(&handle).ok_or(ApiError::NoActiveChallenge)?
    else {
        return Err(ApiError::NoActiveChallenge);
    };

    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::UserNotFound(user_id.to_string()))?;
    let records = state.store.passkeys_for_user(user.id).await?;

    // The claimed id is normalized to the canonical encoding before any
    // comparison; a credential registered to someone else must not match
    let claimed_id = credential_id_str(response.raw_id.as_ref());
    let record = records
        .iter()
        .find(|r| r.credential_id == claimed_id)
        .ok_or_else(|| {
            ApiError::CredentialNotFound(format!(
                "credential {} for user {}",
                claimed_id, user.id
            ))
        })?;

    let result = state
        .webauthn
        .finish_passkey_authentication(&response, &auth_state)?;

    // Persist whatever counter the verifier approved; regression rejection
    // is the verifier's policy, not ours
    let mut passkey: Passkey = serde_json::from_value(record.public_key.clone())
        .map_err(|e| ApiError::internal(format!("Failed to deserialize stored passkey: {e}")))?;
    passkey.update_credential(&result);
    let public_key = serde_json::to_value(&passkey)
        .map_err(|e| ApiError::internal(format!("Failed to serialize passkey: {e}")))?;

    let updated = state
        .store
        .update_passkey_after_auth(
            &record.credential_id,
            public_key,
            i64::from(result.counter()),
            result.backup_state(),
        )
        .await?;
    if !updated {
        tracing::warn!(
            credential_id = %record.credential_id,
            "Credential disappeared while completing authentication"
        );
    }

    let (client_addr, user_agent) = client_info(&headers);
    if let Err(e) = state
        .store
        .record_login(NewLoginAudit {
            user_id: user.id,
            credential_id: Some(claimed_id.clone()),
            client_addr,
            user_agent,
        })
        .await
    {
        // A logging outage must never block a legitimate login
        tracing::warn!(error = %e, user_id = %user.id, "Failed to record login audit entry");
    }

    tracing::info!(
        user_id = %user.id,
        credential_id = %claimed_id,
        sign_count = result.counter(),
        "Authentication ceremony completed"
    );

    Ok(Json(VerifiedResponse { verified: true }))
}

/// Rebuild the verifier-library credentials from their stored form
fn decode_passkeys(records: &[PasskeyRecord]) -> Result<Vec<Passkey>, ApiError> {
    records
        .iter()
        .map(|r| {
            serde_json::from_value(r.public_key.clone()).map_err(|e| {
                ApiError::internal(format!(
                    "Failed to deserialize stored passkey {}: {e}",
                    r.credential_id
                ))
            })
        })
        .collect()
}
