//! Registration ceremony handlers
//!
//! Two-step passkey registration: `/register` issues a challenge bound to
//! the caller's session, `/register/complete` verifies the authenticator's
//! attestation and stores the new credential.

use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use webauthn_rs::prelude::*;

use crate::error::ApiError;
use crate::session::{self, PendingCeremony};
use crate::state::AppState;
use crate::store::{credential_id_bytes, credential_id_str, NewPasskey};
use crate::types::{CeremonyStartRequest, VerifiedResponse};

/// POST /register
///
/// Begin passkey registration for a username, creating the user on first
/// sight. Returns the credential creation options for
/// `navigator.credentials.create()` and binds the challenge to the caller's
/// session cookie.
#[utoipa::path(
    post,
    path = "/register",
    tag = "Registration",
    request_body = CeremonyStartRequest,
    responses(
        (status = 200, description = "Credential creation options (JSON with publicKey)"),
        (status = 400, description = "Missing username"),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn register_start(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<CeremonyStartRequest>,
) -> Result<(CookieJar, Json<CreationChallengeResponse>), ApiError> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::missing("username is required"));
    }

    let user = state.store.find_or_create_user(username).await?;

    // Already-registered authenticators are excluded so the same device
    // cannot be enrolled twice; additional authenticators are welcome.
    let records = state.store.passkeys_for_user(user.id).await?;
    let exclude: Vec<CredentialID> = records
        .iter()
        .map(|r| credential_id_bytes(&r.credential_id).map(CredentialID::from))
        .collect::<Result<_, _>>()?;
    let exclude = if exclude.is_empty() {
        None
    } else {
        Some(exclude)
    };

    let (ccr, reg_state) =
        state
            .webauthn
            .start_passkey_registration(user.id, &user.username, &user.username, exclude)?;

    let (jar, handle) = session::ensure_session(jar, state.config.cookie_secure);
    state.sessions.store(
        &handle,
        PendingCeremony::Registration {
            user_id: user.id,
            state: reg_state,
        },
    );

    tracing::info!(username = %user.username, user_id = %user.id, "Registration ceremony started");

    Ok((jar, Json(ccr)))
}

/// POST /register/complete
///
/// Verify the authenticator's attestation response against the challenge
/// stored for this session and persist the new credential. The pending
/// challenge is consumed whether or not verification succeeds.
#[utoipa::path(
    post,
    path = "/register/complete",
    tag = "Registration",
    request_body(content_type = "application/json", description = "WebAuthn registration response from the browser"),
    responses(
        (status = 200, description = "Registration verified", body = VerifiedResponse),
        (status = 400, description = "No active challenge, or verification rejected"),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn register_finish(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(response): Json<RegisterPublicKeyCredential>,
) -> Result<Json<VerifiedResponse>, ApiError> {
    let handle = session::session_handle(&jar).ok_or(ApiError::NoActiveChallenge)?;
    let PendingCeremony::Registration {
        user_id,
        state: reg_state,
    } = state.sessions.take(&handle).ok_or(ApiError::NoActiveChallenge)?
    else {
        return Err(ApiError::NoActiveChallenge);
    };

    // Fresh reads; nothing is carried over from the begin call but the
    // ceremony state itself
    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::UserNotFound(user_id.to_string()))?;
    let records = state.store.passkeys_for_user(user.id).await?;

    let passkey = state
        .webauthn
        .finish_passkey_registration(&response, &reg_state)?;

    let credential_id = credential_id_str(passkey.cred_id().as_ref());

    if records.iter().any(|r| r.credential_id == credential_id) {
        tracing::debug!(
            credential_id = %credential_id,
            user_id = %user.id,
            "Credential already registered for this user"
        );
    } else {
        let public_key = serde_json::to_value(&passkey)
            .map_err(|e| ApiError::internal(format!("Failed to serialize passkey: {e}")))?;
        let transports = response.response.transports.clone().unwrap_or_default();

        state
            .store
            .insert_passkey(NewPasskey {
                credential_id: credential_id.clone(),
                user_id: user.id,
                public_key,
                counter: 0, // Initial registration has counter 0
                transports,
            })
            .await?;

        tracing::info!(
            credential_id = %credential_id,
            user_id = %user.id,
            "Registration ceremony completed"
        );
    }

    Ok(Json(VerifiedResponse { verified: true }))
}
