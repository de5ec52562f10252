//! Passgate Server - passkey authentication REST API
//!
//! Exposes the WebAuthn registration/authentication ceremonies and the
//! password fallback over HTTP:
//! - POST /register-user    - Provision a user with a password
//! - POST /register         - Begin passkey registration
//! - POST /register/complete - Verify and store a new passkey
//! - POST /login            - Begin passkey authentication
//! - POST /login/complete   - Verify an assertion, update the counter
//! - POST /login/password   - Password fallback login

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use passgate_server::{create_router, AppState, Config};

/// How often the expired-challenge sweeper runs
const SESSION_SWEEP_INTERVAL_SECS: u64 = 600;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,passgate_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(rp_id = %config.rp_id, rp_origin = %config.rp_origin, "Configuration loaded");

    let state = AppState::new(config.clone()).await?;

    // Challenges left behind by abandoned ceremonies expire after a few
    // minutes; sweep them so the session store does not grow unbounded
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            sessions.cleanup_expired();
            tracing::debug!(pending = sessions.pending_count(), "Swept expired challenges");
        }
    });

    let app = create_router(state);

    let addr = config.socket_addr();
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
