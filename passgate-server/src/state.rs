//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use webauthn_rs::prelude::Webauthn;

use crate::config::Config;
use crate::error::ApiError;
use crate::session::ChallengeSessions;
use crate::store::AuthStore;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Immutable server configuration
    pub config: Arc<Config>,
    /// WebAuthn verifier, built once from the relying party settings
    pub webauthn: Arc<Webauthn>,
    /// Credential store (users, passkeys, login audit)
    pub store: Arc<AuthStore>,
    /// Pending ceremony challenges keyed by session handle
    pub sessions: Arc<ChallengeSessions>,
}

impl AppState {
    /// Create application state, selecting the storage backend from config
    ///
    /// Uses PostgreSQL when `database_url` is set, otherwise in-memory.
    pub async fn new(config: Config) -> Result<Self, ApiError> {
        let webauthn = config
            .webauthn()
            .map_err(|e| ApiError::internal(format!("Failed to build WebAuthn verifier: {e}")))?;

        let store = AuthStore::from_database_url(config.database_url.as_deref()).await?;

        Ok(Self {
            config: Arc::new(config),
            webauthn: Arc::new(webauthn),
            store: Arc::new(store),
            sessions: Arc::new(ChallengeSessions::new()),
        })
    }

    /// Create state with in-memory storage (for testing)
    pub fn in_memory(config: Config) -> Result<Self, ApiError> {
        let webauthn = config
            .webauthn()
            .map_err(|e| ApiError::internal(format!("Failed to build WebAuthn verifier: {e}")))?;

        Ok(Self {
            config: Arc::new(config),
            webauthn: Arc::new(webauthn),
            store: Arc::new(AuthStore::in_memory()),
            sessions: Arc::new(ChallengeSessions::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_state() {
        let state = AppState::in_memory(Config::default()).unwrap();
        assert!(!state.store.is_persistent());
        assert_eq!(state.sessions.pending_count(), 0);
    }
}
