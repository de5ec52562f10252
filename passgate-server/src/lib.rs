//! Passgate Server Library - passkey authentication with a password fallback
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod config;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod types;

pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use openapi::ApiDoc;
pub use routes::create_router;
pub use session::{ChallengeSessions, PendingCeremony, SESSION_COOKIE};
pub use state::AppState;
pub use store::{
    credential_id_bytes, credential_id_str, AuthStore, DeviceType, NewLoginAudit, NewPasskey,
    PasskeyRecord, StorageError, User,
};
pub use types::{
    CeremonyStartRequest, PasswordLoginRequest, PasswordLoginResponse, RegisterUserRequest,
    RegisterUserResponse, UserResponse, VerifiedResponse,
};
