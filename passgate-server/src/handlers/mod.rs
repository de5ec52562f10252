//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod authentication;
pub mod health;
pub mod password;
pub mod registration;

use axum::http::{header, HeaderMap};

pub use authentication::{login_finish, login_start};
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use password::{password_login, register_user};
pub use registration::{register_finish, register_start};

/// Extract the client address and user agent for the login audit trail
///
/// The address comes from the first `X-Forwarded-For` hop; direct peer
/// addresses are not visible behind the usual reverse-proxy deployment.
pub(crate) fn client_info(headers: &HeaderMap) -> (String, String) {
    let client_addr = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    (client_addr, user_agent)
}
