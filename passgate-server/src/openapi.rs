//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3.0 specification for the authentication API.

use utoipa::OpenApi;

use crate::handlers::{HealthResponse, ReadyResponse};
use crate::types::{
    CeremonyStartRequest, PasswordLoginRequest, PasswordLoginResponse, RegisterUserRequest,
    RegisterUserResponse, UserResponse, VerifiedResponse,
};

/// Passgate - Authentication API documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Passgate Authentication API",
        version = "0.1.0",
        description = r#"
## Passkey authentication with a password fallback

Passgate implements the WebAuthn registration and authentication ceremonies
for passkeys, backed by a persistent user/credential store:

1. **Register**: `POST /register` issues a challenge, the device signs it
   via `navigator.credentials.create()`, and `POST /register/complete`
   verifies and stores the new credential.
2. **Login**: `POST /login` issues a challenge over the user's registered
   credentials, the device signs via `navigator.credentials.get()`, and
   `POST /login/complete` verifies the assertion and reconciles the
   authenticator's signature counter.
3. **Password fallback**: `POST /register-user` provisions an account with
   an Argon2 password hash; `POST /login/password` verifies it.

Challenges are single-use and bound to the caller's session cookie.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Registration", description = "Passkey registration ceremony"),
        (name = "Authentication", description = "Passkey authentication ceremony"),
        (name = "Password", description = "Password provisioning and fallback login"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::registration::register_start,
        crate::handlers::registration::register_finish,
        crate::handlers::authentication::login_start,
        crate::handlers::authentication::login_finish,
        crate::handlers::password::register_user,
        crate::handlers::password::password_login,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            CeremonyStartRequest,
            RegisterUserRequest,
            RegisterUserResponse,
            PasswordLoginRequest,
            PasswordLoginResponse,
            UserResponse,
            VerifiedResponse,
        )
    )
)]
pub struct ApiDoc;
