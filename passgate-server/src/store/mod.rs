//! Credential store module
//!
//! Provides storage for:
//! - **Users**: identity rows keyed by id and unique username, with an
//!   optional password hash for the fallback login path.
//! - **Passkeys**: registered authenticator credentials, keyed by a globally
//!   unique credential id.
//! - **Login audit**: append-only record of successful logins.
//!
//! If `DATABASE_URL` is not set, falls back to in-memory storage
//! (useful for development and tests, but all data is lost on restart).
//!
//! Credential ids are stored in exactly one encoding everywhere: base64url
//! without padding ([`credential_id_str`]). Every comparison and lookup site
//! goes through the same encoding, and [`credential_id_bytes`] inverts it.

mod memory;
mod postgres;

pub use memory::{AuditEntry, MemoryStore};
pub use postgres::PostgresStore;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webauthn_rs_proto::AuthenticatorTransport;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Uniqueness conflict: {0}")]
    Conflict(String),
}

/// Encode a raw credential id into the canonical storage form
pub fn credential_id_str(id: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(id)
}

/// Decode a canonically encoded credential id back to raw bytes
pub fn credential_id_bytes(id: &str) -> Result<Vec<u8>, StorageError> {
    URL_SAFE_NO_PAD
        .decode(id)
        .map_err(|e| StorageError::Serialization(format!("invalid credential id encoding: {e}")))
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Device classification for a registered credential
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Credential bound to a single authenticator
    #[default]
    SingleDevice,
    /// Synced/backed-up credential usable from multiple devices
    MultiDevice,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::SingleDevice => "single_device",
            DeviceType::MultiDevice => "multi_device",
        }
    }
}

impl From<&str> for DeviceType {
    fn from(value: &str) -> Self {
        match value {
            "multi_device" => DeviceType::MultiDevice,
            _ => DeviceType::SingleDevice,
        }
    }
}

/// A registered passkey credential as stored
///
/// `public_key` is the opaque serialized form of the verifier library's
/// credential (`webauthn_rs::prelude::Passkey`); it is deserialized back with
/// the same serde machinery at every read site.
#[derive(Debug, Clone)]
pub struct PasskeyRecord {
    pub credential_id: String,
    pub user_id: Uuid,
    pub public_key: serde_json::Value,
    pub counter: i64,
    pub transports: Vec<AuthenticatorTransport>,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub device_type: DeviceType,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Data for inserting a freshly registered passkey
#[derive(Debug, Clone)]
pub struct NewPasskey {
    pub credential_id: String,
    pub user_id: Uuid,
    pub public_key: serde_json::Value,
    pub counter: i64,
    pub transports: Vec<AuthenticatorTransport>,
}

/// Data for one login audit entry
///
/// `credential_id` is `None` for password logins.
#[derive(Debug, Clone)]
pub struct NewLoginAudit {
    pub user_id: Uuid,
    pub credential_id: Option<String>,
    pub client_addr: String,
    pub user_agent: String,
}

/// Storage backend
enum StoreBackend {
    /// PostgreSQL storage (production)
    Postgres(PostgresStore),
    /// In-memory storage (development/test fallback)
    Memory(MemoryStore),
}

/// Unified credential store for users, passkeys, and the login audit trail
pub struct AuthStore {
    backend: StoreBackend,
}

impl AuthStore {
    /// Create a store with a PostgreSQL backend
    pub async fn with_postgres(database_url: &str) -> Result<Self, StorageError> {
        let store = PostgresStore::new(database_url).await?;
        store.migrate().await?;

        Ok(Self {
            backend: StoreBackend::Postgres(store),
        })
    }

    /// Create a store with an in-memory backend (development/tests only)
    pub fn in_memory() -> Self {
        Self {
            backend: StoreBackend::Memory(MemoryStore::new()),
        }
    }

    /// Create a store from an optional database URL
    ///
    /// Uses PostgreSQL when a URL is given, otherwise falls back to in-memory.
    pub async fn from_database_url(database_url: Option<&str>) -> Result<Self, StorageError> {
        match database_url {
            Some(url) if !url.is_empty() => {
                tracing::info!("Using PostgreSQL credential storage");
                Self::with_postgres(url).await
            }
            _ => {
                tracing::warn!("DATABASE_URL not set, using in-memory storage");
                Ok(Self::in_memory())
            }
        }
    }

    /// Check if using persistent storage
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StoreBackend::Postgres(_))
    }

    /// Check storage health (always Ok for memory backend)
    pub async fn check_health(&self) -> Result<(), StorageError> {
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.check_health().await,
            StoreBackend::Memory(_) => Ok(()),
        }
    }

    // ==================== User Methods ====================

    /// Find a user by username
    pub async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>, StorageError> {
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.find_user_by_username(username).await,
            StoreBackend::Memory(mem) => Ok(mem.find_user_by_username(username)),
        }
    }

    /// Find a user by id
    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.find_user_by_id(id).await,
            StoreBackend::Memory(mem) => Ok(mem.find_user_by_id(id)),
        }
    }

    /// Look up a user by username, creating a passwordless row if absent
    pub async fn find_or_create_user(&self, username: &str) -> Result<User, StorageError> {
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.find_or_create_user(username).await,
            StoreBackend::Memory(mem) => Ok(mem.find_or_create_user(username)),
        }
    }

    /// Create a user with a password hash
    ///
    /// Returns [`StorageError::Conflict`] when the username is already taken.
    pub async fn create_user_with_password(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<User, StorageError> {
        match &self.backend {
            StoreBackend::Postgres(pg) => {
                pg.create_user_with_password(username, password_hash).await
            }
            StoreBackend::Memory(mem) => mem.create_user_with_password(username, password_hash),
        }
    }

    // ==================== Passkey Methods ====================

    /// List all passkeys registered to a user
    pub async fn passkeys_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PasskeyRecord>, StorageError> {
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.passkeys_for_user(user_id).await,
            StoreBackend::Memory(mem) => Ok(mem.passkeys_for_user(user_id)),
        }
    }

    /// Find one of a user's passkeys by canonical credential id
    pub async fn find_passkey_for_user(
        &self,
        user_id: Uuid,
        credential_id: &str,
    ) -> Result<Option<PasskeyRecord>, StorageError> {
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.find_passkey_for_user(user_id, credential_id).await,
            StoreBackend::Memory(mem) => Ok(mem.find_passkey_for_user(user_id, credential_id)),
        }
    }

    /// Insert a newly registered passkey
    ///
    /// Credential id uniqueness is enforced here (primary key / atomic map
    /// entry), not by a check-then-insert in the caller; returns
    /// [`StorageError::Conflict`] when the id is registered anywhere already.
    pub async fn insert_passkey(&self, passkey: NewPasskey) -> Result<(), StorageError> {
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.insert_passkey(passkey).await,
            StoreBackend::Memory(mem) => mem.insert_passkey(passkey),
        }
    }

    /// Persist the verifier-approved state after a successful authentication
    ///
    /// The counter is written exactly as approved by the verifier; regression
    /// policy is the verifier's, not the store's.
    pub async fn update_passkey_after_auth(
        &self,
        credential_id: &str,
        public_key: serde_json::Value,
        counter: i64,
        backup_state: bool,
    ) -> Result<bool, StorageError> {
        match &self.backend {
            StoreBackend::Postgres(pg) => {
                pg.update_passkey_after_auth(credential_id, public_key, counter, backup_state)
                    .await
            }
            StoreBackend::Memory(mem) => {
                Ok(mem.update_passkey_after_auth(credential_id, public_key, counter, backup_state))
            }
        }
    }

    /// Get total passkey count (for stats)
    pub async fn passkey_count(&self) -> Result<usize, StorageError> {
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.passkey_count().await,
            StoreBackend::Memory(mem) => Ok(mem.passkey_count()),
        }
    }

    // ==================== Audit Methods ====================

    /// Append a login audit entry
    ///
    /// Callers treat failures as non-fatal; see the ceremony handlers.
    pub async fn record_login(&self, entry: NewLoginAudit) -> Result<(), StorageError> {
        match &self.backend {
            StoreBackend::Postgres(pg) => pg.record_login(entry).await,
            StoreBackend::Memory(mem) => {
                mem.record_login(entry);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            StoreBackend::Postgres(_) => "PostgreSQL",
            StoreBackend::Memory(_) => "Memory",
        };
        f.debug_struct("AuthStore").field("backend", &backend).finish()
    }
}
