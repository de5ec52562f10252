//! PostgreSQL storage backend
//!
//! Persistent storage for users, passkey credentials, and the login audit
//! trail. Username and credential id uniqueness are enforced by UNIQUE
//! constraints so that concurrent registrations cannot race past an
//! application-level existence check.

use sqlx::PgPool;
use uuid::Uuid;

use super::{
    DeviceType, NewLoginAudit, NewPasskey, PasskeyRecord, StorageError, User,
};

/// PostgreSQL-backed credential store
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        tracing::info!("Connected to PostgreSQL database");
        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;

        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Check database connection health
    pub async fn check_health(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    // ==================== User Methods ====================

    pub async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>, StorageError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))
    }

    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))
    }

    /// Atomic find-or-create keyed on the unique username
    ///
    /// The no-op DO UPDATE makes the insert return the existing row instead
    /// of failing, closing the race between two first-time registrations.
    pub async fn find_or_create_user(&self, username: &str) -> Result<User, StorageError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username)
            VALUES ($1)
            ON CONFLICT (username)
            DO UPDATE SET username = EXCLUDED.username
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))
    }

    pub async fn create_user_with_password(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<User, StorageError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_query(e, format!("username '{username}' is already taken")))
    }

    // ==================== Passkey Methods ====================

    pub async fn passkeys_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PasskeyRecord>, StorageError> {
        let rows = sqlx::query_as::<_, PasskeyRow>(
            r#"
            SELECT credential_id, user_id, public_key, counter, transports,
                   backup_eligible, backup_state, device_type, created_at, last_used_at
            FROM passkeys
            WHERE user_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter().map(PasskeyRow::into_record).collect()
    }

    pub async fn find_passkey_for_user(
        &self,
        user_id: Uuid,
        credential_id: &str,
    ) -> Result<Option<PasskeyRecord>, StorageError> {
        let row = sqlx::query_as::<_, PasskeyRow>(
            r#"
            SELECT credential_id, user_id, public_key, counter, transports,
                   backup_eligible, backup_state, device_type, created_at, last_used_at
            FROM passkeys
            WHERE user_id = $1 AND credential_id = $2
            "#,
        )
        .bind(user_id)
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        row.map(PasskeyRow::into_record).transpose()
    }

    pub async fn insert_passkey(&self, passkey: NewPasskey) -> Result<(), StorageError> {
        let transports = serde_json::to_value(&passkey.transports)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO passkeys (credential_id, user_id, public_key, counter, transports)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&passkey.credential_id)
        .bind(passkey.user_id)
        .bind(&passkey.public_key)
        .bind(passkey.counter)
        .bind(&transports)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_or_query(
                e,
                format!(
                    "credential id '{}' is already registered",
                    passkey.credential_id
                ),
            )
        })?;

        tracing::info!(credential_id = %passkey.credential_id, "Passkey stored in database");
        Ok(())
    }

    pub async fn update_passkey_after_auth(
        &self,
        credential_id: &str,
        public_key: serde_json::Value,
        counter: i64,
        backup_state: bool,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE passkeys
            SET public_key = $2,
                counter = $3,
                backup_state = $4,
                backup_eligible = backup_eligible OR $4,
                device_type = CASE WHEN backup_eligible OR $4 THEN 'multi_device'
                                   ELSE device_type END,
                last_used_at = NOW()
            WHERE credential_id = $1
            "#,
        )
        .bind(credential_id)
        .bind(&public_key)
        .bind(counter)
        .bind(backup_state)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn passkey_count(&self) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passkeys")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(count as usize)
    }

    // ==================== Audit Methods ====================

    pub async fn record_login(&self, entry: NewLoginAudit) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO login_audit (user_id, credential_id, client_addr, user_agent)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.credential_id)
        .bind(&entry.client_addr)
        .bind(&entry.user_agent)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(())
    }
}

/// Map a unique-constraint violation to [`StorageError::Conflict`]
fn conflict_or_query(err: sqlx::Error, conflict_message: String) -> StorageError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return StorageError::Conflict(conflict_message);
        }
    }
    StorageError::Query(err.to_string())
}

/// Database row for passkeys
#[derive(sqlx::FromRow)]
struct PasskeyRow {
    credential_id: String,
    user_id: Uuid,
    public_key: serde_json::Value,
    counter: i64,
    transports: serde_json::Value,
    backup_eligible: bool,
    backup_state: bool,
    device_type: String,
    created_at: chrono::DateTime<chrono::Utc>,
    last_used_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PasskeyRow {
    fn into_record(self) -> Result<PasskeyRecord, StorageError> {
        let transports = serde_json::from_value(self.transports)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(PasskeyRecord {
            credential_id: self.credential_id,
            user_id: self.user_id,
            public_key: self.public_key,
            counter: self.counter,
            transports,
            backup_eligible: self.backup_eligible,
            backup_state: self.backup_state,
            device_type: DeviceType::from(self.device_type.as_str()),
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        })
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("pool", &"<PgPool>")
            .finish()
    }
}
